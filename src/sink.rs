//! Write-only destination for training metrics and sample image grids.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use image::{GrayImage, RgbImage};
use ndarray::{s, Array3, ArrayView4, Axis};
use serde_derive::Serialize;

use crate::constants::{file, grid};
use crate::error::{DenoiseError, Result};

pub trait MetricsSink {
	fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;

	/// `grid` is a single C×H×W image with values in [0, 1].
	fn add_image(&mut self, tag: &str, grid: &Array3<f32>, step: usize) -> Result<()>;
}

/// Accepts everything and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
	fn add_scalar(&mut self, _tag: &str, _value: f64, _step: usize) -> Result<()> {
		Ok(())
	}

	fn add_image(&mut self, _tag: &str, _grid: &Array3<f32>, _step: usize) -> Result<()> {
		Ok(())
	}
}

#[derive(Debug, Serialize)]
struct Event<'a> {
	timestamp: String,
	kind: &'static str,
	tag: &'a str,
	step: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	value: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	path: Option<String>,
}

/// Appends one JSON object per event to `events.jsonl` and writes image grids
/// as PNG files next to it.
pub struct EventFileSink {
	writer: BufWriter<File>,
	image_dir: PathBuf,
}

impl EventFileSink {
	pub fn create(log_dir: impl AsRef<Path>) -> Result<Self> {
		let log_dir = log_dir.as_ref();
		let image_dir = log_dir.join(file::IMAGES_DIR);
		fs::create_dir_all(&image_dir)?;
		let events = OpenOptions::new()
			.create(true)
			.append(true)
			.open(log_dir.join(file::EVENTS_FILE))?;
		Ok(EventFileSink {
			writer: BufWriter::new(events),
			image_dir,
		})
	}

	pub fn image_path(&self, tag: &str, step: usize) -> PathBuf {
		let name: String = tag
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
			.collect();
		self.image_dir.join(format!("{}_{}.png", name, step))
	}

	fn write_event(&mut self, event: &Event) -> Result<()> {
		serde_json::to_writer(&mut self.writer, event).map_err(|e| DenoiseError::Sink(e.to_string()))?;
		self.writer.write_all(b"\n")?;
		self.writer.flush()?;
		Ok(())
	}
}

impl MetricsSink for EventFileSink {
	fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
		self.write_event(&Event {
			timestamp: Utc::now().to_rfc3339(),
			kind: "scalar",
			tag,
			step,
			value: Some(value),
			path: None,
		})
	}

	fn add_image(&mut self, tag: &str, grid: &Array3<f32>, step: usize) -> Result<()> {
		let path = self.image_path(tag, step);
		save_png(grid, &path)?;
		self.write_event(&Event {
			timestamp: Utc::now().to_rfc3339(),
			kind: "image",
			tag,
			step,
			value: None,
			path: Some(path.display().to_string()),
		})
	}
}

/// Tiles a batch into one image, `IMAGES_PER_ROW` per row with `PADDING`
/// pixels of zero between and around tiles. Each tile is min-max normalised
/// on its own.
pub fn make_grid(batch: ArrayView4<f32>) -> Result<Array3<f32>> {
	let (n, c, h, w) = batch.dim();
	if n == 0 {
		return Err(DenoiseError::ShapeMismatch("cannot tile an empty batch".to_string()));
	}
	let cols = n.min(grid::IMAGES_PER_ROW);
	let rows = (n + cols - 1) / cols;
	let pad = grid::PADDING;
	let tile_h = h + pad;
	let tile_w = w + pad;

	let mut out = Array3::<f32>::zeros((c, rows * tile_h + pad, cols * tile_w + pad));
	for (i, image) in batch.axis_iter(Axis(0)).enumerate() {
		let (lo, hi) = image
			.iter()
			.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
		let scale = 1.0 / (hi - lo + 1e-5);

		let y = (i / cols) * tile_h + pad;
		let x = (i % cols) * tile_w + pad;
		let mut tile = out.slice_mut(s![.., y..y + h, x..x + w]);
		tile.assign(&image);
		tile.mapv_inplace(|v| (v - lo) * scale);
	}
	Ok(out)
}

fn to_byte(v: f32) -> u8 {
	(v.max(0.0).min(1.0) * 255.0).round() as u8
}

/// Writes a 1- or 3-channel C×H×W image.
pub fn save_png(image: &Array3<f32>, path: &Path) -> Result<()> {
	let (c, h, w) = image.dim();
	match c {
		1 => {
			let buffer = GrayImage::from_fn(w as u32, h as u32, |x, y| {
				image::Luma([to_byte(image[[0, y as usize, x as usize]])])
			});
			buffer.save(path)?;
		}
		3 => {
			let buffer = RgbImage::from_fn(w as u32, h as u32, |x, y| {
				let (x, y) = (x as usize, y as usize);
				image::Rgb([
					to_byte(image[[0, y, x]]),
					to_byte(image[[1, y, x]]),
					to_byte(image[[2, y, x]]),
				])
			});
			buffer.save(path)?;
		}
		other => {
			return Err(DenoiseError::Sink(format!("cannot write a {}-channel image", other)));
		}
	}
	Ok(())
}
