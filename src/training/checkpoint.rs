use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::FpCategory;
use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use serde_derive::{Deserialize, Serialize};
use xz2::read::{XzDecoder, XzEncoder};

use crate::config::ModelParams;
use crate::constants::{file, io};
use crate::error::{DenoiseError, Result};
use crate::model::Denoiser;

/// Trainable parameters plus the hyperparameters needed to rebuild the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCheckpoint {
	pub model: ModelParams,
	pub parameters: Vec<ArrayD<f32>>,
}

impl ModelCheckpoint {
	pub fn from_model<M: Denoiser>(model: &M) -> Self {
		ModelCheckpoint {
			model: model.model_params(),
			parameters: model.parameters().to_vec(),
		}
	}

	/// Serialises and compresses the checkpoint. Subnormal weights are flushed
	/// to zero and the f32 bytes are shuffled so like bytes sit together,
	/// which compresses noticeably better.
	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		let mut checkpoint = self.clone();
		for arr in &mut checkpoint.parameters {
			for e in arr.iter_mut() {
				if let FpCategory::Subnormal = e.classify() {
					*e = 0.0;
				}
			}
		}

		let serialized = bincode::serialize(&checkpoint)?;
		let shuffled = shuffle(&serialized, io::SHUFFLE_STRIDE);
		let mut compressed = Vec::new();
		XzEncoder::new(shuffled.as_slice(), io::XZ_LEVEL).read_to_end(&mut compressed)?;
		Ok(compressed)
	}

	/// Inverts `to_bytes`.
	pub fn from_bytes(data: &[u8]) -> Result<Self> {
		let mut decompressed = Vec::new();
		XzDecoder::new(data)
			.read_to_end(&mut decompressed)
			.map_err(|e| DenoiseError::Serialization(format!("checkpoint decompression failed: {}", e)))?;
		let unshuffled = unshuffle(&decompressed, io::SHUFFLE_STRIDE);
		bincode::deserialize(&unshuffled)
			.map_err(|e| DenoiseError::Serialization(format!("checkpoint decoding failed: {}", e)))
	}

	pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
		let bytes = self.to_bytes()?;
		let mut file = File::create(path)?;
		file.write_all(&bytes)?;
		Ok(())
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let data = fs::read(path)?;
		Self::from_bytes(&data)
	}
}

/// Shuffle f32 bytes so that all first bytes are contiguous etc
fn shuffle(data: &[u8], stride: usize) -> Vec<u8> {
	let mut vec = Vec::with_capacity(data.len());
	for offset in 0..stride {
		for i in 0..(data.len() + stride - 1 - offset) / stride {
			vec.push(data[offset + i * stride])
		}
	}
	debug_assert_eq!(vec.len(), data.len());
	vec
}

/// Inverts `shuffle()`
fn unshuffle(data: &[u8], stride: usize) -> Vec<u8> {
	let mut vec = vec![0; data.len()];
	let mut inc = 0;
	for offset in 0..stride {
		for i in 0..(data.len() + stride - 1 - offset) / stride {
			vec[offset + i * stride] = data[inc];
			inc += 1;
		}
	}
	debug_assert_eq!(inc, data.len());
	vec
}

/// Writes the "best" and "final" checkpoints under the log directory.
pub struct CheckpointManager {
	output_dir: PathBuf,
}

impl CheckpointManager {
	pub fn new(output_dir: impl AsRef<Path>) -> Self {
		Self {
			output_dir: output_dir.as_ref().to_path_buf(),
		}
	}

	pub fn best_path(&self) -> PathBuf {
		self.output_dir.join(file::BEST_CHECKPOINT)
	}

	pub fn final_path(&self) -> PathBuf {
		self.output_dir.join(file::FINAL_CHECKPOINT)
	}

	pub fn save_best<M: Denoiser>(&self, model: &M) -> Result<()> {
		ModelCheckpoint::from_model(model).save(self.best_path())
	}

	pub fn save_final<M: Denoiser>(&self, model: &M) -> Result<()> {
		ModelCheckpoint::from_model(model).save(self.final_path())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::{arr1, Array4};
	use tempfile::TempDir;

	fn sample() -> ModelCheckpoint {
		ModelCheckpoint {
			model: ModelParams {
				num_channels: 1,
				patch_size: 8,
				num_layers: 1,
				kernel_size: 3,
				stride: 1,
				num_filters: 4,
			},
			parameters: vec![
				Array4::from_shape_fn((1, 1, 3, 3), |(_, _, y, x)| (y * 3 + x) as f32 * 0.25).into_dyn(),
				arr1(&[0.5f32]).into_dyn(),
			],
		}
	}

	#[test]
	fn shuffle_is_invertible_for_odd_lengths() {
		let data: Vec<u8> = (0..23).collect();
		assert_eq!(unshuffle(&shuffle(&data, 4), 4), data);
	}

	#[test]
	fn survives_disk_round_trip() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("best_model.pt");
		let checkpoint = sample();
		checkpoint.save(&path).unwrap();
		assert_eq!(ModelCheckpoint::load(&path).unwrap(), checkpoint);
	}

	#[test]
	fn garbage_is_a_serialization_error() {
		let result = ModelCheckpoint::from_bytes(b"not an xz stream");
		assert!(matches!(result, Err(DenoiseError::Serialization(_))));
	}
}
