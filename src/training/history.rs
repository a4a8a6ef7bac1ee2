use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde_derive::{Deserialize, Serialize};
use serde_pickle::{DeOptions, SerOptions};

use crate::config::ModelParams;
use crate::error::Result;

/// Per-epoch training record. Pickled as a dict with the keys `model`,
/// `train`, `val` and `psnr` so existing analysis notebooks can read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
	pub model: ModelParams,
	pub train: Vec<f64>,
	pub val: Vec<f64>,
	pub psnr: Vec<f64>,
}

impl RunHistory {
	pub fn new(model: ModelParams) -> Self {
		RunHistory {
			model,
			train: Vec::new(),
			val: Vec::new(),
			psnr: Vec::new(),
		}
	}

	pub fn record(&mut self, train_loss: f64, val_loss: f64, val_psnr: f64) {
		self.train.push(train_loss);
		self.val.push(val_loss);
		self.psnr.push(val_psnr);
	}

	pub fn epochs(&self) -> usize {
		self.train.len()
	}

	pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
		let mut writer = BufWriter::new(File::create(path)?);
		serde_pickle::to_writer(&mut writer, self, SerOptions::new())?;
		writer.flush()?;
		Ok(())
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let reader = BufReader::new(File::open(path)?);
		Ok(serde_pickle::from_reader(reader, DeOptions::new())?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn params() -> ModelParams {
		ModelParams {
			num_channels: 1,
			patch_size: 40,
			num_layers: 17,
			kernel_size: 3,
			stride: 1,
			num_filters: 64,
		}
	}

	#[test]
	fn records_in_epoch_order() {
		let mut history = RunHistory::new(params());
		history.record(3.0, 2.0, 20.0);
		history.record(1.5, 1.0, 25.0);
		assert_eq!(history.epochs(), 2);
		assert_eq!(history.train, vec![3.0, 1.5]);
		assert_eq!(history.val, vec![2.0, 1.0]);
		assert_eq!(history.psnr, vec![20.0, 25.0]);
	}

	#[test]
	fn pickle_round_trip() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("model.npy");
		let mut history = RunHistory::new(params());
		history.record(0.25, 0.5, 31.5);
		history.save(&path).unwrap();
		assert_eq!(RunHistory::load(&path).unwrap(), history);
	}

	#[test]
	fn pickles_as_a_keyed_dict() {
		let history = RunHistory::new(params());
		let value = serde_pickle::to_value(&history).unwrap();
		match value {
			serde_pickle::Value::Dict(map) => {
				for key in &["model", "train", "val", "psnr"] {
					assert!(map.contains_key(&serde_pickle::HashableValue::String(key.to_string())));
				}
			}
			other => panic!("expected a dict, got {:?}", other),
		}
	}
}
