use std::path::PathBuf;

use serde_derive::{Deserialize, Serialize};

use crate::constants::{network, scheduler, training};
use crate::error::{DenoiseError, Result};

/// Hyperparameters needed to rebuild a network. Stored in every history
/// artifact and checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelParams {
	pub num_channels: usize,
	pub patch_size: usize,
	pub num_layers: usize,
	pub kernel_size: usize,
	pub stride: usize,
	pub num_filters: usize,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
	pub num_layers: usize,
	pub num_filters: usize,
	pub kernel_size: usize,
	pub stride: usize,
}

impl Default for NetworkConfig {
	fn default() -> Self {
		Self {
			num_layers: network::DEFAULT_NUM_LAYERS,
			num_filters: network::DEFAULT_NUM_FILTERS,
			kernel_size: network::DEFAULT_KERNEL_SIZE,
			stride: network::DEFAULT_STRIDE,
		}
	}
}

impl NetworkConfig {
	pub fn builder() -> NetworkConfigBuilder {
		NetworkConfigBuilder::default()
	}

	pub fn validate(&self) -> Result<()> {
		if self.num_layers == 0 {
			return Err(DenoiseError::InvalidParameter(
				"Number of layers must be greater than 0".into(),
			));
		}
		if self.num_filters == 0 {
			return Err(DenoiseError::InvalidParameter(
				"Number of filters must be greater than 0".into(),
			));
		}
		if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
			return Err(DenoiseError::InvalidParameter(format!(
				"Filter size ({}) must be a positive odd number",
				self.kernel_size
			)));
		}
		// A strided layer shrinks the feature map, so the residual would no
		// longer line up with the input.
		if self.stride != 1 {
			return Err(DenoiseError::InvalidParameter(format!(
				"Stride ({}) must be 1 for a residual denoiser",
				self.stride
			)));
		}
		Ok(())
	}

	/// Completes the hyperparameters with the patch geometry read from the store.
	pub fn model_params(&self, num_channels: usize, patch_size: usize) -> ModelParams {
		ModelParams {
			num_channels,
			patch_size,
			num_layers: self.num_layers,
			kernel_size: self.kernel_size,
			stride: self.stride,
			num_filters: self.num_filters,
		}
	}
}

#[derive(Default)]
pub struct NetworkConfigBuilder {
	num_layers: Option<usize>,
	num_filters: Option<usize>,
	kernel_size: Option<usize>,
	stride: Option<usize>,
}

impl NetworkConfigBuilder {
	pub fn num_layers(mut self, num_layers: usize) -> Self {
		self.num_layers = Some(num_layers);
		self
	}

	pub fn num_filters(mut self, num_filters: usize) -> Self {
		self.num_filters = Some(num_filters);
		self
	}

	pub fn kernel_size(mut self, kernel_size: usize) -> Self {
		self.kernel_size = Some(kernel_size);
		self
	}

	pub fn stride(mut self, stride: usize) -> Self {
		self.stride = Some(stride);
		self
	}

	pub fn build(self) -> NetworkConfig {
		NetworkConfig {
			num_layers: self.num_layers.unwrap_or(network::DEFAULT_NUM_LAYERS),
			num_filters: self.num_filters.unwrap_or(network::DEFAULT_NUM_FILTERS),
			kernel_size: self.kernel_size.unwrap_or(network::DEFAULT_KERNEL_SIZE),
			stride: self.stride.unwrap_or(network::DEFAULT_STRIDE),
		}
	}
}

#[derive(Debug, Clone)]
pub struct TrainingConfig {
	pub train_set: PathBuf,
	pub val_set: PathBuf,
	pub batch_size: usize,
	pub epochs: usize,
	pub learning_rate: f64,
	/// Standard deviation of the injected noise on the [0, 255] scale.
	pub noise_level: f64,
	pub log_dir: PathBuf,
	pub model_dir: PathBuf,
	pub patience: usize,
	pub lr_factor: f64,
	/// Loader threads; `None` uses every available core.
	pub workers: Option<usize>,
	pub seed: Option<u64>,
	pub cache: bool,
	pub start_parameters: Option<PathBuf>,
}

impl Default for TrainingConfig {
	fn default() -> Self {
		Self {
			train_set: PathBuf::from("train.dnps"),
			val_set: PathBuf::from("val.dnps"),
			batch_size: training::DEFAULT_BATCH_SIZE,
			epochs: training::DEFAULT_EPOCHS,
			learning_rate: training::DEFAULT_LEARNING_RATE,
			noise_level: training::DEFAULT_NOISE_LEVEL,
			log_dir: PathBuf::from("logs"),
			model_dir: PathBuf::from("models"),
			patience: scheduler::DEFAULT_PATIENCE,
			lr_factor: scheduler::DEFAULT_FACTOR,
			workers: None,
			seed: None,
			cache: false,
			start_parameters: None,
		}
	}
}

impl TrainingConfig {
	pub fn builder() -> TrainingConfigBuilder {
		TrainingConfigBuilder::default()
	}

	pub fn validate(&self) -> Result<()> {
		if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
			return Err(DenoiseError::InvalidParameter(format!(
				"Learning rate ({}) must be greater than 0",
				self.learning_rate
			)));
		}
		if self.batch_size == 0 {
			return Err(DenoiseError::InvalidParameter(format!(
				"Batch size ({}) must be greater than 0",
				self.batch_size
			)));
		}
		if self.epochs == 0 {
			return Err(DenoiseError::InvalidParameter(format!(
				"Epoch count ({}) must be greater than 0",
				self.epochs
			)));
		}
		if !(self.noise_level >= 0.0 && self.noise_level.is_finite()) {
			return Err(DenoiseError::InvalidParameter(format!(
				"Noise level ({}) must be a non-negative number",
				self.noise_level
			)));
		}
		if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
			return Err(DenoiseError::InvalidParameter(format!(
				"Learning rate factor ({}) must be in (0, 1)",
				self.lr_factor
			)));
		}
		if self.workers == Some(0) {
			return Err(DenoiseError::InvalidParameter("Worker count must be greater than 0".into()));
		}
		Ok(())
	}

	/// Noise standard deviation on the normalized [0, 1] intensity scale.
	pub fn sigma(&self) -> f64 {
		self.noise_level / training::NOISE_SCALE
	}
}

#[derive(Default)]
pub struct TrainingConfigBuilder {
	train_set: Option<PathBuf>,
	val_set: Option<PathBuf>,
	batch_size: Option<usize>,
	epochs: Option<usize>,
	learning_rate: Option<f64>,
	noise_level: Option<f64>,
	log_dir: Option<PathBuf>,
	model_dir: Option<PathBuf>,
	patience: Option<usize>,
	lr_factor: Option<f64>,
	workers: Option<usize>,
	seed: Option<u64>,
	cache: Option<bool>,
	start_parameters: Option<PathBuf>,
}

impl TrainingConfigBuilder {
	pub fn train_set(mut self, path: impl Into<PathBuf>) -> Self {
		self.train_set = Some(path.into());
		self
	}

	pub fn val_set(mut self, path: impl Into<PathBuf>) -> Self {
		self.val_set = Some(path.into());
		self
	}

	pub fn batch_size(mut self, size: usize) -> Self {
		self.batch_size = Some(size);
		self
	}

	pub fn epochs(mut self, epochs: usize) -> Self {
		self.epochs = Some(epochs);
		self
	}

	pub fn learning_rate(mut self, rate: f64) -> Self {
		self.learning_rate = Some(rate);
		self
	}

	pub fn noise_level(mut self, level: f64) -> Self {
		self.noise_level = Some(level);
		self
	}

	pub fn log_dir(mut self, path: impl Into<PathBuf>) -> Self {
		self.log_dir = Some(path.into());
		self
	}

	pub fn model_dir(mut self, path: impl Into<PathBuf>) -> Self {
		self.model_dir = Some(path.into());
		self
	}

	pub fn patience(mut self, patience: usize) -> Self {
		self.patience = Some(patience);
		self
	}

	pub fn lr_factor(mut self, factor: f64) -> Self {
		self.lr_factor = Some(factor);
		self
	}

	pub fn workers(mut self, workers: usize) -> Self {
		self.workers = Some(workers);
		self
	}

	pub fn seed(mut self, seed: u64) -> Self {
		self.seed = Some(seed);
		self
	}

	pub fn cache(mut self, cache: bool) -> Self {
		self.cache = Some(cache);
		self
	}

	pub fn start_parameters(mut self, path: impl Into<PathBuf>) -> Self {
		self.start_parameters = Some(path.into());
		self
	}

	pub fn build(self) -> TrainingConfig {
		let defaults = TrainingConfig::default();
		TrainingConfig {
			train_set: self.train_set.unwrap_or(defaults.train_set),
			val_set: self.val_set.unwrap_or(defaults.val_set),
			batch_size: self.batch_size.unwrap_or(defaults.batch_size),
			epochs: self.epochs.unwrap_or(defaults.epochs),
			learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
			noise_level: self.noise_level.unwrap_or(defaults.noise_level),
			log_dir: self.log_dir.unwrap_or(defaults.log_dir),
			model_dir: self.model_dir.unwrap_or(defaults.model_dir),
			patience: self.patience.unwrap_or(defaults.patience),
			lr_factor: self.lr_factor.unwrap_or(defaults.lr_factor),
			workers: self.workers.or(defaults.workers),
			seed: self.seed.or(defaults.seed),
			cache: self.cache.unwrap_or(defaults.cache),
			start_parameters: self.start_parameters.or(defaults.start_parameters),
		}
	}
}
