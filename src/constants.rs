pub mod network {
	pub const DEFAULT_NUM_LAYERS: usize = 17;
	pub const DEFAULT_NUM_FILTERS: usize = 64;
	pub const DEFAULT_KERNEL_SIZE: usize = 3;
	pub const DEFAULT_STRIDE: usize = 1;
	/// Kaiming normal gain for ReLU layers.
	pub const KAIMING_GAIN: f32 = 2.0;
}

pub mod training {
	pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
	pub const DEFAULT_BATCH_SIZE: usize = 128;
	pub const DEFAULT_EPOCHS: usize = 80;
	pub const DEFAULT_NOISE_LEVEL: f64 = 25.0;
	pub const NOISE_SCALE: f64 = 255.0;
	pub const ADAM_BETA1: f64 = 0.9;
	pub const ADAM_BETA2: f64 = 0.999;
	pub const ADAM_EPSILON: f64 = 1e-8;
	/// Epoch indices divisible by this emit image grids.
	pub const IMAGE_SAMPLE_INTERVAL: usize = 5;
}

pub mod scheduler {
	pub const DEFAULT_PATIENCE: usize = 4;
	pub const DEFAULT_FACTOR: f64 = 0.1;
	pub const THRESHOLD: f64 = 1e-4;
	pub const MIN_LR: f64 = 0.0;
	pub const EPS: f64 = 1e-8;
}

pub mod io {
	pub const PREFETCH_DEPTH: usize = 2;
	pub const STORE_MAGIC: &[u8; 8] = b"DNPSTORE";
	pub const STORE_VERSION: u32 = 1;
	pub const XZ_LEVEL: u32 = 7;
	pub const SHUFFLE_STRIDE: usize = 4;
}

pub mod psnr {
	pub const DATA_RANGE: f64 = 1.0;
	/// Reported for identical images, where the true value is infinite.
	pub const PSNR_CAP_DB: f64 = 100.0;
}

pub mod grid {
	pub const IMAGES_PER_ROW: usize = 8;
	pub const PADDING: usize = 2;
}

pub mod file {
	pub const INITIAL_HISTORY: &str = "model.npy";
	pub const BEST_HISTORY: &str = "best_model.npy";
	pub const FINAL_HISTORY: &str = "final_model.npy";
	pub const BEST_CHECKPOINT: &str = "best_model.pt";
	pub const FINAL_CHECKPOINT: &str = "final_model.pt";
	pub const EVENTS_FILE: &str = "events.jsonl";
	pub const IMAGES_DIR: &str = "images";
	pub const LOG_FILE: &str = "train.log";
}
