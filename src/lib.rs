//! Training and validation engine for residual convolutional denoisers.
//!
//! Clean patches are read from a `.dnps` patch store, corrupted with
//! Gaussian noise, and a network is trained to predict that noise. The
//! denoised image is the corrupted input minus the prediction.

pub mod cli;
pub mod commands;
pub mod config;
pub mod config_file;
pub mod constants;
pub mod error;
pub mod logging;
pub mod model;
pub mod noise;
pub mod optim;
pub mod psnr;
pub mod sink;
pub mod store;
pub mod training;
pub mod validation;

pub use config::{ModelParams, NetworkConfig, TrainingConfig};
pub use error::{DenoiseError, Result};
pub use model::{Denoiser, DnCnn};
pub use noise::NoiseSynthesizer;
pub use optim::{Adam, Optimizer};
pub use sink::{EventFileSink, MetricsSink, NullSink};
pub use store::{PatchStore, PatchStoreWriter, StoreOptions};
pub use training::{ModelCheckpoint, RunHistory, Trainer, TrainingState};
