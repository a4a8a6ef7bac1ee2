use crate::config::{NetworkConfigBuilder, TrainingConfigBuilder};
use crate::constants::{network, scheduler, training};
use crate::error::{DenoiseError, Result};
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Training configuration loaded from a TOML file.
///
/// Every field is optional. Values present in the file override the built-in
/// defaults, and command line arguments override the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfigFile {
    /// Network architecture configuration
    #[serde(default)]
    pub network: NetworkConfigSection,

    /// Optimisation hyperparameters
    #[serde(default)]
    pub training: TrainingConfigSection,

    /// Patch stores and loading
    #[serde(default)]
    pub data: DataConfigSection,

    /// Output locations
    #[serde(default)]
    pub output: OutputConfigSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfigSection {
    /// Number of convolution layers (default: 17)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_layers: Option<usize>,

    /// Feature maps in each hidden layer (default: 64)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_filters: Option<usize>,

    /// Square kernel size, must be odd (default: 3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_size: Option<usize>,

    /// Convolution stride, must be 1 (default: 1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stride: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfigSection {
    /// Patches per batch (default: 128)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Number of epochs (default: 80)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epochs: Option<usize>,

    /// Initial Adam learning rate (default: 0.01)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,

    /// Noise standard deviation on the 0-255 scale (default: 25)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_level: Option<f64>,

    /// Plateau epochs tolerated before the rate drops (default: 4)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patience: Option<usize>,

    /// Multiplier applied on plateau (default: 0.1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lr_factor: Option<f64>,

    /// Seed for shuffling, noise and initialisation (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfigSection {
    /// Training patch store (default: "train.dnps")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_set: Option<PathBuf>,

    /// Validation patch store (default: "val.dnps")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_set: Option<PathBuf>,

    /// Loader threads (default: all cores)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Keep decoded patches in memory (default: false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfigSection {
    /// Histories, checkpoints and events (default: "logs")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Model directory (default: "models")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,

    /// Checkpoint to initialise from (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_parameters: Option<PathBuf>,
}

impl TrainingConfigFile {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;

        toml::from_str(&contents)
            .map_err(|e| DenoiseError::Parse(format!("Failed to parse TOML config: {}", e)))
    }

    /// Layers the values present in the file onto the builders
    pub fn apply(
        &self,
        mut network: NetworkConfigBuilder,
        mut training: TrainingConfigBuilder,
    ) -> (NetworkConfigBuilder, TrainingConfigBuilder) {
        let n = &self.network;
        if let Some(v) = n.num_layers {
            network = network.num_layers(v);
        }
        if let Some(v) = n.num_filters {
            network = network.num_filters(v);
        }
        if let Some(v) = n.filter_size {
            network = network.kernel_size(v);
        }
        if let Some(v) = n.stride {
            network = network.stride(v);
        }

        let t = &self.training;
        if let Some(v) = t.batch_size {
            training = training.batch_size(v);
        }
        if let Some(v) = t.epochs {
            training = training.epochs(v);
        }
        if let Some(v) = t.learning_rate {
            training = training.learning_rate(v);
        }
        if let Some(v) = t.noise_level {
            training = training.noise_level(v);
        }
        if let Some(v) = t.patience {
            training = training.patience(v);
        }
        if let Some(v) = t.lr_factor {
            training = training.lr_factor(v);
        }
        if let Some(v) = t.seed {
            training = training.seed(v);
        }

        let d = &self.data;
        if let Some(v) = &d.train_set {
            training = training.train_set(v);
        }
        if let Some(v) = &d.val_set {
            training = training.val_set(v);
        }
        if let Some(v) = d.workers {
            training = training.workers(v);
        }
        if let Some(v) = d.cache {
            training = training.cache(v);
        }

        let o = &self.output;
        if let Some(v) = &o.log_dir {
            training = training.log_dir(v);
        }
        if let Some(v) = &o.model_dir {
            training = training.model_dir(v);
        }
        if let Some(v) = &o.start_parameters {
            training = training.start_parameters(v);
        }

        (network, training)
    }

    /// Generate a configuration holding every default explicitly
    pub fn generate_default() -> Self {
        Self {
            network: NetworkConfigSection {
                num_layers: Some(network::DEFAULT_NUM_LAYERS),
                num_filters: Some(network::DEFAULT_NUM_FILTERS),
                filter_size: Some(network::DEFAULT_KERNEL_SIZE),
                stride: Some(network::DEFAULT_STRIDE),
            },
            training: TrainingConfigSection {
                batch_size: Some(training::DEFAULT_BATCH_SIZE),
                epochs: Some(training::DEFAULT_EPOCHS),
                learning_rate: Some(training::DEFAULT_LEARNING_RATE),
                noise_level: Some(training::DEFAULT_NOISE_LEVEL),
                patience: Some(scheduler::DEFAULT_PATIENCE),
                lr_factor: Some(scheduler::DEFAULT_FACTOR),
                seed: None,
            },
            data: DataConfigSection {
                train_set: Some(PathBuf::from("train.dnps")),
                val_set: Some(PathBuf::from("val.dnps")),
                workers: None,
                cache: Some(false),
            },
            output: OutputConfigSection {
                log_dir: Some(PathBuf::from("logs")),
                model_dir: Some(PathBuf::from("models")),
                start_parameters: None,
            },
        }
    }

    /// Create an example configuration file with comments
    pub fn create_example_toml() -> String {
        r#"# DnCNN training configuration
# Command line arguments take precedence over values in this file.

[network]
# Number of convolution layers, including the first and last
num_layers = 17

# Feature maps in each hidden layer
num_filters = 64

# Square kernel size, must be odd
filter_size = 3

# Convolution stride, only 1 is supported
stride = 1

[training]
# Patches per batch
batch_size = 128

# Number of passes over the training store
epochs = 80

# Initial Adam learning rate
learning_rate = 0.01

# Gaussian noise standard deviation on the 0-255 scale
noise_level = 25.0

# Epochs without validation improvement before the rate drops
patience = 4

# Multiplier applied to the rate on a plateau
lr_factor = 0.1

# Fixes shuffling, noise and initialisation (optional)
# seed = 42

[data]
# Patch stores
train_set = "train.dnps"
val_set = "val.dnps"

# Loader threads (optional, defaults to all cores)
# workers = 4

# Keep decoded patches in memory
cache = false

[output]
# Histories, checkpoints, events and sample images
log_dir = "logs"

# Model directory
model_dir = "models"

# Initialise from an earlier checkpoint (optional)
# start_parameters = "logs/best_model.pt"
"#
        .to_string()
    }
}
