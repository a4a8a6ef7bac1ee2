use dncnn_trainer::config::{NetworkConfig, TrainingConfig};
use dncnn_trainer::config_file::TrainingConfigFile;
use std::path::PathBuf;

#[test]
fn test_network_config_default() {
    let config = NetworkConfig::default();
    assert_eq!(config.num_layers, 17);
    assert_eq!(config.num_filters, 64);
    assert_eq!(config.kernel_size, 3);
    assert_eq!(config.stride, 1);
}

#[test]
fn test_network_config_validate_success() {
    let config = NetworkConfig::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_network_config_validate_zero_layers() {
    let config = NetworkConfig::builder().num_layers(0).build();
    let result = config.validate();
    assert!(result.is_err());
    assert!(format!("{}", result.unwrap_err()).contains("Number of layers must be greater than 0"));
}

#[test]
fn test_network_config_validate_even_kernel() {
    let config = NetworkConfig::builder().kernel_size(4).build();
    let result = config.validate();
    assert!(result.is_err());
    assert!(format!("{}", result.unwrap_err()).contains("must be a positive odd number"));
}

#[test]
fn test_network_config_validate_stride() {
    let config = NetworkConfig::builder().stride(2).build();
    assert!(config.validate().is_err());
}

#[test]
fn test_network_config_builder() {
    let config = NetworkConfig::builder()
        .num_layers(20)
        .num_filters(32)
        .kernel_size(5)
        .build();
    assert_eq!(config.num_layers, 20);
    assert_eq!(config.num_filters, 32);
    assert_eq!(config.kernel_size, 5);
    assert_eq!(config.stride, 1);

    let params = config.model_params(3, 40);
    assert_eq!(params.num_channels, 3);
    assert_eq!(params.patch_size, 40);
    assert_eq!(params.num_layers, 20);
}

#[test]
fn test_training_config_default() {
    let config = TrainingConfig::default();
    assert_eq!(config.train_set, PathBuf::from("train.dnps"));
    assert_eq!(config.val_set, PathBuf::from("val.dnps"));
    assert_eq!(config.batch_size, 128);
    assert_eq!(config.epochs, 80);
    assert_eq!(config.learning_rate, 0.01);
    assert_eq!(config.noise_level, 25.0);
    assert_eq!(config.log_dir, PathBuf::from("logs"));
    assert_eq!(config.model_dir, PathBuf::from("models"));
    assert_eq!(config.patience, 4);
    assert_eq!(config.lr_factor, 0.1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_training_config_sigma() {
    let config = TrainingConfig::builder().noise_level(51.0).build();
    assert!((config.sigma() - 0.2).abs() < 1e-12);
}

#[test]
fn test_training_config_validate_rejects() {
    assert!(TrainingConfig::builder().learning_rate(0.0).build().validate().is_err());
    assert!(TrainingConfig::builder().batch_size(0).build().validate().is_err());
    assert!(TrainingConfig::builder().epochs(0).build().validate().is_err());
    assert!(TrainingConfig::builder().noise_level(-1.0).build().validate().is_err());
    assert!(TrainingConfig::builder().lr_factor(1.0).build().validate().is_err());
    assert!(TrainingConfig::builder().workers(0).build().validate().is_err());
}

#[test]
fn test_zero_noise_is_allowed() {
    let config = TrainingConfig::builder().noise_level(0.0).build();
    assert!(config.validate().is_ok());
    assert_eq!(config.sigma(), 0.0);
}

#[test]
fn test_config_file_overlay() {
    let file: TrainingConfigFile = toml::from_str(
        r#"
[network]
num_layers = 9

[data]
train_set = "patches/train.dnps"
cache = true

[output]
log_dir = "runs/a"
"#,
    )
    .unwrap();

    let (network, training) = file.apply(NetworkConfig::builder(), TrainingConfig::builder());
    let network = network.build();
    let training = training.build();

    assert_eq!(network.num_layers, 9);
    assert_eq!(network.num_filters, 64);
    assert_eq!(training.train_set, PathBuf::from("patches/train.dnps"));
    assert_eq!(training.val_set, PathBuf::from("val.dnps"));
    assert!(training.cache);
    assert_eq!(training.log_dir, PathBuf::from("runs/a"));
}
