use crate::config::{NetworkConfig, NetworkConfigBuilder, TrainingConfig, TrainingConfigBuilder};
use crate::config_file::TrainingConfigFile;
use crate::error::{DenoiseError, Result};
use crate::logging::OperationLogger;
use crate::model::{Denoiser, DnCnn};
use crate::optim::Adam;
use crate::sink::{EventFileSink, MetricsSink, NullSink};
use crate::training::{ModelCheckpoint, Trainer};
use crate::validation;
use clap::ArgMatches;
use std::path::Path;

pub fn train(app_m: &ArgMatches) -> Result<()> {
	let (network_builder, training_builder) = match app_m.value_of("CONFIG_FILE") {
		Some(path) => {
			let file = TrainingConfigFile::from_toml_file(validation::validate_input_file(Path::new(path))?)?;
			tracing::info!(config = path, "Loaded configuration file");
			file.apply(NetworkConfig::builder(), TrainingConfig::builder())
		}
		None => (NetworkConfig::builder(), TrainingConfig::builder()),
	};

	let network_config = parse_network_config(app_m, network_builder)?;
	let training_config = parse_training_config(app_m, training_builder)?;

	network_config.validate()?;
	training_config.validate()?;

	print_training_info(&network_config, &training_config);

	let mut trainer = Trainer::new(training_config.clone())?;
	let model_params = trainer.model_params(&network_config);

	let mut model = match &training_config.start_parameters {
		Some(path) => load_initial_model(path, &network_config, model_params)?,
		None => DnCnn::new(model_params, training_config.seed)?,
	};
	let mut optimizer = Adam::new(training_config.learning_rate);
	let mut sink = open_sink(&training_config.log_dir);

	let operation = OperationLogger::new("train");
	let state = match trainer.run(&mut model, &mut optimizer, sink.as_mut()) {
		Ok(state) => state,
		Err(err) => {
			operation.log_error(&err);
			return Err(err);
		}
	};
	operation.complete();
	tracing::info!(
		epochs = state.history.epochs(),
		best_val_loss = state.best_val_loss,
		log_dir = %training_config.log_dir.display(),
		"Done"
	);
	Ok(())
}

/// Event files and image grids are optional; training goes on without them.
fn open_sink(log_dir: &Path) -> Box<dyn MetricsSink> {
	match EventFileSink::create(log_dir) {
		Ok(sink) => Box::new(sink),
		Err(err) => {
			tracing::warn!(
				log_dir = %log_dir.display(),
				error = %err,
				"Could not open the event log, metrics will not be recorded"
			);
			Box::new(NullSink)
		}
	}
}

fn parse_value<T, F>(app_m: &ArgMatches, name: &str, validate: F) -> Result<Option<T>>
where
	F: Fn(&str, &str) -> Result<T>,
{
	app_m
		.value_of(name)
		.map(|raw| validate(raw, &name.to_lowercase()))
		.transpose()
}

fn validate_count(value: &str, param_name: &str) -> Result<usize> {
	validation::validate_uint(value, param_name).map(|v| v as usize)
}

fn parse_network_config(app_m: &ArgMatches, mut builder: NetworkConfigBuilder) -> Result<NetworkConfig> {
	if let Some(v) = parse_value(app_m, "NUM_LAYERS", validation::validate_positive_int)? {
		builder = builder.num_layers(v);
	}
	if let Some(v) = parse_value(app_m, "NUM_FILTERS", validation::validate_positive_int)? {
		builder = builder.num_filters(v);
	}
	if let Some(v) = parse_value(app_m, "FILTER_SIZE", validation::validate_positive_int)? {
		builder = builder.kernel_size(v);
	}
	if let Some(v) = parse_value(app_m, "STRIDE", validation::validate_positive_int)? {
		builder = builder.stride(v);
	}

	Ok(builder.build())
}

fn parse_training_config(app_m: &ArgMatches, mut builder: TrainingConfigBuilder) -> Result<TrainingConfig> {
	if let Some(path) = app_m.value_of("TRAIN_SET") {
		builder = builder.train_set(path);
	}
	if let Some(path) = app_m.value_of("VAL_SET") {
		builder = builder.val_set(path);
	}
	if let Some(v) = parse_value(app_m, "BATCH_SIZE", validation::validate_positive_int)? {
		builder = builder.batch_size(v);
	}
	if let Some(v) = parse_value(app_m, "EPOCHS", validation::validate_positive_int)? {
		builder = builder.epochs(v);
	}
	if let Some(v) = parse_value(app_m, "LEARNING_RATE", validation::validate_positive_float)? {
		builder = builder.learning_rate(v);
	}
	if let Some(v) = parse_value(app_m, "NOISE_LEVEL", validation::validate_non_negative_float)? {
		builder = builder.noise_level(v);
	}
	if let Some(path) = app_m.value_of("LOG_DIR") {
		builder = builder.log_dir(path);
	}
	if let Some(path) = app_m.value_of("MODEL_DIR") {
		builder = builder.model_dir(path);
	}
	if let Some(v) = parse_value(app_m, "PATIENCE", validate_count)? {
		builder = builder.patience(v);
	}
	if let Some(v) = parse_value(app_m, "LR_FACTOR", validation::validate_positive_float)? {
		builder = builder.lr_factor(v);
	}
	if let Some(v) = parse_value(app_m, "WORKERS", validation::validate_positive_int)? {
		builder = builder.workers(v);
	}
	if let Some(v) = parse_value(app_m, "SEED", validation::validate_uint)? {
		builder = builder.seed(v);
	}
	if app_m.is_present("CACHE") {
		builder = builder.cache(true);
	}
	if let Some(path) = app_m.value_of("START_PARAMETERS") {
		builder = builder.start_parameters(path);
	}

	Ok(builder.build())
}

fn load_initial_model(
	path: &Path,
	network_config: &NetworkConfig,
	expected: crate::config::ModelParams,
) -> Result<DnCnn> {
	tracing::info!(path = %path.display(), "Initialising with parameters from checkpoint");
	let checkpoint = ModelCheckpoint::load(validation::validate_input_file(path)?)?;
	validate_loaded_params(&checkpoint, network_config);

	if checkpoint.model.num_channels != expected.num_channels {
		return Err(DenoiseError::ShapeMismatch(format!(
			"checkpoint expects {} channels but patches have {}",
			checkpoint.model.num_channels, expected.num_channels
		)));
	}
	let model = DnCnn::from_checkpoint(checkpoint)?;
	tracing::debug!(parameters = model.parameters().len(), "Checkpoint restored");
	Ok(model)
}

fn validate_loaded_params(loaded: &ModelCheckpoint, config: &NetworkConfig) {
	let model = &loaded.model;
	if model.num_layers != config.num_layers {
		tracing::warn!(
			"Using num_layers from parameter file ({}) rather than num_layers from argument ({})",
			model.num_layers,
			config.num_layers
		);
	}
	if model.num_filters != config.num_filters {
		tracing::warn!(
			"Using num_filters from parameter file ({}) rather than num_filters from argument ({})",
			model.num_filters,
			config.num_filters
		);
	}
	if model.kernel_size != config.kernel_size {
		tracing::warn!(
			"Using filter_size from parameter file ({}) rather than filter_size from argument ({})",
			model.kernel_size,
			config.kernel_size
		);
	}
}

fn print_training_info(network_config: &NetworkConfig, training_config: &TrainingConfig) {
	println!("Training with:");
	println!(" train set: {}", training_config.train_set.display());
	println!(" val set: {}", training_config.val_set.display());
	println!(" learning rate: {}", training_config.learning_rate);
	println!(" batch_size: {}", training_config.batch_size);
	println!(" epochs: {}", training_config.epochs);
	println!(" noise level: {}", training_config.noise_level);
	println!(" num_layers: {}", network_config.num_layers);
	println!(" num_filters: {}", network_config.num_filters);
	println!(" filter_size: {}", network_config.kernel_size);
	println!(
		" plateau: patience {}, factor {}",
		training_config.patience, training_config.lr_factor
	);
	println!(" log_dir: {}", training_config.log_dir.display());
	if let Some(seed) = training_config.seed {
		println!(" seed: {}", seed);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cli::build_app;

	fn train_matches(args: &[&str]) -> ArgMatches<'static> {
		let mut argv = vec!["dncnn-train", "train"];
		argv.extend_from_slice(args);
		let matches = build_app().get_matches_from_safe(argv).unwrap();
		matches.subcommand_matches("train").unwrap().clone()
	}

	#[test]
	fn defaults_apply_without_arguments() {
		let m = train_matches(&[]);
		let training = parse_training_config(&m, TrainingConfig::builder()).unwrap();
		assert_eq!(training.batch_size, 128);
		assert_eq!(training.epochs, 80);
		assert_eq!(training.train_set, Path::new("train.dnps"));
		let network = parse_network_config(&m, NetworkConfig::builder()).unwrap();
		assert_eq!(network.num_layers, 17);
	}

	#[test]
	fn command_line_overrides_file() {
		let file: TrainingConfigFile = toml::from_str("[training]\nbatch_size = 16\nepochs = 2\n").unwrap();
		let (network, training) = file.apply(NetworkConfig::builder(), TrainingConfig::builder());
		let m = train_matches(&["--batch_size", "8", "--num_layers", "5"]);
		let training = parse_training_config(&m, training).unwrap();
		let network = parse_network_config(&m, network).unwrap();
		assert_eq!(training.batch_size, 8);
		assert_eq!(training.epochs, 2);
		assert_eq!(network.num_layers, 5);
	}

	#[test]
	fn out_of_range_arguments_are_rejected() {
		let m = train_matches(&["--batch_size", "0"]);
		assert!(matches!(
			parse_training_config(&m, TrainingConfig::builder()),
			Err(DenoiseError::InvalidParameter(_))
		));

		let m = train_matches(&["--noise_level=-5"]);
		assert!(matches!(
			parse_training_config(&m, TrainingConfig::builder()),
			Err(DenoiseError::InvalidParameter(_))
		));

		let m = train_matches(&["--noise_level", "0", "--patience", "0", "--seed", "0"]);
		let training = parse_training_config(&m, TrainingConfig::builder()).unwrap();
		assert_eq!(training.noise_level, 0.0);
		assert_eq!(training.patience, 0);
		assert_eq!(training.seed, Some(0));
	}

	#[test]
	fn unusable_log_dir_falls_back_to_a_null_sink() {
		let dir = tempfile::TempDir::new().unwrap();
		let blocked = dir.path().join("logs");
		std::fs::write(&blocked, b"not a directory").unwrap();

		let mut sink = open_sink(&blocked);
		assert!(sink.add_scalar("loss", 1.0, 0).is_ok());
		assert!(blocked.is_file());
	}

	#[test]
	fn bad_numbers_are_parse_errors() {
		let m = train_matches(&["--lr", "fast"]);
		assert!(matches!(
			parse_training_config(&m, TrainingConfig::builder()),
			Err(DenoiseError::Parse(_))
		));
	}
}
