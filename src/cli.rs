use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

pub fn build_cli() -> ArgMatches<'static> {
	build_app().get_matches()
}

pub fn build_app() -> App<'static, 'static> {
	App::new("dncnn-train")
		.version("v0.2.0")
		.about("Trains a residual convolutional network to remove additive Gaussian noise")
		.settings(&[AppSettings::SubcommandRequiredElseHelp, AppSettings::VersionlessSubcommands])
		.arg(
			Arg::with_name("VERBOSE")
				.short("v")
				.long("verbose")
				.multiple(true)
				.global(true)
				.help("Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence"),
		)
		.arg(
			Arg::with_name("LOG_FORMAT")
				.long("log_format")
				.value_name("LOG_FORMAT")
				.possible_values(&["compact", "pretty", "json"])
				.global(true)
				.takes_value(true)
				.help("Console log format. Default: compact"),
		)
		.subcommand(build_train_subcommand())
		.subcommand(build_generate_config_subcommand())
		.subcommand(build_history_subcommand())
}

fn build_train_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("train")
		.about("Train a denoiser on a pair of patch stores")
		.arg(value_arg("TRAIN_SET", "train_set", "Patch store used for training. Default: train.dnps"))
		.arg(value_arg("VAL_SET", "val_set", "Patch store used for validation. Default: val.dnps"))
		.arg(value_arg("BATCH_SIZE", "batch_size", "Patches per batch. Default: 128").short("b"))
		.arg(value_arg("EPOCHS", "epochs", "Number of epochs to train. Default: 80").short("e"))
		.arg(value_arg("LEARNING_RATE", "lr", "Initial learning rate of the Adam optimiser. Default: 0.01").short("R"))
		.arg(value_arg("NUM_LAYERS", "num_layers", "Number of convolution layers. Default: 17").short("d"))
		.arg(value_arg("NUM_FILTERS", "num_filters", "Feature maps in each hidden layer. Default: 64").short("w"))
		.arg(value_arg("FILTER_SIZE", "filter_size", "Odd convolution kernel size. Default: 3"))
		.arg(value_arg("STRIDE", "stride", "Convolution stride, only 1 is supported. Default: 1"))
		.arg(
			value_arg(
				"NOISE_LEVEL",
				"noise_level",
				"Standard deviation of the added noise on the 0-255 scale. Default: 25",
			)
			.short("n"),
		)
		.arg(value_arg("LOG_DIR", "log_dir", "Histories, checkpoints, events and sample images. Default: logs"))
		.arg(value_arg("MODEL_DIR", "model_dir", "Model directory, created if missing. Default: models"))
		.arg(value_arg(
			"PATIENCE",
			"patience",
			"Epochs without validation improvement before the learning rate drops. Default: 4",
		))
		.arg(value_arg(
			"LR_FACTOR",
			"lr_factor",
			"Multiplier applied to the learning rate on a plateau. Default: 0.1",
		))
		.arg(value_arg("WORKERS", "workers", "Patch loading threads. Default: all cores").short("j"))
		.arg(value_arg("SEED", "seed", "Seed for shuffling, noise and initialisation"))
		.arg(
			Arg::with_name("CACHE")
				.long("cache")
				.help("Keep decoded patches in memory after the first read")
				.takes_value(false),
		)
		.arg(
			value_arg(
				"START_PARAMETERS",
				"start_parameters",
				"Start training from a checkpoint (.pt) rather than random initialisation",
			)
			.short("s"),
		)
		.arg(value_arg("CONFIG_FILE", "config", "Read defaults from this TOML file").short("c"))
		.arg(value_arg("LOG_FILE", "log_file", "Also write JSON logs to this file"))
}

fn build_generate_config_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("generate-config")
		.about("Write a commented training configuration file")
		.arg(
			Arg::with_name("OUTPUT_FILE")
				.help("Where to write the configuration. Default: training_config.toml")
				.index(1),
		)
		.arg(
			Arg::with_name("FORCE")
				.short("f")
				.long("force")
				.help("Overwrite an existing file")
				.takes_value(false),
		)
}

fn build_history_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("history")
		.about("Print a training history written during a run (model.npy, best_model.npy, final_model.npy)")
		.arg(
			Arg::with_name("HISTORY_FILE")
				.required(true)
				.index(1)
				.help("History file to print"),
		)
}

fn value_arg(name: &'static str, long: &'static str, help: &'static str) -> Arg<'static, 'static> {
	Arg::with_name(name)
		.long(long)
		.value_name(name)
		.help(help)
		.takes_value(true)
		.empty_values(false)
}
