extern crate dncnn_trainer;

use std::path::PathBuf;

use dncnn_trainer::{cli, commands, logging};

fn main() {
	let app_m = cli::build_cli();

	let mut log_config = logging::LogConfig::from_verbosity(app_m.occurrences_of("VERBOSE"));
	let mut log_format = app_m.value_of("LOG_FORMAT");
	if let (_, Some(sub_m)) = app_m.subcommand() {
		log_config.level = logging::LogConfig::from_verbosity(
			app_m.occurrences_of("VERBOSE").max(sub_m.occurrences_of("VERBOSE")),
		)
		.level;
		log_format = sub_m.value_of("LOG_FORMAT").or(log_format);
		log_config.log_file = sub_m.value_of("LOG_FILE").map(PathBuf::from);
	}
	if let Some(name) = log_format {
		match name.parse() {
			Ok(format) => log_config.format = format,
			Err(err) => eprintln!("{}", err),
		}
	}

	let guard = match logging::init_logging(log_config) {
		Ok(guard) => guard,
		Err(err) => {
			eprintln!("Could not initialise logging: {}", err);
			None
		}
	};

	let result = match app_m.subcommand() {
		("train", Some(sub_m)) => commands::train(sub_m),
		("generate-config", Some(sub_m)) => commands::generate_config(sub_m),
		("history", Some(sub_m)) => commands::history(sub_m),
		_ => {
			println!("{}", app_m.usage());
			Ok(())
		}
	};

	if let Err(err) = result {
		tracing::error!("Error: {}", err);
		drop(guard);
		std::process::exit(1);
	}
}
