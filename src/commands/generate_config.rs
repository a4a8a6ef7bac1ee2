use crate::config_file::TrainingConfigFile;
use crate::error::{DenoiseError, Result};
use clap::ArgMatches;
use std::fs;
use std::path::Path;
use tracing::info;

pub fn generate_config(app_m: &ArgMatches) -> Result<()> {
    let output_path = app_m
        .value_of("OUTPUT_FILE")
        .unwrap_or("training_config.toml");

    write_example(Path::new(output_path), app_m.is_present("FORCE"))?;

    info!("Generated example configuration file with comments: {}", output_path);
    info!("You can now edit the configuration file and use it with:");
    info!("  dncnn-train train --config {}", output_path);

    Ok(())
}

fn write_example(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(DenoiseError::InvalidParameter(format!(
            "File {} already exists. Use --force to overwrite",
            path.display()
        )));
    }

    fs::write(path, TrainingConfigFile::create_example_toml())?;
    Ok(())
}
