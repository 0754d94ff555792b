//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use memwatch::config::{render_config, MonitorConfig};

use crate::cli::ConfigFormat;

/// Writes the default configuration to `output` or stdout.
pub fn command_config(output: Option<PathBuf>, format: ConfigFormat) -> anyhow::Result<()> {
    let content = render_config(&MonitorConfig::default(), format.into())?;

    let output = match output {
        Some(path) => path,
        None => PathBuf::from(match format {
            ConfigFormat::Yaml => "memwatch.yaml",
            ConfigFormat::Json => "memwatch.json",
            ConfigFormat::Toml => "memwatch.toml",
        }),
    };

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}
