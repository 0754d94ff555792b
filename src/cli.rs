//! CLI arguments and subcommands for memwatch.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

use memwatch::config::{ConfigOverrides, FileFormat};

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl From<ConfigFormat> for FileFormat {
    fn from(f: ConfigFormat) -> Self {
        match f {
            ConfigFormat::Yaml => FileFormat::Yaml,
            ConfigFormat::Json => FileFormat::Json,
            ConfigFormat::Toml => FileFormat::Toml,
        }
    }
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "memwatch",
    about = "Memory telemetry and leak detection for a service/supervisor process pair",
    long_about = "Memory telemetry and leak detection for a service/supervisor process pair.\n\n\
                  Samples resident memory and CPU of the background service and its \
                  supervisor on a fixed interval, keeps a bounded history per role and \
                  flags sustained memory growth. Results are served over HTTP, as a \
                  server-sent events stream and as Prometheus metrics.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Sampling interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Samples retained per role
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

impl Args {
    /// CLI values that take precedence over the config file.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind: self.bind.map(|ip| ip.to_string()),
            port: self.port,
            interval_ms: self.interval_ms,
            capacity: self.capacity,
        }
    }
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the classification rule table
    Rules,

    /// Dry-run the classifier on command lines
    Classify {
        /// Command lines to classify (quote each one)
        #[arg(required = true)]
        cmdlines: Vec<String>,
    },

    /// Classify local processes once and print matches with memory usage
    Scan {
        /// Also list processes that matched no role
        #[arg(long)]
        verbose: bool,
    },

    /// Generate a configuration file with the defaults
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_from_flags() {
        let args = Args::parse_from([
            "memwatch",
            "--port",
            "9999",
            "--bind",
            "0.0.0.0",
            "--interval-ms",
            "250",
        ]);
        let o = args.overrides();
        assert_eq!(o.port, Some(9999));
        assert_eq!(o.bind.as_deref(), Some("0.0.0.0"));
        assert_eq!(o.interval_ms, Some(250));
        assert_eq!(o.capacity, None);
    }

    #[test]
    fn test_classify_requires_cmdline() {
        assert!(Args::try_parse_from(["memwatch", "classify"]).is_err());
        let args = Args::try_parse_from(["memwatch", "classify", "python3 -m pastewise.agent"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Classify { ref cmdlines }) if cmdlines.len() == 1));
    }
}
