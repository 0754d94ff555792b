//! CLI command implementations for memwatch.
//!
//! This module provides implementations for all CLI subcommands:
//! - `rules`: Rule table listing
//! - `classify`: Classifier dry run on given command lines
//! - `scan`: One-shot classification of local processes
//! - `config`: Configuration file generation

pub mod classify;
pub mod config;
pub mod rules;
pub mod scan;

// Re-export command functions
pub use classify::command_classify;
pub use config::command_config;
pub use rules::command_rules;
pub use scan::command_scan;

use memwatch::config::MonitorConfig;

use crate::cli::Commands;

/// Runs a subcommand. `load` is only called by commands that work on the
/// active configuration; `config` writes the defaults without it.
pub fn run_command<F>(command: &Commands, load: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<MonitorConfig>,
{
    match command {
        Commands::Config { output, format } => command_config(output.clone(), *format),
        Commands::Rules => command_rules(&load()?),
        Commands::Classify { cmdlines } => command_classify(&load()?, cmdlines),
        Commands::Scan { verbose } => command_scan(&load()?, *verbose),
    }
}
