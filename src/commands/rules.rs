//! Rules command implementation.

use memwatch::config::MonitorConfig;
use memwatch::process::classifier::render_rules;

/// Prints the active rule table in evaluation order.
pub fn command_rules(config: &MonitorConfig) -> anyhow::Result<()> {
    println!("memwatch - Classification Rules");
    println!("===============================");
    println!();
    print!("{}", render_rules(&config.rules));
    println!();
    println!("📋 Total: {} rules", config.rules.len());
    Ok(())
}
