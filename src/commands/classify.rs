//! Classify command implementation.
//!
//! Runs the configured rule table against command lines given on the CLI,
//! without touching /proc.

use memwatch::config::MonitorConfig;

/// Prints the role each command line resolves to.
pub fn command_classify(config: &MonitorConfig, cmdlines: &[String]) -> anyhow::Result<()> {
    let classifier = config.validate()?;

    for cmdline in cmdlines {
        match classifier.classify_cmdline(cmdline) {
            Some(role) => println!("{:12} {}", role.as_str(), cmdline),
            None => println!("{:12} {}", "-", cmdline),
        }
    }
    Ok(())
}
