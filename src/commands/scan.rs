//! Scan command implementation.
//!
//! Enumerates local processes once, classifies them and reads usage for
//! every match.

use std::collections::BTreeMap;
use std::time::Instant;

use memwatch::config::MonitorConfig;
use memwatch::process::{ProcScanner, ProcUsageReader, ProcessSource, UsageReader};
use memwatch::roles::Role;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Prints every process that matches a role, lowest pid first.
pub fn command_scan(config: &MonitorConfig, verbose: bool) -> anyhow::Result<()> {
    println!("🔍 memwatch - Process Scan");
    println!("==========================");

    let classifier = config.validate()?;
    let start = Instant::now();
    let processes = ProcScanner::default().snapshot()?;
    let roles = classifier.classify(&processes);
    let reader = ProcUsageReader::default();

    let mut by_role: BTreeMap<Role, Vec<u32>> = BTreeMap::new();
    for (pid, role) in roles.iter() {
        by_role.entry(*role).or_default().push(*pid);
    }

    for role in Role::ALL {
        println!("\n🏷️  Role: {}", role);
        println!("{}", "─".repeat(50));
        let Some(pids) = by_role.get_mut(&role) else {
            println!("   (no matching process)");
            continue;
        };
        pids.sort_unstable();
        for (i, pid) in pids.iter().enumerate() {
            let marker = if i == 0 { "*" } else { " " };
            let cmdline = processes
                .iter()
                .find(|p| p.pid == *pid)
                .map(|p| p.cmdline.as_str())
                .unwrap_or("");
            match reader.read(*pid) {
                Ok(usage) => println!(
                    " {} {:>7}  {:>10.1} MB  {}",
                    marker,
                    pid,
                    usage.memory_bytes as f64 / BYTES_PER_MB,
                    cmdline
                ),
                Err(e) => println!(" {} {:>7}  {:>13}  {} ({})", marker, pid, "n/a", cmdline, e),
            }
        }
    }

    if verbose {
        println!("\n📂 Unmatched processes");
        println!("{}", "─".repeat(50));
        for p in processes.iter().filter(|p| !roles.contains_key(&p.pid)) {
            println!("   {:>7}  {}", p.pid, p.cmdline);
        }
    }

    println!(
        "\n📋 {} processes scanned, {} matched in {:.1} ms (* = sampled)",
        processes.len(),
        roles.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}
