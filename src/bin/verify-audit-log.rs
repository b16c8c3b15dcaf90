use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info};

use security_gate_app::audit::{
    load_audit_log_from_file, verify_audit_log, verify_audit_log_detailed, AuditLogEntry,
};

fn main() -> Result<()> {
    let matches = Command::new("verify-audit-log")
        .version("1.0.0")
        .about("Verify security gate audit trail integrity")
        .arg(
            Arg::new("log-path")
                .short('l')
                .long("log-path")
                .value_name("PATH")
                .help("Path to audit log file")
                .required(true),
        )
        .arg(
            Arg::new("head")
                .long("head")
                .value_name("HASH")
                .help("Expected hash of the last entry"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress output except errors"),
        )
        .get_matches();

    let log_path = matches
        .get_one::<String>("log-path")
        .ok_or_else(|| anyhow!("--log-path is required"))?;
    let expected_head = matches.get_one::<String>("head");
    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = verify_file(Path::new(log_path), expected_head, verbose) {
        error!("Audit log verification failed: {}", e);
        std::process::exit(1);
    }

    if !quiet {
        println!("{}", verify_audit_log_detailed(Path::new(log_path)).summary());
    }

    Ok(())
}

fn verify_file(path: &Path, expected_head: Option<&String>, verbose: bool) -> Result<()> {
    info!("Verifying audit log: {:?}", path);

    if !path.exists() {
        return Err(anyhow!("Audit log file not found: {:?}", path));
    }

    let entries = load_audit_log_from_file(path)?;
    verify_audit_log(&entries)?;

    let last = entries
        .last()
        .ok_or_else(|| anyhow!("Audit log is empty"))?;

    if let Some(expected) = expected_head {
        if &last.this_log_hash != expected {
            return Err(anyhow!(
                "Head hash mismatch. Expected: {}, Got: {}",
                expected,
                last.this_log_hash
            ));
        }
    }

    if verbose {
        print_summary(&entries);
    }
    Ok(())
}

fn print_summary(entries: &[AuditLogEntry]) {
    println!("Audit Log Summary:");
    println!("  Total entries: {}", entries.len());
    if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
        println!("  First entry: {}", first.timestamp);
        println!("  Last entry: {}", last.timestamp);
        println!("  Head hash: {}", last.this_log_hash);
    }

    let mut events: BTreeMap<String, usize> = BTreeMap::new();
    for entry in entries {
        *events.entry(entry.event.as_str().to_string()).or_insert(0) += 1;
    }
    println!("\nEvent distribution:");
    for (event, count) in events {
        println!("  {}: {}", event, count);
    }

    for entry in entries {
        if let (Some(actor), Some(reason)) = (entry.metadata.get("actor"), entry.metadata.get("reason")) {
            println!("  Override on {} by {}: {}", entry.subject, actor, reason);
        }
    }
}
