//! Status command implementation.

use super::{open_engine, Settings};
use spacesync_engine::StatusReport;

/// Runs the status command.
pub fn run(settings: &Settings, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(settings)?;
    let status = engine.status()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&status)?),
        "text" => print_text(&status),
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}

fn print_text(status: &StatusReport) {
    println!("Tracked files:   {}", status.tracked_files);
    println!("Mapped IDs:      {}", status.mapped_ids);
    println!("Tombstones:      {}", status.tombstones);

    if !status.pending_changes.is_empty() {
        println!();
        println!("Pending changes:");
        for filename in &status.pending_changes {
            println!("  {filename}");
        }
    }
    if !status.pending_deletions.is_empty() {
        println!();
        println!("Pending deletions:");
        for filename in &status.pending_deletions {
            println!("  {filename}");
        }
    }
    if !status.suppressed_attachments.is_empty() {
        println!();
        println!("Suppressed attachments:");
        for name in &status.suppressed_attachments {
            println!("  {name}");
        }
    }
}
