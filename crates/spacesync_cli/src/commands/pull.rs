//! Pull command implementation.

use super::{open_engine, Settings};

/// Runs the pull command.
pub fn run(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(settings)?;
    let report = engine.pull()?;

    println!(
        "Pulled {} document(s), {} attachment(s)",
        report.pulled, report.attachments_downloaded
    );
    if report.skipped_tombstoned > 0 {
        println!("Skipped {} locally deleted document(s)", report.skipped_tombstoned);
    }
    if report.attachments_skipped > 0 {
        println!(
            "Skipped {} attachment(s) after repeated failures",
            report.attachments_skipped
        );
    }
    super::print_failures(&report.failures);
    Ok(())
}
