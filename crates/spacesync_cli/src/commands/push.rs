//! Push command implementation.

use super::{open_engine, Settings};

/// Runs the push command.
pub fn run(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(settings)?;
    let report = engine.push()?;

    println!(
        "Created {}, updated {}, deleted {}, unchanged {}",
        report.created, report.updated, report.deleted, report.unchanged
    );
    super::print_failures(&report.failures);
    Ok(())
}
