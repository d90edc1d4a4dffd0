//! Watch command implementation.

use super::{open_engine, CliError, Settings};
use crossbeam_channel::Sender;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use spacesync_engine::{ChangeEvent, PushWorker};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

/// Document files only; companions are written by pulls, not by users.
fn is_document_file(path: &Path) -> bool {
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let is_companion = path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with("_mapping"));
    is_json && !is_companion
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Sends `Shutdown` to the worker on SIGINT or SIGTERM.
#[cfg(unix)]
fn forward_shutdown(stop: Sender<ChangeEvent>) -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::Builder::new()
        .name("spacesync-signals".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                debug!(signal, "shutdown signal received");
                let _ = stop.send(ChangeEvent::Shutdown);
            }
        })?;
    Ok(())
}

#[cfg(not(unix))]
fn forward_shutdown(_stop: Sender<ChangeEvent>) -> std::io::Result<()> {
    Ok(())
}

/// Runs the watch command.
pub fn run(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(open_engine(settings)?);
    let content_dir = engine.config().content_dir.clone();
    let worker = PushWorker::spawn(Arc::clone(&engine))?;

    let events = worker.sender();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) if is_content_change(&event.kind) => {
                for path in event.paths.into_iter().filter(|p| is_document_file(p)) {
                    debug!(path = %path.display(), "document changed");
                    let _ = events.send(ChangeEvent::Changed(path));
                }
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "file watcher error"),
        },
        Config::default(),
    )
    .map_err(CliError::from)?;
    watcher
        .watch(&content_dir, RecursiveMode::NonRecursive)
        .map_err(CliError::from)?;

    forward_shutdown(worker.sender())?;

    info!(dir = %content_dir.display(), "watching for changes, press Ctrl-C to stop");
    let pushes = worker.wait();
    drop(watcher);

    println!("Stopped after {pushes} push(es)");
    Ok(())
}
