//! CLI command implementations.

pub mod pull;
pub mod push;
pub mod status;
pub mod watch;

use crate::client::ReqwestClient;
use spacesync_engine::{SyncConfig, SyncEngine, SyncError};
use spacesync_remote::{ConfluenceRemote, RemoteConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The engine type every command runs.
pub type Engine = SyncEngine<ConfluenceRemote<ReqwestClient>>;

/// Errors specific to the command-line front end.
#[derive(Error, Debug)]
pub enum CliError {
    /// A mandatory setting was neither passed as a flag nor set in the environment.
    #[error("{0} is not set")]
    MissingSetting(&'static str),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The sync engine failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The file watcher failed.
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Resolved settings from flags and environment.
#[derive(Clone)]
pub struct Settings {
    /// Site base URL.
    pub url: String,
    /// Account name.
    pub username: String,
    /// API token.
    pub api_token: String,
    /// Space to mirror.
    pub space_key: String,
    /// REST API version.
    pub api_version: String,
    /// Document directory.
    pub content_dir: PathBuf,
    /// Attachment directory.
    pub attachments_dir: PathBuf,
    /// Sync state directory.
    pub cache_dir: PathBuf,
}

impl Settings {
    fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(Path::new("."), self.space_key.clone())
            .with_content_dir(self.content_dir.clone())
            .with_attachments_dir(self.attachments_dir.clone())
            .with_cache_dir(self.cache_dir.clone())
    }
}

/// Builds the HTTP client, the remote and the engine, in that order.
pub fn open_engine(settings: &Settings) -> Result<Engine, CliError> {
    let remote_config =
        RemoteConfig::new(settings.url.clone()).with_api_version(settings.api_version.clone());
    let client = ReqwestClient::new(&remote_config, &settings.username, &settings.api_token)?;
    let remote = ConfluenceRemote::new(remote_config, client);
    Ok(SyncEngine::open(settings.sync_config(), remote)?)
}

fn print_failures(failures: &[spacesync_engine::ItemFailure]) {
    if failures.is_empty() {
        return;
    }
    println!("{} item(s) failed and will be retried on the next run:", failures.len());
    for failure in failures {
        println!("  {}: {}", failure.object, failure.reason);
    }
}
