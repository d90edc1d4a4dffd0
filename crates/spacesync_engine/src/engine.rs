//! The sync engine facade.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::mirror::LocalMirror;
use crate::pull::PullReconciler;
use crate::push::PushReconciler;
use crate::report::{PullReport, PushReport, StatusReport};
use crate::store::StateStore;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use spacesync_remote::RemoteService;
use std::collections::HashSet;
use std::time::Instant;
use tracing::error;

/// What the engine is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No run in progress.
    Idle,
    /// A pull is running.
    Pulling,
    /// A push is running.
    Pushing,
    /// The last run completed.
    Synced,
    /// The last run failed.
    Error,
}

impl EngineState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Pulling | EngineState::Pushing)
    }
}

/// Counters across the runs of one engine.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Pulls completed.
    pub pulls_completed: u64,
    /// Pushes completed.
    pub pushes_completed: u64,
    /// Documents written locally.
    pub documents_pulled: u64,
    /// Remote mutations made.
    pub mutations_pushed: u64,
    /// Item failures across all runs.
    pub item_failures: u64,
    /// When the last run finished.
    pub last_sync_time: Option<Instant>,
    /// Last run-level error.
    pub last_error: Option<String>,
}

/// Synchronizes a local tree with one remote container.
///
/// Runs are serialized: `pull` and `push` hold a run guard for their whole
/// duration, so concurrent callers wait their turn. The cache directory
/// lock held by the engine keeps other processes out.
pub struct SyncEngine<R: RemoteService> {
    config: SyncConfig,
    remote: R,
    mirror: LocalMirror,
    store: StateStore,
    state: RwLock<EngineState>,
    stats: RwLock<EngineStats>,
    run_guard: Mutex<()>,
}

impl<R: RemoteService> SyncEngine<R> {
    /// Opens the engine: validates the configuration, creates the local
    /// directories and takes the cache directory lock.
    pub fn open(config: SyncConfig, remote: R) -> SyncResult<Self> {
        config.validate()?;
        let mirror = LocalMirror::open(&config.content_dir, &config.attachments_dir)?;
        let store = StateStore::open(&config.cache_dir)?;
        Ok(Self {
            config,
            remote,
            mirror,
            store,
            state: RwLock::new(EngineState::Idle),
            stats: RwLock::new(EngineStats::default()),
            run_guard: Mutex::new(()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote service.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Returns the local mirror.
    pub fn mirror(&self) -> &LocalMirror {
        &self.mirror
    }

    /// Gets the current state.
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
    }

    /// Mirrors the remote container into the local trees.
    pub fn pull(&self) -> SyncResult<PullReport> {
        self.pull_at(Utc::now())
    }

    /// Like [`pull`](Self::pull), with an explicit clock for the attachment
    /// failure window.
    pub fn pull_at(&self, now: DateTime<Utc>) -> SyncResult<PullReport> {
        let _run = self.run_guard.lock();
        self.set_state(EngineState::Pulling);

        let result = PullReconciler::new(&self.remote, &self.mirror, &self.store, &self.config).run(now);
        match &result {
            Ok(report) => {
                let mut stats = self.stats.write();
                stats.pulls_completed += 1;
                stats.documents_pulled += report.pulled as u64;
                stats.item_failures += report.failures.len() as u64;
                stats.last_sync_time = Some(Instant::now());
                self.set_state(EngineState::Synced);
            }
            Err(e) => self.record_error(e),
        }
        result
    }

    /// Applies local changes to the remote container.
    pub fn push(&self) -> SyncResult<PushReport> {
        let _run = self.run_guard.lock();
        self.set_state(EngineState::Pushing);

        let result = PushReconciler::new(&self.remote, &self.mirror, &self.store, &self.config).run();
        match &result {
            Ok(report) => {
                let mut stats = self.stats.write();
                stats.pushes_completed += 1;
                stats.mutations_pushed += report.mutations() as u64;
                stats.item_failures += report.failures.len() as u64;
                stats.last_sync_time = Some(Instant::now());
                self.set_state(EngineState::Synced);
            }
            Err(e) => self.record_error(e),
        }
        result
    }

    fn record_error(&self, e: &SyncError) {
        error!(error = %e, "sync run failed");
        self.stats.write().last_error = Some(e.to_string());
        self.set_state(EngineState::Error);
    }

    /// Compares the persisted state with the local tree. Makes no remote calls.
    pub fn status(&self) -> SyncResult<StatusReport> {
        self.status_at(Utc::now())
    }

    /// Like [`status`](Self::status), with an explicit clock.
    pub fn status_at(&self, now: DateTime<Utc>) -> SyncResult<StatusReport> {
        let _run = self.run_guard.lock();
        let cache = self.store.load_cache();
        let ids = self.store.load_ids();
        let tombstones = self.store.load_tombstones();
        let failures = self.store.load_failures();
        let records = self.mirror.list()?;

        let present: HashSet<&str> = records.iter().map(|r| r.filename.as_str()).collect();
        let pending_changes = records
            .iter()
            .filter(|r| !cache.is_unchanged(&r.filename, &r.fingerprint))
            .map(|r| r.filename.clone())
            .collect();
        let pending_deletions = cache
            .filenames()
            .into_iter()
            .filter(|f| !present.contains(f.as_str()))
            .collect();

        Ok(StatusReport {
            tracked_files: cache.len(),
            mapped_ids: ids.len(),
            tombstones: tombstones.len(),
            suppressed_attachments: failures.suppressed(now, &self.config.failure_policy),
            pending_changes,
            pending_deletions,
        })
    }
}
