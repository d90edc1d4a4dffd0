//! # spacesync engine
//!
//! Bidirectional sync between a local document tree and a remote
//! document space.
//!
//! This crate provides:
//! - [`StateStore`]: the persisted sync cache, ID mapping, tombstones and
//!   attachment failure memory, behind a cache directory lock
//! - [`LocalMirror`]: the local document and attachment trees
//! - [`AttachmentTransfer`]: multi-URL attachment download with bounded retries
//! - [`PullReconciler`] and [`PushReconciler`]: the two sync directions
//! - [`SyncEngine`]: the facade that serializes runs
//! - [`PushWorker`]: a channel-fed worker for watch mode
//!
//! ## Safety of re-runs
//!
//! State is persisted only after a run has processed every item, and an
//! item that failed keeps its stale cache entry. Re-running an interrupted
//! or partially failed run retries exactly the unfinished work.
//!
//! ## Example
//!
//! ```no_run
//! use spacesync_engine::{SyncConfig, SyncEngine};
//! use spacesync_remote::MemoryRemote;
//! use std::path::Path;
//!
//! let config = SyncConfig::new(Path::new("./mirror"), "DOCS");
//! let engine = SyncEngine::open(config, MemoryRemote::new("DOCS", "1")).unwrap();
//! let pulled = engine.pull().unwrap();
//! println!("pulled {} documents", pulled.pulled);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod mirror;
mod pull;
mod push;
mod report;
mod store;
mod transfer;
mod worker;

pub use config::{DraftPoll, FailurePolicy, SyncConfig, TransferRetry};
pub use engine::{EngineState, EngineStats, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use mirror::{derive_filename, fingerprint, LocalMirror, LocalRecord};
pub use pull::PullReconciler;
pub use push::PushReconciler;
pub use report::{ItemFailure, PullReport, PushReport, StatusReport};
pub use store::{FailureMemory, IdMapping, StateStore, SyncCache, Tombstones};
pub use transfer::{candidate_urls, AttachmentTransfer};
pub use worker::{ChangeEvent, PushWorker};
