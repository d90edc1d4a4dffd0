//! Run reports.

use serde::Serialize;

/// An object that could not be synced, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Document ID, filename or attachment name.
    pub object: String,
    /// Error message.
    pub reason: String,
}

impl ItemFailure {
    pub(crate) fn new(object: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            object: object.into(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    /// Documents written locally.
    pub pulled: usize,
    /// Documents skipped because this client deleted them.
    pub skipped_tombstoned: usize,
    /// Attachments written locally.
    pub attachments_downloaded: usize,
    /// Attachments suppressed by recent failures.
    pub attachments_skipped: usize,
    /// Per-item failures; the run continued past each.
    pub failures: Vec<ItemFailure>,
}

/// Outcome of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    /// Documents created remotely.
    pub created: usize,
    /// Documents updated remotely.
    pub updated: usize,
    /// Documents deleted remotely.
    pub deleted: usize,
    /// Local files skipped because their fingerprint matched the cache.
    pub unchanged: usize,
    /// Per-item failures; the run continued past each.
    pub failures: Vec<ItemFailure>,
}

impl PushReport {
    /// Number of remote mutations made.
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Snapshot of the persisted sync state against the local tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Files in the sync cache.
    pub tracked_files: usize,
    /// Remote IDs mapped to local files.
    pub mapped_ids: usize,
    /// Remote IDs deleted by this client.
    pub tombstones: usize,
    /// Attachments currently skipped after repeated failures.
    pub suppressed_attachments: Vec<String>,
    /// Local files that a push would create or update.
    pub pending_changes: Vec<String>,
    /// Cached files that a push would delete remotely.
    pub pending_deletions: Vec<String>,
}
