//! Error types for the sync engine.

use spacesync_remote::RemoteError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote service rejected or failed a call.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A local document could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every candidate URL and retry for an attachment failed.
    #[error("attachment {attachment} unreachable after trying {candidates} URL(s)")]
    TransferExhausted {
        /// Attachment file name.
        attachment: String,
        /// Number of candidate URLs tried.
        candidates: usize,
        /// Last error observed.
        #[source]
        last: Option<RemoteError>,
    },

    /// An attachment carried no download reference.
    #[error("attachment {attachment} has no download link")]
    MissingDownloadLink {
        /// Attachment file name.
        attachment: String,
    },

    /// A draft conversion was not observed within the polling budget.
    #[error("document {id} did not reach draft status after {attempts} checks")]
    DraftTimeout {
        /// Document ID.
        id: String,
        /// Number of status checks made.
        attempts: u32,
    },

    /// Another process holds the cache directory lock.
    #[error("sync state at {} is locked by another process", path.display())]
    StateLocked {
        /// Cache directory.
        path: PathBuf,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Returns true if the remote reported the object missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_not_found())
    }

    /// Returns true if the remote rejected a stale version.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_conflict())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_remote_errors() {
        let missing = SyncError::from(RemoteError::not_found("page 1"));
        assert!(missing.is_not_found());
        assert!(!missing.is_conflict());

        let conflict = SyncError::from(RemoteError::VersionConflict {
            id: "1".into(),
            message: "stale".into(),
        });
        assert!(conflict.is_conflict());

        let io = SyncError::from(std::io::Error::other("disk full"));
        assert!(!io.is_not_found());
    }

    #[test]
    fn error_display() {
        let err = SyncError::DraftTimeout {
            id: "12".into(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "document 12 did not reach draft status after 3 checks"
        );

        let err = SyncError::StateLocked {
            path: PathBuf::from("/tmp/cache"),
        };
        assert!(err.to_string().contains("/tmp/cache"));
    }
}
