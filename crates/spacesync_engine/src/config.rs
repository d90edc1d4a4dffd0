//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for pull and push runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding one JSON file per document.
    pub content_dir: PathBuf,
    /// Directory holding one subdirectory of attachments per document ID.
    pub attachments_dir: PathBuf,
    /// Directory holding the persisted sync state.
    pub cache_dir: PathBuf,
    /// Key of the remote container (space) being mirrored.
    pub space_key: String,
    /// Retry behavior for attachment downloads.
    pub attachment_retry: TransferRetry,
    /// Polling behavior while waiting for a draft conversion.
    pub draft_poll: DraftPoll,
    /// Suppression of attachments that keep failing.
    pub failure_policy: FailurePolicy,
    /// Maximum attachments listed per document.
    pub attachment_page_limit: usize,
}

impl SyncConfig {
    /// Creates a configuration rooted at `root`, using `content/`,
    /// `attachments/` and `cache/` beneath it.
    pub fn new(root: &Path, space_key: impl Into<String>) -> Self {
        Self {
            content_dir: root.join("content"),
            attachments_dir: root.join("attachments"),
            cache_dir: root.join("cache"),
            space_key: space_key.into(),
            attachment_retry: TransferRetry::default(),
            draft_poll: DraftPoll::default(),
            failure_policy: FailurePolicy::default(),
            attachment_page_limit: 50,
        }
    }

    /// Sets the content directory.
    pub fn with_content_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.content_dir = dir.into();
        self
    }

    /// Sets the attachments directory.
    pub fn with_attachments_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.attachments_dir = dir.into();
        self
    }

    /// Sets the cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Sets the attachment retry behavior.
    pub fn with_attachment_retry(mut self, retry: TransferRetry) -> Self {
        self.attachment_retry = retry;
        self
    }

    /// Sets the draft polling behavior.
    pub fn with_draft_poll(mut self, poll: DraftPoll) -> Self {
        self.draft_poll = poll;
        self
    }

    /// Sets the failure suppression policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets the per-document attachment listing limit.
    pub fn with_attachment_page_limit(mut self, limit: usize) -> Self {
        self.attachment_page_limit = limit;
        self
    }

    /// Disables every delay. Intended for tests.
    pub fn without_delays(mut self) -> Self {
        self.attachment_retry.base_delay = Duration::ZERO;
        self.draft_poll.interval = Duration::ZERO;
        self
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.space_key.trim().is_empty() {
            return Err(SyncError::InvalidConfig("space key is empty".into()));
        }
        if self.attachment_retry.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "attachment retry needs at least one attempt".into(),
            ));
        }
        if self.draft_poll.max_checks == 0 {
            return Err(SyncError::InvalidConfig(
                "draft polling needs at least one check".into(),
            ));
        }
        if self.failure_policy.max_failures == 0 {
            return Err(SyncError::InvalidConfig(
                "failure threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Linear retry for attachment downloads: the wait after attempt `n` is
/// `n × base_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRetry {
    /// Attempts per candidate URL.
    pub max_attempts: u32,
    /// Unit of the linear backoff.
    pub base_delay: Duration,
}

impl TransferRetry {
    /// Returns the wait after a failed attempt (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for TransferRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Bounded polling while a document converts to draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftPoll {
    /// Number of status checks.
    pub max_checks: u32,
    /// Fixed wait before each check.
    pub interval: Duration,
}

impl Default for DraftPoll {
    fn default() -> Self {
        Self {
            max_checks: 3,
            interval: Duration::from_secs(1),
        }
    }
}

/// Skip an attachment after `max_failures` failures within `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Failures tolerated before skipping.
    pub max_failures: usize,
    /// Trailing window in which failures count.
    pub window: chrono::Duration,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            max_failures: 3,
            window: chrono::Duration::hours(24),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_layout() {
        let config = SyncConfig::new(Path::new("/srv/mirror"), "DOCS")
            .with_cache_dir("/var/cache/spacesync")
            .with_attachment_page_limit(10);

        assert_eq!(config.content_dir, PathBuf::from("/srv/mirror/content"));
        assert_eq!(config.attachments_dir, PathBuf::from("/srv/mirror/attachments"));
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/spacesync"));
        assert_eq!(config.attachment_page_limit, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn attachment_retry_is_linear() {
        let retry = TransferRetry {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        };
        assert_eq!(retry.delay_after(1), Duration::from_millis(250));
        assert_eq!(retry.delay_after(2), Duration::from_millis(500));
        assert_eq!(retry.delay_after(3), Duration::from_millis(750));
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let root = Path::new("/tmp/x");
        assert!(SyncConfig::new(root, " ").validate().is_err());

        let mut config = SyncConfig::new(root, "DOCS");
        config.attachment_retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn without_delays_zeroes_waits() {
        let config = SyncConfig::new(Path::new("/tmp/x"), "DOCS").without_delays();
        assert_eq!(config.attachment_retry.delay_after(2), Duration::ZERO);
        assert_eq!(config.draft_poll.interval, Duration::ZERO);
    }
}
