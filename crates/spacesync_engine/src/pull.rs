//! Mirrors remote state into the local trees.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::mirror::LocalMirror;
use crate::report::{ItemFailure, PullReport};
use crate::store::{FailureMemory, StateStore};
use crate::transfer::AttachmentTransfer;
use chrono::{DateTime, Utc};
use spacesync_remote::{AttachmentFilter, AttachmentMeta, RemoteService};
use tracing::{debug, info, warn};

/// One pull run.
pub struct PullReconciler<'a, R: RemoteService + ?Sized> {
    remote: &'a R,
    mirror: &'a LocalMirror,
    store: &'a StateStore,
    config: &'a SyncConfig,
}

impl<'a, R: RemoteService + ?Sized> PullReconciler<'a, R> {
    /// Creates a reconciler.
    pub fn new(
        remote: &'a R,
        mirror: &'a LocalMirror,
        store: &'a StateStore,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            remote,
            mirror,
            store,
            config,
        }
    }

    /// Pulls every current document of the configured container, in remote
    /// order, with its attachments. `now` anchors the failure window.
    ///
    /// Only a failure to enumerate the container fails the run; anything
    /// per document or per attachment is reported and skipped.
    pub fn run(&self, now: DateTime<Utc>) -> SyncResult<PullReport> {
        let mut cache = self.store.load_cache();
        let mut ids = self.store.load_ids();
        let tombstones = self.store.load_tombstones();
        let mut failures = self.store.load_failures();
        let mut report = PullReport::default();

        let summaries = self.remote.list_documents(&self.config.space_key)?;
        info!(space = %self.config.space_key, documents = summaries.len(), "pulling");

        for summary in summaries {
            let id = summary.id.as_str();
            if tombstones.is_tombstoned(id) {
                debug!(id, title = %summary.title, "skipping deleted document");
                report.skipped_tombstoned += 1;
                continue;
            }

            let document = match self.remote.get_document(id) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(id, error = %e, "failed to fetch document");
                    report.failures.push(ItemFailure::new(id, &e));
                    continue;
                }
            };

            let previous = ids.filename(id).map(str::to_string);
            let record = match self.mirror.save(id, &document, &mut ids) {
                Ok(record) => record,
                Err(e) => {
                    warn!(id, error = %e, "failed to write document");
                    report.failures.push(ItemFailure::new(id, &e));
                    continue;
                }
            };
            if let Some(previous) = previous.filter(|p| *p != record.filename) {
                cache.remove(&previous);
            }
            cache.record_synced(&record.filename, &record.fingerprint);
            report.pulled += 1;
            debug!(id, filename = %record.filename, "pulled document");

            self.pull_attachments(id, &mut failures, now, &mut report);
        }

        self.store.save_cache(&cache)?;
        self.store.save_ids(&ids)?;

        info!(
            pulled = report.pulled,
            skipped = report.skipped_tombstoned,
            attachments = report.attachments_downloaded,
            failures = report.failures.len(),
            "pull complete"
        );
        Ok(report)
    }

    fn pull_attachments(
        &self,
        owner_id: &str,
        failures: &mut FailureMemory,
        now: DateTime<Utc>,
        report: &mut PullReport,
    ) {
        let filter = AttachmentFilter::with_limit(self.config.attachment_page_limit);
        let attachments = match self.remote.list_attachments(owner_id, &filter) {
            Ok(list) => list,
            Err(e) => {
                warn!(id = owner_id, error = %e, "failed to list attachments");
                report.failures.push(ItemFailure::new(owner_id, &e));
                return;
            }
        };

        let transfer = AttachmentTransfer::new(self.remote, &self.config.attachment_retry);
        for attachment in &attachments {
            let policy = &self.config.failure_policy;
            if failures.should_skip(&attachment.title, now, policy) {
                info!(
                    id = owner_id,
                    attachment = %attachment.title,
                    "skipping attachment after repeated failures"
                );
                report.attachments_skipped += 1;
                continue;
            }

            match transfer.download(owner_id, attachment) {
                Ok(bytes) => {
                    if failures.failure_count(&attachment.title) > 0 {
                        failures.clear_failure(&attachment.title);
                        self.persist_failures(failures);
                    }
                    self.store_attachment(owner_id, attachment, &bytes, report);
                }
                Err(e) => {
                    warn!(id = owner_id, attachment = %attachment.title, error = %e, "attachment transfer failed");
                    failures.record_failure(&attachment.title, now, policy);
                    self.persist_failures(failures);
                    report
                        .failures
                        .push(ItemFailure::new(attachment.title.clone(), &e));
                }
            }
        }
    }

    fn store_attachment(
        &self,
        owner_id: &str,
        attachment: &AttachmentMeta,
        bytes: &[u8],
        report: &mut PullReport,
    ) {
        if let Err(e) = self.mirror.save_attachment(owner_id, &attachment.title, bytes) {
            warn!(id = owner_id, attachment = %attachment.title, error = %e, "failed to write attachment");
            report
                .failures
                .push(ItemFailure::new(attachment.title.clone(), &e));
            return;
        }
        report.attachments_downloaded += 1;

        let metadata = match self.remote.get_attachment_metadata(&attachment.id) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(attachment = %attachment.title, error = %e, "attachment metadata unavailable");
                return;
            }
        };
        if let Err(e) = self
            .mirror
            .save_attachment_metadata(owner_id, &attachment.title, &metadata)
        {
            warn!(attachment = %attachment.title, error = %e, "failed to write attachment metadata");
        }
    }

    fn persist_failures(&self, failures: &FailureMemory) {
        if let Err(e) = self.store.save_failures(failures) {
            warn!(error = %e, "failed to persist attachment failures");
        }
    }
}
