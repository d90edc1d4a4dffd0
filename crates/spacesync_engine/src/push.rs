//! Applies local changes to the remote service.
//!
//! A push diffs the local tree against the sync cache and issues the minimal
//! set of mutations:
//!
//! 1. Cached filenames with no local file are deleted remotely and tombstoned.
//! 2. Local files whose fingerprint differs from the cache are created or
//!    updated.
//! 3. The cache, tombstones and ID mapping are persisted once, at the end.
//!
//! An interrupted push leaves stale cache entries behind, so re-running it
//! retries exactly what did not complete.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::mirror::{LocalMirror, LocalRecord};
use crate::report::{ItemFailure, PushReport};
use crate::store::{IdMapping, StateStore, SyncCache, Tombstones};
use spacesync_remote::{Document, DocumentStatus, RemoteError, RemoteService};
use std::collections::HashSet;
use std::thread;
use tracing::{debug, info, warn};

enum Applied {
    Created,
    Updated,
}

/// One push run.
pub struct PushReconciler<'a, R: RemoteService + ?Sized> {
    remote: &'a R,
    mirror: &'a LocalMirror,
    store: &'a StateStore,
    config: &'a SyncConfig,
    target: Option<String>,
}

impl<'a, R: RemoteService + ?Sized> PushReconciler<'a, R> {
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
            target: None,
        }
    }

    /// Pushes local changes. Per-record failures are reported, not returned.
    pub fn run(mut self) -> SyncResult<PushReport> {
        let mut cache = self.store.load_cache();
        let mut tombstones = self.store.load_tombstones();
        let mut ids = self.store.load_ids();
        let mut report = PushReport::default();

        let records = self.mirror.list()?;
        let present: HashSet<&str> = records.iter().map(|r| r.filename.as_str()).collect();

        for filename in cache.filenames() {
            if present.contains(filename.as_str()) {
                continue;
            }
            self.push_deletion(&filename, &mut cache, &mut tombstones, &mut ids, &mut report);
        }

        for record in &records {
            if cache.is_unchanged(&record.filename, &record.fingerprint) {
                report.unchanged += 1;
                continue;
            }
            match self.push_record(record, &mut cache, &mut tombstones, &mut ids) {
                Ok(Applied::Created) => report.created += 1,
                Ok(Applied::Updated) => report.updated += 1,
                Err(e) => {
                    warn!(filename = %record.filename, error = %e, "failed to push document");
                    report
                        .failures
                        .push(ItemFailure::new(record.filename.clone(), &e));
                }
            }
        }

        self.store.save_cache(&cache)?;
        self.store.save_tombstones(&tombstones)?;
        self.store.save_ids(&ids)?;

        info!(
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            unchanged = report.unchanged,
            failures = report.failures.len(),
            "push complete"
        );
        Ok(report)
    }

    fn push_deletion(
        &self,
        filename: &str,
        cache: &mut SyncCache,
        tombstones: &mut Tombstones,
        ids: &mut IdMapping,
        report: &mut PushReport,
    ) {
        let Some(id) = ids.lookup_id(filename).map(str::to_string) else {
            debug!(filename, "forgetting deleted file that was never mapped");
            cache.remove(filename);
            return;
        };

        match self.remote.delete_document(&id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(id = %id, "already deleted remotely"),
            Err(e) => {
                warn!(id = %id, filename, error = %e, "failed to delete document");
                report.failures.push(ItemFailure::new(filename, &e));
                return;
            }
        }

        tombstones.mark_deleted(&id);
        if let Err(e) = self.mirror.delete(filename, ids) {
            warn!(filename, error = %e, "failed to remove companion file");
            ids.unmap_id(&id);
        }
        cache.remove(filename);
        report.deleted += 1;
        info!(id = %id, filename, "deleted document");
    }

    fn push_record(
        &mut self,
        record: &LocalRecord,
        cache: &mut SyncCache,
        tombstones: &mut Tombstones,
        ids: &mut IdMapping,
    ) -> SyncResult<Applied> {
        let id = record
            .document
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| ids.lookup_id(&record.filename).map(str::to_string));

        let Some(id) = id else {
            self.create(record, cache, ids)?;
            return Ok(Applied::Created);
        };

        if tombstones.is_tombstoned(&id) {
            debug!(id = %id, filename = %record.filename, "recreating deleted document");
            self.create(record, cache, ids)?;
            tombstones.clear_tombstone(&id);
            return Ok(Applied::Created);
        }

        match self.update(&id, &record.document) {
            Ok(_) => {
                ids.map_id(&id, &record.filename);
                cache.record_synced(&record.filename, &record.fingerprint);
                info!(id = %id, filename = %record.filename, "updated document");
                Ok(Applied::Updated)
            }
            Err(e) if e.is_not_found() => {
                info!(id = %id, filename = %record.filename, "document vanished remotely, recreating");
                self.create(record, cache, ids)?;
                tombstones.clear_tombstone(&id);
                Ok(Applied::Created)
            }
            Err(e) => Err(e),
        }
    }

    fn target_container(&mut self) -> SyncResult<String> {
        if let Some(target) = &self.target {
            return Ok(target.clone());
        }
        let resolved = self.remote.resolve_container(&self.config.space_key)?;
        self.target = Some(resolved.clone());
        Ok(resolved)
    }

    /// Creates the record remotely, then embeds the new ID in the local file
    /// at its existing filename.
    fn create(
        &mut self,
        record: &LocalRecord,
        cache: &mut SyncCache,
        ids: &mut IdMapping,
    ) -> SyncResult<()> {
        let container = self.target_container()?;
        let payload = Document {
            id: None,
            version: None,
            status: DocumentStatus::Current,
            container_id: Some(container),
            ..record.document.clone()
        };

        let created = self.remote.create_document(&payload)?;
        let new_id = created
            .id
            .clone()
            .ok_or(RemoteError::MissingField("id"))?;
        ids.map_id(&new_id, &record.filename);
        info!(id = %new_id, filename = %record.filename, "created document");

        let local = Document {
            id: Some(new_id),
            version: created.version,
            container_id: created.container_id,
            ..record.document.clone()
        };
        let rewritten = self.mirror.write_record(&record.filename, &local)?;
        cache.record_synced(&record.filename, &rewritten.fingerprint);
        Ok(())
    }

    /// Updates `id` with the title and body of `local`.
    ///
    /// The version is always taken from a fresh read. When the document lives
    /// in another container it is converted to draft first and moved by the
    /// final update.
    fn update(&mut self, id: &str, local: &Document) -> SyncResult<Document> {
        let mut current = self.remote.get_document(id)?;
        let target = self.target_container()?;
        let moving = current.container_id.as_deref() != Some(target.as_str());

        if moving {
            info!(id, from = ?current.container_id, to = %target, "moving document between spaces");
            if current.status != DocumentStatus::Draft {
                current = self.convert_to_draft(id, local, &current)?;
            }
        }

        let payload = Document {
            id: Some(id.to_string()),
            status: DocumentStatus::Current,
            version: Some(current.version.unwrap_or(1) + 1),
            container_id: moving.then_some(target),
            ..local.clone()
        };
        Ok(self.remote.update_document(id, &payload)?)
    }

    fn convert_to_draft(
        &self,
        id: &str,
        local: &Document,
        current: &Document,
    ) -> SyncResult<Document> {
        let draft = Document {
            id: Some(id.to_string()),
            status: DocumentStatus::Draft,
            version: Some(current.version.unwrap_or(1) + 1),
            container_id: None,
            ..local.clone()
        };
        self.remote.update_document(id, &draft)?;

        let poll = &self.config.draft_poll;
        for check in 1..=poll.max_checks {
            if !poll.interval.is_zero() {
                thread::sleep(poll.interval);
            }
            let observed = self.remote.get_document(id)?;
            if observed.status == DocumentStatus::Draft {
                debug!(id, check, "draft conversion observed");
                return Ok(observed);
            }
            debug!(id, check, status = observed.status.as_str(), "waiting for draft status");
        }

        Err(SyncError::DraftTimeout {
            id: id.to_string(),
            attempts: poll.max_checks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacesync_remote::{MemoryRemote, RemoteCall};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        config: SyncConfig,
        mirror: LocalMirror,
        store: StateStore,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let config = SyncConfig::new(dir.path(), "DOCS").without_delays();
        let mirror = LocalMirror::open(&config.content_dir, &config.attachments_dir).unwrap();
        let store = StateStore::open(&config.cache_dir).unwrap();
        Fixture {
            _dir: dir,
            config,
            mirror,
            store,
        }
    }

    impl Fixture {
        fn push(&self, remote: &MemoryRemote) -> PushReport {
            PushReconciler::new(remote, &self.mirror, &self.store, &self.config)
                .run()
                .unwrap()
        }
    }

    #[test]
    fn new_file_is_created_and_rewritten_with_id() {
        let f = fixture();
        let remote = MemoryRemote::new("DOCS", "98");
        f.mirror
            .write_record("fresh", &Document::new("Fresh", "<p>new</p>"))
            .unwrap();

        let report = f.push(&remote);

        assert_eq!(report.created, 1);
        assert_eq!(remote.mutations(), vec![RemoteCall::CreateDocument("Fresh".into())]);
        let record = f.mirror.read("fresh").unwrap().unwrap();
        let id = record.document.id.clone().unwrap();
        assert_eq!(f.store.load_ids().filename(&id), Some("fresh"));
        assert!(f.store.load_cache().is_unchanged("fresh", &record.fingerprint));
    }

    #[test]
    fn update_submits_next_version() {
        let f = fixture();
        let remote = MemoryRemote::new("DOCS", "98");
        let id = remote.insert(Document::new("Doc", "v1").with_version(7));
        f.mirror
            .write_record("doc", &Document::new("Doc", "v2").with_id(id.clone()).with_version(2))
            .unwrap();

        let report = f.push(&remote);

        assert_eq!(report.updated, 1);
        assert_eq!(
            remote.mutations(),
            vec![RemoteCall::UpdateDocument {
                id: id.clone(),
                status: DocumentStatus::Current,
                version: Some(8),
                container_id: None,
            }]
        );
        assert_eq!(remote.document(&id).unwrap().body.value, "v2");
    }

    #[test]
    fn draft_never_observed_times_out() {
        let f = fixture();
        let remote = MemoryRemote::new("DOCS", "98");
        remote.add_container("OLD", "50");
        let id = remote.insert(Document::new("Doc", "v1").with_container("50"));
        remote.lag_draft_status(&id, 10);
        f.mirror
            .write_record("doc", &Document::new("Doc", "v2").with_id(id.clone()))
            .unwrap();

        let report = f.push(&remote);

        assert_eq!(report.updated, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].reason.contains("draft"));
        assert!(f.store.load_cache().get("doc").is_none());
    }

    #[test]
    fn document_without_container_is_moved_into_target() {
        let f = fixture();
        let remote = MemoryRemote::new("DOCS", "98");
        let id = remote.insert(Document::new("Doc", "v1"));
        remote.detach_container(&id);
        f.mirror
            .write_record("doc", &Document::new("Doc", "v2").with_id(id.clone()))
            .unwrap();

        let report = f.push(&remote);

        assert_eq!(report.updated, 1);
        let mutations = remote.mutations();
        assert_eq!(mutations.len(), 2);
        assert!(matches!(
            &mutations[0],
            RemoteCall::UpdateDocument { status: DocumentStatus::Draft, .. }
        ));
        assert_eq!(
            mutations[1],
            RemoteCall::UpdateDocument {
                id: id.clone(),
                status: DocumentStatus::Current,
                version: Some(3),
                container_id: Some("98".into()),
            }
        );
        assert_eq!(remote.document(&id).unwrap().container_id.as_deref(), Some("98"));
    }

    #[test]
    fn unmapped_deletion_only_forgets_cache_entry() {
        let f = fixture();
        let remote = MemoryRemote::new("DOCS", "98");
        let mut cache = SyncCache::default();
        cache.record_synced("orphan", "abc");
        f.store.save_cache(&cache).unwrap();

        let report = f.push(&remote);

        assert_eq!(report.deleted, 0);
        assert!(remote.calls().is_empty());
        assert!(f.store.load_cache().is_empty());
    }
}
