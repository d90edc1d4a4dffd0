//! Persisted sync state.
//!
//! ```text
//! <cache_dir>/
//! ├─ LOCK                 # Advisory lock, one sync process at a time
//! ├─ id_mapping.json      # remote ID -> local filename
//! ├─ sync_cache.json      # local filename -> fingerprint at last sync
//! ├─ deleted_pages.json   # remote IDs deleted by a push
//! └─ .failed_attachments  # attachment name -> recent failure times
//! ```
//!
//! Every file is replaced atomically. A missing or unreadable file loads as
//! empty state so a corrupted cache degrades to a full re-sync instead of
//! blocking the run.

use crate::config::FailurePolicy;
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOCK_FILE: &str = "LOCK";
const ID_MAPPING_FILE: &str = "id_mapping.json";
const SYNC_CACHE_FILE: &str = "sync_cache.json";
const TOMBSTONES_FILE: &str = "deleted_pages.json";
const FAILURES_FILE: &str = ".failed_attachments";

/// Fingerprint of each local file as of its last successful sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCache(BTreeMap<String, String>);

impl SyncCache {
    /// Records `fingerprint` as the synced state of `filename`.
    pub fn record_synced(&mut self, filename: &str, fingerprint: &str) {
        self.0.insert(filename.to_string(), fingerprint.to_string());
    }

    /// Returns true if `filename` was last synced with `fingerprint`.
    pub fn is_unchanged(&self, filename: &str, fingerprint: &str) -> bool {
        self.0.get(filename).is_some_and(|fp| fp == fingerprint)
    }

    /// Returns the recorded fingerprint.
    pub fn get(&self, filename: &str) -> Option<&str> {
        self.0.get(filename).map(String::as_str)
    }

    /// Forgets `filename`.
    pub fn remove(&mut self, filename: &str) -> Option<String> {
        self.0.remove(filename)
    }

    /// Returns every cached filename.
    pub fn filenames(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Remote ID to local filename mapping.
///
/// The mapping is kept one-to-one: mapping an ID to a filename drops any
/// other ID previously mapped to that filename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMapping(BTreeMap<String, String>);

impl IdMapping {
    /// Maps `id` to `filename`, returning the filename it was mapped to before.
    pub fn map_id(&mut self, id: &str, filename: &str) -> Option<String> {
        self.0.retain(|other, f| other == id || f != filename);
        self.0.insert(id.to_string(), filename.to_string())
    }

    /// Removes the mapping for `id`.
    pub fn unmap_id(&mut self, id: &str) -> Option<String> {
        self.0.remove(id)
    }

    /// Returns the filename mapped to `id`.
    pub fn filename(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    /// Returns the ID mapped to `filename`.
    pub fn lookup_id(&self, filename: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, f)| f.as_str() == filename)
            .map(|(id, _)| id.as_str())
    }

    /// Number of mapped IDs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Remote IDs this client deleted, so pulls do not resurrect them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tombstones(BTreeSet<String>);

impl Tombstones {
    /// Marks `id` as deleted.
    pub fn mark_deleted(&mut self, id: &str) {
        self.0.insert(id.to_string());
    }

    /// Returns true if `id` was deleted by this client.
    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Clears the tombstone for `id`.
    pub fn clear_tombstone(&mut self, id: &str) -> bool {
        self.0.remove(id)
    }

    /// Number of tombstones.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no tombstones.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Recent download failures per attachment name.
///
/// Timestamps are written as RFC 3339. Reading also accepts ISO timestamps
/// without an offset, taken as UTC. Unreadable entries are dropped one by
/// one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FailureMemory(BTreeMap<String, Vec<DateTime<Utc>>>);

impl<'de> Deserialize<'de> for FailureMemory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Vec<serde_json::Value>>::deserialize(deserializer)?;
        let mut entries = BTreeMap::new();
        for (name, values) in raw {
            let times: Vec<DateTime<Utc>> = values
                .iter()
                .filter_map(|value| {
                    let parsed = value.as_str().and_then(parse_timestamp);
                    if parsed.is_none() {
                        warn!(attachment = %name, %value, "ignoring unreadable failure timestamp");
                    }
                    parsed
                })
                .collect();
            if !times.is_empty() {
                entries.insert(name, times);
            }
        }
        Ok(Self(entries))
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| s.parse::<NaiveDateTime>().ok().map(|t| t.and_utc()))
}

impl FailureMemory {
    /// Records a failure of `name` at `now`, dropping entries outside the window.
    pub fn record_failure(&mut self, name: &str, now: DateTime<Utc>, policy: &FailurePolicy) {
        let times = self.0.entry(name.to_string()).or_default();
        times.retain(|t| now - *t < policy.window);
        times.push(now);
    }

    /// Returns true if `name` failed at least `max_failures` times within
    /// the window ending at `now`.
    pub fn should_skip(&mut self, name: &str, now: DateTime<Utc>, policy: &FailurePolicy) -> bool {
        let Some(times) = self.0.get_mut(name) else {
            return false;
        };
        times.retain(|t| now - *t < policy.window);
        if times.is_empty() {
            self.0.remove(name);
            return false;
        }
        times.len() >= policy.max_failures
    }

    /// Forgets all failures of `name`.
    pub fn clear_failure(&mut self, name: &str) {
        self.0.remove(name);
    }

    /// Returns the attachments that would be skipped at `now`, without pruning.
    pub fn suppressed(&self, now: DateTime<Utc>, policy: &FailurePolicy) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, times)| {
                times.iter().filter(|t| now - **t < policy.window).count() >= policy.max_failures
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of failures currently remembered for `name`.
    pub fn failure_count(&self, name: &str) -> usize {
        self.0.get(name).map_or(0, Vec::len)
    }

    /// Number of attachments with remembered failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no failures are remembered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Owns the cache directory and its lock.
///
/// Only one `StateStore` can be open on a directory at a time, across
/// processes. The lock is released when the store is dropped.
#[derive(Debug)]
pub struct StateStore {
    dir: PathBuf,
    _lock_file: File,
}

impl StateStore {
    /// Opens the cache directory, creating it if needed, and takes the lock.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StateLocked`] if another store holds the lock.
    pub fn open(dir: &Path) -> SyncResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(SyncError::StateLocked {
                path: dir.to_path_buf(),
            });
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the fingerprint cache.
    pub fn load_cache(&self) -> SyncCache {
        self.load(SYNC_CACHE_FILE)
    }

    /// Persists the fingerprint cache.
    pub fn save_cache(&self, cache: &SyncCache) -> SyncResult<()> {
        self.save(SYNC_CACHE_FILE, cache)
    }

    /// Loads the ID mapping.
    pub fn load_ids(&self) -> IdMapping {
        self.load(ID_MAPPING_FILE)
    }

    /// Persists the ID mapping.
    pub fn save_ids(&self, ids: &IdMapping) -> SyncResult<()> {
        self.save(ID_MAPPING_FILE, ids)
    }

    /// Loads the tombstones.
    pub fn load_tombstones(&self) -> Tombstones {
        self.load(TOMBSTONES_FILE)
    }

    /// Persists the tombstones.
    pub fn save_tombstones(&self, tombstones: &Tombstones) -> SyncResult<()> {
        self.save(TOMBSTONES_FILE, tombstones)
    }

    /// Loads the attachment failure memory.
    pub fn load_failures(&self) -> FailureMemory {
        self.load(FAILURES_FILE)
    }

    /// Persists the attachment failure memory.
    pub fn save_failures(&self, failures: &FailureMemory) -> SyncResult<()> {
        self.save(FAILURES_FILE, failures)
    }

    fn load<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.dir.join(name);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable state file, starting empty");
                return T::default();
            }
        };
        match serde_json::from_slice(&data) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt state file, starting empty");
                T::default()
            }
        }
    }

    fn save<T: Serialize>(&self, name: &str, value: &T) -> SyncResult<()> {
        let data = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.dir.join(name), &data)?;
        debug!(file = name, bytes = data.len(), "saved sync state");
        Ok(())
    }
}

/// Replaces `path` with `data`: write a sibling temp file, fsync, rename,
/// then fsync the parent directory.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = parent.join(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    sync_directory(parent)
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn at(hours: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::hours(hours)
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _store = StateStore::open(dir.path()).unwrap();

        let result = StateStore::open(dir.path());
        assert!(matches!(result, Err(SyncError::StateLocked { .. })));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(StateStore::open(dir.path()).unwrap());
        assert!(StateStore::open(dir.path()).is_ok());
    }

    #[test]
    fn state_roundtrips_through_disk() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();

        let mut ids = IdMapping::default();
        ids.map_id("101", "intro");
        let mut cache = SyncCache::default();
        cache.record_synced("intro", "abc");
        let mut tombstones = Tombstones::default();
        tombstones.mark_deleted("7");

        store.save_ids(&ids).unwrap();
        store.save_cache(&cache).unwrap();
        store.save_tombstones(&tombstones).unwrap();

        assert_eq!(store.load_ids(), ids);
        assert_eq!(store.load_cache(), cache);
        assert_eq!(store.load_tombstones(), tombstones);

        let raw = fs::read_to_string(dir.path().join(TOMBSTONES_FILE)).unwrap();
        let list: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(list, vec!["7".to_string()]);
    }

    #[test]
    fn corrupt_or_missing_files_load_empty() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        assert!(store.load_cache().is_empty());

        fs::write(dir.path().join(SYNC_CACHE_FILE), b"{not json").unwrap();
        assert!(store.load_cache().is_empty());
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        store.save_cache(&SyncCache::default()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
    }

    #[test]
    fn failures_without_offset_are_read_as_utc() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let raw = r#"{
            "a.png": ["2023-11-14T22:13:20.123456", "2023-11-14T22:30:00", "2023-11-14T22:13:20+00:00"],
            "b.png": ["yesterday", 42, "2023-11-14T23:00:00.5"],
            "c.png": ["not a time"]
        }"#;
        fs::write(dir.path().join(FAILURES_FILE), raw).unwrap();

        let mut failures = store.load_failures();
        assert_eq!(failures.failure_count("a.png"), 3);
        assert_eq!(failures.failure_count("b.png"), 1);
        assert_eq!(failures.failure_count("c.png"), 0);
        assert_eq!(failures.len(), 2);

        let policy = FailurePolicy::default();
        assert!(failures.should_skip("a.png", at(1), &policy));
        assert!(!failures.should_skip("b.png", at(1), &policy));
        assert!(!failures.should_skip("a.png", at(25), &policy));
    }

    #[test]
    fn id_mapping_stays_one_to_one() {
        let mut ids = IdMapping::default();
        ids.map_id("1", "intro");
        ids.map_id("2", "intro");

        assert_eq!(ids.filename("1"), None);
        assert_eq!(ids.lookup_id("intro"), Some("2"));

        assert_eq!(ids.map_id("2", "intro-v2").as_deref(), Some("intro"));
        assert_eq!(ids.lookup_id("intro"), None);
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn failures_skip_at_threshold_within_window() {
        let policy = FailurePolicy::default();
        let mut failures = FailureMemory::default();

        failures.record_failure("a.png", at(0), &policy);
        failures.record_failure("a.png", at(1), &policy);
        assert!(!failures.should_skip("a.png", at(2), &policy));

        failures.record_failure("a.png", at(2), &policy);
        assert!(failures.should_skip("a.png", at(3), &policy));
    }

    #[test]
    fn failures_expire_after_window() {
        let policy = FailurePolicy::default();
        let mut failures = FailureMemory::default();
        for h in 0..3 {
            failures.record_failure("a.png", at(h), &policy);
        }

        assert!(failures.should_skip("a.png", at(23), &policy));
        // The failure at hour 0 is now 24h old.
        assert!(!failures.should_skip("a.png", at(24), &policy));
        assert_eq!(failures.failure_count("a.png"), 2);

        assert!(!failures.should_skip("a.png", at(48), &policy));
        assert!(failures.is_empty());
    }

    #[test]
    fn clear_failure_resets() {
        let policy = FailurePolicy::default();
        let mut failures = FailureMemory::default();
        for h in 0..3 {
            failures.record_failure("a.png", at(h), &policy);
        }
        failures.clear_failure("a.png");
        assert!(!failures.should_skip("a.png", at(3), &policy));
    }
}
