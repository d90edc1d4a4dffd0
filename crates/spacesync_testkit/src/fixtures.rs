//! Test fixtures.
//!
//! Provides temporary sync workspaces and pre-populated remotes.

use spacesync_engine::{SyncConfig, SyncEngine};
use spacesync_remote::{Document, MemoryRemote};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Container key used by fixtures.
pub const SPACE_KEY: &str = "DOCS";

/// Container ID behind [`SPACE_KEY`].
pub const SPACE_ID: &str = "98";

/// A sync root in a temporary directory, removed on drop.
pub struct TestWorkspace {
    /// Configuration pointing at the temporary directories, with all delays zeroed.
    pub config: SyncConfig,
    _temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a workspace syncing [`SPACE_KEY`].
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = SyncConfig::new(temp_dir.path(), SPACE_KEY).without_delays();
        Self {
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Opens an engine over `remote`. Keep a clone of the `Arc` to inspect calls.
    pub fn engine(&self, remote: Arc<MemoryRemote>) -> SyncEngine<Arc<MemoryRemote>> {
        SyncEngine::open(self.config.clone(), remote).expect("Failed to open sync engine")
    }

    /// Path of the document file for a filename stem.
    pub fn document_path(&self, filename: &str) -> PathBuf {
        self.config.content_dir.join(format!("{filename}.json"))
    }

    /// Writes a document file the way a user's editor would.
    pub fn write_document(&self, filename: &str, doc: &Document) -> PathBuf {
        let data = serde_json::to_vec_pretty(doc).expect("Failed to encode document");
        self.write_raw(filename, &data)
    }

    /// Writes raw bytes as a document file.
    pub fn write_raw(&self, filename: &str, data: &[u8]) -> PathBuf {
        fs::create_dir_all(&self.config.content_dir).expect("Failed to create content dir");
        let path = self.document_path(filename);
        fs::write(&path, data).expect("Failed to write document");
        path
    }

    /// Reads a document file, if present.
    pub fn read_document(&self, filename: &str) -> Option<Document> {
        let data = fs::read(self.document_path(filename)).ok()?;
        Some(serde_json::from_slice(&data).expect("Failed to parse document"))
    }

    /// Deletes a document file.
    pub fn remove_document(&self, filename: &str) {
        fs::remove_file(self.document_path(filename)).expect("Failed to remove document");
    }

    /// Returns true if the document file exists.
    pub fn has_document(&self, filename: &str) -> bool {
        self.document_path(filename).exists()
    }

    /// Path of a downloaded attachment.
    pub fn attachment_path(&self, owner_id: &str, name: &str) -> PathBuf {
        self.config.attachments_dir.join(owner_id).join(name)
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a remote holding [`SPACE_KEY`] and one current document per
/// `(title, body)`. Returns the remote and the assigned IDs, in order.
pub fn seeded_remote(documents: &[(&str, &str)]) -> (Arc<MemoryRemote>, Vec<String>) {
    let remote = Arc::new(MemoryRemote::new(SPACE_KEY, SPACE_ID));
    let ids = documents
        .iter()
        .map(|(title, body)| remote.insert(Document::new(*title, *body)))
        .collect();
    (remote, ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacesync_remote::RemoteService;

    #[test]
    fn workspace_roundtrip() {
        let ws = TestWorkspace::new();
        ws.write_document("intro", &Document::new("Intro", "x"));
        assert!(ws.has_document("intro"));
        assert_eq!(ws.read_document("intro").unwrap().title, "Intro");
        ws.remove_document("intro");
        assert!(ws.read_document("intro").is_none());
    }

    #[test]
    fn seeded_remote_lists_documents() {
        let (remote, ids) = seeded_remote(&[("A", "a"), ("B", "b")]);
        assert_eq!(ids.len(), 2);
        assert_eq!(remote.list_documents(SPACE_KEY).unwrap().len(), 2);
        assert_eq!(remote.calls().len(), 1);
    }
}
