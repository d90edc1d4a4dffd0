//! In-memory remote service for testing.
//!
//! [`MemoryRemote`] enforces the same rules the real service does: version
//! numbers must advance by exactly one, and a document must be a draft
//! before it can change containers. Every call is recorded so tests can
//! assert on the exact traffic a sync run produced.

use crate::error::{RemoteError, RemoteResult};
use crate::service::RemoteService;
use crate::types::{
    AttachmentFilter, AttachmentMeta, AttachmentMetadata, Document, DocumentStatus,
    DocumentSummary,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// A call received by [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// `resolve_container(key)`
    ResolveContainer(String),
    /// `list_documents(key)`
    ListDocuments(String),
    /// `get_document(id)`
    GetDocument(String),
    /// `create_document` with the submitted title.
    CreateDocument(String),
    /// `update_document` with the submitted status, version and move target.
    UpdateDocument {
        /// Document ID.
        id: String,
        /// Submitted status.
        status: DocumentStatus,
        /// Submitted version.
        version: Option<u64>,
        /// Requested container, if moving.
        container_id: Option<String>,
    },
    /// `delete_document(id)`
    DeleteDocument(String),
    /// `list_attachments(document_id)`
    ListAttachments(String),
    /// `get_attachment_bytes(url)`
    GetAttachmentBytes(String),
    /// `get_attachment_metadata(id)`
    GetAttachmentMetadata(String),
}

impl RemoteCall {
    /// Returns true for calls that change remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            RemoteCall::CreateDocument(_)
                | RemoteCall::UpdateDocument { .. }
                | RemoteCall::DeleteDocument(_)
        )
    }
}

#[derive(Default)]
struct Inner {
    containers: HashMap<String, String>,
    /// Documents in creation order, keyed by numeric ID.
    documents: BTreeMap<u64, Document>,
    next_id: u64,
    attachments: HashMap<String, Vec<AttachmentMeta>>,
    blobs: HashMap<String, Vec<u8>>,
    /// URL -> (status, remaining failures).
    flaky: HashMap<String, (u16, u32)>,
    broken_listings: HashMap<String, u16>,
    broken_documents: HashMap<String, u16>,
    pending_bumps: HashMap<String, u64>,
    draft_lag: HashMap<String, u32>,
    calls: Vec<RemoteCall>,
}

/// An in-memory document-space service.
pub struct MemoryRemote {
    base_url: String,
    default_container: String,
    inner: Mutex<Inner>,
}

impl MemoryRemote {
    /// Creates a remote with one container `key` whose ID is `container_id`.
    pub fn new(key: impl Into<String>, container_id: impl Into<String>) -> Self {
        let container_id = container_id.into();
        let mut inner = Inner {
            next_id: 1000,
            ..Inner::default()
        };
        inner.containers.insert(key.into(), container_id.clone());
        Self {
            base_url: "https://wiki.example.test".into(),
            default_container: container_id,
            inner: Mutex::new(inner),
        }
    }

    /// Registers an additional container.
    pub fn add_container(&self, key: impl Into<String>, container_id: impl Into<String>) {
        self.inner
            .lock()
            .containers
            .insert(key.into(), container_id.into());
    }

    /// Stores a document directly, bypassing call recording. Returns its ID.
    ///
    /// The document keeps its container if set, else lands in the default one.
    pub fn insert(&self, doc: Document) -> String {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let version = doc.version.unwrap_or(1);
        let container_id = doc
            .container_id
            .clone()
            .unwrap_or_else(|| self.default_container.clone());
        let stored = Document {
            id: Some(id.to_string()),
            version: Some(version),
            container_id: Some(container_id),
            ..doc
        };
        inner.documents.insert(id, stored);
        id.to_string()
    }

    /// Returns the stored document, if present.
    pub fn document(&self, id: &str) -> Option<Document> {
        let key = id.parse::<u64>().ok()?;
        self.inner.lock().documents.get(&key).cloned()
    }

    /// Returns all stored documents in creation order.
    pub fn documents(&self) -> Vec<Document> {
        self.inner.lock().documents.values().cloned().collect()
    }

    /// Removes a document without recording a call, as another client would.
    pub fn remove(&self, id: &str) -> Option<Document> {
        let key = id.parse::<u64>().ok()?;
        self.inner.lock().documents.remove(&key)
    }

    /// Attaches a file to a document, served at `url`.
    pub fn add_attachment(&self, document_id: &str, meta: AttachmentMeta, url: &str, bytes: &[u8]) {
        let mut inner = self.inner.lock();
        inner
            .attachments
            .entry(document_id.to_string())
            .or_default()
            .push(meta);
        inner.blobs.insert(url.to_string(), bytes.to_vec());
    }

    /// Makes the next `times` downloads of `url` fail with `status`.
    pub fn fail_download(&self, url: &str, status: u16, times: u32) {
        self.inner
            .lock()
            .flaky
            .insert(url.to_string(), (status, times));
    }

    /// Makes attachment listing for a document fail with `status`.
    pub fn break_attachment_listing(&self, document_id: &str, status: u16) {
        self.inner
            .lock()
            .broken_listings
            .insert(document_id.to_string(), status);
    }

    /// Makes `get_document` for a document fail with `status`.
    pub fn break_document(&self, document_id: &str, status: u16) {
        self.inner
            .lock()
            .broken_documents
            .insert(document_id.to_string(), status);
    }

    /// Drops the stored container of a document, as a response without
    /// `spaceId` would report it.
    pub fn detach_container(&self, id: &str) {
        if let Ok(key) = id.parse::<u64>() {
            if let Some(stored) = self.inner.lock().documents.get_mut(&key) {
                stored.container_id = None;
            }
        }
    }

    /// Simulates a concurrent editor: right after the next `get_document`
    /// for `id`, the stored version advances by `by`.
    pub fn bump_after_next_read(&self, id: &str, by: u64) {
        self.inner.lock().pending_bumps.insert(id.to_string(), by);
    }

    /// Keeps reporting the previous status for `reads` reads after a draft conversion.
    pub fn lag_draft_status(&self, id: &str, reads: u32) {
        self.inner.lock().draft_lag.insert(id.to_string(), reads);
    }

    /// Returns every recorded call.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().calls.clone()
    }

    /// Returns only the recorded calls that change remote state.
    pub fn mutations(&self) -> Vec<RemoteCall> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Clears the call log.
    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    fn record(inner: &mut Inner, call: RemoteCall) {
        inner.calls.push(call);
    }
}

fn parse_id(id: &str) -> RemoteResult<u64> {
    id.parse()
        .map_err(|_| RemoteError::not_found(format!("page {id}")))
}

impl RemoteService for MemoryRemote {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resolve_container(&self, key: &str) -> RemoteResult<String> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, RemoteCall::ResolveContainer(key.to_string()));
        inner
            .containers
            .get(key)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("space {key}")))
    }

    fn list_documents(&self, container_key: &str) -> RemoteResult<Vec<DocumentSummary>> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, RemoteCall::ListDocuments(container_key.to_string()));
        let container = inner
            .containers
            .get(container_key)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("space {container_key}")))?;

        Ok(inner
            .documents
            .values()
            .filter(|d| d.container_id.as_deref() == Some(container.as_str()))
            .filter(|d| d.status == DocumentStatus::Current)
            .map(DocumentSummary::from)
            .collect())
    }

    fn get_document(&self, id: &str) -> RemoteResult<Document> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, RemoteCall::GetDocument(id.to_string()));

        if let Some(status) = inner.broken_documents.get(id) {
            return Err(RemoteError::http(format!("GET page {id}"), *status, None));
        }

        let key = parse_id(id)?;
        let mut doc = inner
            .documents
            .get(&key)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("page {id}")))?;

        if let Some(by) = inner.pending_bumps.remove(id) {
            if let Some(stored) = inner.documents.get_mut(&key) {
                stored.version = Some(stored.version.unwrap_or(1) + by);
            }
        }

        if let Some(lag) = inner.draft_lag.get_mut(id) {
            if *lag > 0 && doc.status == DocumentStatus::Draft {
                *lag -= 1;
                doc.status = DocumentStatus::Current;
            }
        }

        Ok(doc)
    }

    fn create_document(&self, doc: &Document) -> RemoteResult<Document> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, RemoteCall::CreateDocument(doc.title.clone()));

        inner.next_id += 1;
        let id = inner.next_id;
        let created = Document {
            id: Some(id.to_string()),
            version: Some(1),
            status: DocumentStatus::Current,
            container_id: doc
                .container_id
                .clone()
                .or_else(|| Some(self.default_container.clone())),
            ..doc.clone()
        };
        inner.documents.insert(id, created.clone());
        Ok(created)
    }

    fn update_document(&self, id: &str, doc: &Document) -> RemoteResult<Document> {
        let mut inner = self.inner.lock();
        Self::record(
            &mut inner,
            RemoteCall::UpdateDocument {
                id: id.to_string(),
                status: doc.status,
                version: doc.version,
                container_id: doc.container_id.clone(),
            },
        );

        let key = parse_id(id)?;
        let stored = inner
            .documents
            .get_mut(&key)
            .ok_or_else(|| RemoteError::not_found(format!("page {id}")))?;

        let current = stored.version.unwrap_or(1);
        if doc.version != Some(current + 1) {
            return Err(RemoteError::VersionConflict {
                id: id.to_string(),
                message: format!(
                    "submitted version {:?} but current version is {current}",
                    doc.version
                ),
            });
        }

        if let Some(target) = &doc.container_id {
            if stored.container_id.as_ref() != Some(target)
                && stored.status != DocumentStatus::Draft
            {
                return Err(RemoteError::http(
                    format!("page {id} must be a draft to change space"),
                    400,
                    None,
                ));
            }
            stored.container_id = Some(target.clone());
        }

        stored.title = doc.title.clone();
        stored.body = doc.body.clone();
        stored.status = doc.status;
        stored.version = Some(current + 1);
        Ok(stored.clone())
    }

    fn delete_document(&self, id: &str) -> RemoteResult<()> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, RemoteCall::DeleteDocument(id.to_string()));
        if let Ok(key) = id.parse::<u64>() {
            inner.documents.remove(&key);
        }
        Ok(())
    }

    fn list_attachments(
        &self,
        document_id: &str,
        filter: &AttachmentFilter,
    ) -> RemoteResult<Vec<AttachmentMeta>> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, RemoteCall::ListAttachments(document_id.to_string()));

        if let Some(status) = inner.broken_listings.get(document_id) {
            return Err(RemoteError::http(
                format!("GET attachments of page {document_id}"),
                *status,
                None,
            ));
        }

        Ok(inner
            .attachments
            .get(document_id)
            .map(|all| {
                all.iter()
                    .filter(|a| {
                        filter.media_type.is_none() || a.media_type == filter.media_type
                    })
                    .filter(|a| filter.filename.as_ref().map_or(true, |f| &a.title == f))
                    .take(filter.limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_attachment_bytes(&self, url: &str) -> RemoteResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, RemoteCall::GetAttachmentBytes(url.to_string()));

        if let Some((status, remaining)) = inner.flaky.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                let status = *status;
                return Err(if status == 404 {
                    RemoteError::not_found(url.to_string())
                } else {
                    RemoteError::http(format!("GET {url}"), status, None)
                });
            }
        }

        inner
            .blobs
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(url.to_string()))
    }

    fn get_attachment_metadata(&self, id: &str) -> RemoteResult<AttachmentMetadata> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, RemoteCall::GetAttachmentMetadata(id.to_string()));

        let meta = inner
            .attachments
            .values()
            .flatten()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("attachment {id}")))?;

        let attachment = match serde_json::to_value(&meta) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        Ok(AttachmentMetadata {
            attachment,
            versions: vec![serde_json::json!({ "number": 1 })],
            labels: Vec::new(),
            properties: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> MemoryRemote {
        MemoryRemote::new("DOCS", "98")
    }

    #[test]
    fn create_assigns_id_and_version() {
        let remote = remote();
        let created = remote
            .create_document(&Document::new("Intro", "<p>hi</p>"))
            .unwrap();

        assert!(created.id.is_some());
        assert_eq!(created.version, Some(1));
        assert_eq!(created.container_id.as_deref(), Some("98"));
        assert_eq!(remote.mutations().len(), 1);
    }

    #[test]
    fn update_requires_next_version() {
        let remote = remote();
        let id = remote.insert(Document::new("Intro", "v1").with_version(3));

        let stale = Document::new("Intro", "v2").with_version(3);
        assert!(remote.update_document(&id, &stale).unwrap_err().is_conflict());

        let next = Document::new("Intro", "v2").with_version(4);
        let updated = remote.update_document(&id, &next).unwrap();
        assert_eq!(updated.version, Some(4));
        assert_eq!(updated.body.value, "v2");
    }

    #[test]
    fn concurrent_bump_causes_conflict() {
        let remote = remote();
        let id = remote.insert(Document::new("Intro", "v1").with_version(3));
        remote.bump_after_next_read(&id, 2);

        let read = remote.get_document(&id).unwrap();
        assert_eq!(read.version, Some(3));

        let submitted = Document::new("Intro", "v2").with_version(4);
        let err = remote.update_document(&id, &submitted).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(remote.document(&id).unwrap().version, Some(5));
    }

    #[test]
    fn moving_requires_draft() {
        let remote = remote();
        remote.add_container("OTHER", "99");
        let id = remote.insert(Document::new("Intro", "v1"));

        let moved = Document::new("Intro", "v1").with_version(2).with_container("99");
        let err = remote.update_document(&id, &moved).unwrap_err();
        assert_eq!(err.status(), Some(400));

        let draft = Document::new("Intro", "v1")
            .with_version(2)
            .with_status(DocumentStatus::Draft);
        remote.update_document(&id, &draft).unwrap();

        let moved = Document::new("Intro", "v1").with_version(3).with_container("99");
        let updated = remote.update_document(&id, &moved).unwrap();
        assert_eq!(updated.container_id.as_deref(), Some("99"));
        assert_eq!(updated.status, DocumentStatus::Current);
    }

    #[test]
    fn update_and_get_missing_are_not_found() {
        let remote = remote();
        let doc = Document::new("Ghost", "").with_version(2);
        assert!(remote.update_document("4242", &doc).unwrap_err().is_not_found());
        assert!(remote.get_document("4242").unwrap_err().is_not_found());
        assert!(remote.delete_document("4242").is_ok());
    }

    #[test]
    fn listing_filters_container_and_status() {
        let remote = remote();
        remote.add_container("OTHER", "99");
        remote.insert(Document::new("Here", ""));
        remote.insert(Document::new("Elsewhere", "").with_container("99"));
        remote.insert(Document::new("Draft", "").with_status(DocumentStatus::Draft));

        let listed = remote.list_documents("DOCS").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Here");
        assert!(remote.list_documents("MISSING").unwrap_err().is_not_found());
    }

    #[test]
    fn flaky_downloads_recover() {
        let remote = remote();
        let id = remote.insert(Document::new("Doc", ""));
        let url = "https://wiki.example.test/download/attachments/1/a.png";
        remote.add_attachment(&id, AttachmentMeta::new("a1", "a.png", "/x"), url, b"png");
        remote.fail_download(url, 500, 1);

        assert_eq!(remote.get_attachment_bytes(url).unwrap_err().status(), Some(500));
        assert_eq!(remote.get_attachment_bytes(url).unwrap(), b"png");
    }

    #[test]
    fn draft_status_can_lag() {
        let remote = remote();
        let id = remote.insert(Document::new("Doc", "").with_status(DocumentStatus::Draft));
        remote.lag_draft_status(&id, 1);

        assert_eq!(remote.get_document(&id).unwrap().status, DocumentStatus::Current);
        assert_eq!(remote.get_document(&id).unwrap().status, DocumentStatus::Draft);
    }
}
