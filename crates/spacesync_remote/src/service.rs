//! The remote service abstraction consumed by the sync engine.

use crate::error::RemoteResult;
use crate::types::{AttachmentFilter, AttachmentMeta, AttachmentMetadata, Document, DocumentSummary};
use std::sync::Arc;

/// A remote document-space service.
///
/// This trait abstracts the network layer so the engine can run against the
/// REST implementation ([`crate::ConfluenceRemote`]) or the in-memory one
/// ([`crate::MemoryRemote`]). Implementations own authentication, pagination
/// and transport-level retries; every call must be bounded in time.
pub trait RemoteService: Send + Sync {
    /// Site base URL used to resolve relative attachment download links.
    fn base_url(&self) -> &str;

    /// Resolves a container key (e.g. a space key) to its container ID.
    fn resolve_container(&self, key: &str) -> RemoteResult<String>;

    /// Lists the current documents in a container, in remote order.
    fn list_documents(&self, container_key: &str) -> RemoteResult<Vec<DocumentSummary>>;

    /// Fetches a document's full payload, including version, container and status.
    fn get_document(&self, id: &str) -> RemoteResult<Document>;

    /// Creates a document and returns it with its assigned ID and version.
    fn create_document(&self, doc: &Document) -> RemoteResult<Document>;

    /// Updates a document.
    ///
    /// `doc.version` must be exactly one more than the stored version,
    /// otherwise [`crate::RemoteError::VersionConflict`] is returned. A missing
    /// document yields [`crate::RemoteError::NotFound`]. When
    /// `doc.container_id` is set it requests a move to that container.
    fn update_document(&self, id: &str, doc: &Document) -> RemoteResult<Document>;

    /// Deletes a document. Deleting a missing document succeeds.
    fn delete_document(&self, id: &str) -> RemoteResult<()>;

    /// Lists the attachments of a document.
    fn list_attachments(
        &self,
        document_id: &str,
        filter: &AttachmentFilter,
    ) -> RemoteResult<Vec<AttachmentMeta>>;

    /// Downloads raw bytes from an absolute URL, without transport retries.
    fn get_attachment_bytes(&self, url: &str) -> RemoteResult<Vec<u8>>;

    /// Fetches an attachment's record plus its versions, labels and properties.
    fn get_attachment_metadata(&self, id: &str) -> RemoteResult<AttachmentMetadata>;
}

impl<R: RemoteService + ?Sized> RemoteService for Arc<R> {
    fn base_url(&self) -> &str {
        (**self).base_url()
    }

    fn resolve_container(&self, key: &str) -> RemoteResult<String> {
        (**self).resolve_container(key)
    }

    fn list_documents(&self, container_key: &str) -> RemoteResult<Vec<DocumentSummary>> {
        (**self).list_documents(container_key)
    }

    fn get_document(&self, id: &str) -> RemoteResult<Document> {
        (**self).get_document(id)
    }

    fn create_document(&self, doc: &Document) -> RemoteResult<Document> {
        (**self).create_document(doc)
    }

    fn update_document(&self, id: &str, doc: &Document) -> RemoteResult<Document> {
        (**self).update_document(id, doc)
    }

    fn delete_document(&self, id: &str) -> RemoteResult<()> {
        (**self).delete_document(id)
    }

    fn list_attachments(
        &self,
        document_id: &str,
        filter: &AttachmentFilter,
    ) -> RemoteResult<Vec<AttachmentMeta>> {
        (**self).list_attachments(document_id, filter)
    }

    fn get_attachment_bytes(&self, url: &str) -> RemoteResult<Vec<u8>> {
        (**self).get_attachment_bytes(url)
    }

    fn get_attachment_metadata(&self, id: &str) -> RemoteResult<AttachmentMetadata> {
        (**self).get_attachment_metadata(id)
    }
}
