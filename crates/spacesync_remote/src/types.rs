//! Typed document and attachment payloads.
//!
//! [`Document`] doubles as the on-disk format of a mirrored document, so its
//! serde layout is stable: camelCase keys, optional fields omitted when absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Representation tag for HTML storage-format bodies.
pub const STORAGE_REPRESENTATION: &str = "storage";

/// Publication status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Published.
    #[default]
    Current,
    /// Unpublished draft. Required before moving between containers.
    Draft,
    /// Archived by a space administrator.
    Archived,
    /// In the trash.
    Trashed,
    /// Any status this client does not model.
    #[serde(other)]
    Other,
}

impl DocumentStatus {
    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Current => "current",
            DocumentStatus::Draft => "draft",
            DocumentStatus::Archived => "archived",
            DocumentStatus::Trashed => "trashed",
            DocumentStatus::Other => "other",
        }
    }
}

/// A markup payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// Representation tag, `storage` for HTML storage format.
    #[serde(default = "default_representation")]
    pub representation: String,
    /// Markup text.
    #[serde(default)]
    pub value: String,
}

fn default_representation() -> String {
    STORAGE_REPRESENTATION.to_string()
}

impl Body {
    /// Creates a storage-format body.
    pub fn storage(value: impl Into<String>) -> Self {
        Self {
            representation: default_representation(),
            value: value.into(),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::storage("")
    }
}

/// A remote document (page).
///
/// `id` is absent until the remote service has created the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Remote identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Title; also the source of the local filename.
    #[serde(default)]
    pub title: String,
    /// Publication status.
    #[serde(default)]
    pub status: DocumentStatus,
    /// Markup body.
    #[serde(default)]
    pub body: Body,
    /// Remote version number.
    #[serde(
        default,
        deserialize_with = "version_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<u64>,
    /// Owning container (space) ID.
    #[serde(default, rename = "spaceId", skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Author account ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    /// Current owner account ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Parent page ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Sibling ordering position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl Document {
    /// Creates a new, never-synced document with a storage-format body.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            status: DocumentStatus::Current,
            body: Body::storage(body),
            version: None,
            container_id: None,
            created_at: None,
            author_id: None,
            owner_id: None,
            parent_id: None,
            position: None,
        }
    }

    /// Sets the remote ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the container ID.
    pub fn with_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }
}

/// Accepts either a bare version number or a `{"number": n, ...}` object.
///
/// Older mirrors stored the remote version object verbatim.
fn version_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Version {
        Number(u64),
        Object { number: u64 },
    }

    Ok(Option::<Version>::deserialize(deserializer)?.map(|v| match v {
        Version::Number(n) | Version::Object { number: n } => n,
    }))
}

/// Summary entry returned when listing a container's documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    /// Remote identity.
    pub id: String,
    /// Title.
    pub title: String,
    /// Publication status.
    pub status: DocumentStatus,
    /// Owning container ID.
    pub container_id: Option<String>,
    /// Version at listing time.
    pub version: Option<u64>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone().unwrap_or_default(),
            title: doc.title.clone(),
            status: doc.status,
            container_id: doc.container_id.clone(),
            version: doc.version,
        }
    }
}

/// Attachment metadata as listed under its owning document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    /// Attachment ID.
    pub id: String,
    /// File name of the attachment.
    pub title: String,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Download reference: a site-relative path or an absolute URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
}

impl AttachmentMeta {
    /// Creates attachment metadata with a download reference.
    pub fn new(id: impl Into<String>, title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            media_type: None,
            file_size: None,
            download_link: Some(link.into()),
        }
    }
}

/// Enrichment metadata persisted next to a downloaded attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    /// The attachment record as returned by the service.
    #[serde(flatten)]
    pub attachment: serde_json::Map<String, serde_json::Value>,
    /// Version history.
    #[serde(default)]
    pub versions: Vec<serde_json::Value>,
    /// Labels.
    #[serde(default)]
    pub labels: Vec<serde_json::Value>,
    /// Content properties.
    #[serde(default)]
    pub properties: Vec<serde_json::Value>,
}

/// Filters applied when listing attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFilter {
    /// Only attachments of this MIME type.
    pub media_type: Option<String>,
    /// Only attachments with this file name.
    pub filename: Option<String>,
    /// Only attachments in these statuses (`current`, `archived`, `trashed`).
    pub status: Vec<String>,
    /// Maximum number of results.
    pub limit: usize,
}

impl AttachmentFilter {
    /// Upper bound on a single listing page.
    pub const MAX_PAGE: usize = 250;

    /// Creates a filter returning up to `limit` attachments.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

impl Default for AttachmentFilter {
    fn default() -> Self {
        Self {
            media_type: None,
            filename: None,
            status: Vec::new(),
            limit: 50,
        }
    }
}
