//! REST implementation of [`RemoteService`].
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so the process can
//! plug in reqwest (the CLI does) while tests script responses directly.

use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::service::RemoteService;
use crate::types::{
    AttachmentFilter, AttachmentMeta, AttachmentMetadata, Body, Document, DocumentStatus,
    DocumentSummary, STORAGE_REPRESENTATION,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL, possibly already carrying a query string.
    pub url: String,
    /// Query parameters to append.
    pub query: Vec<(String, String)>,
    /// JSON request body.
    pub body: Option<Vec<u8>>,
    /// Value of the `Accept` header.
    pub accept: &'static str,
}

impl HttpRequest {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            body: None,
            accept: "application/json",
        }
    }

    fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    fn json<T: Serialize>(mut self, body: &T) -> RemoteResult<Self> {
        self.body = Some(
            serde_json::to_vec(body)
                .map_err(|e| RemoteError::Decode(format!("failed to encode request: {e}")))?,
        );
        Ok(self)
    }
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client abstraction.
///
/// Implementations apply authentication and timeouts. `Err` means no response
/// was received at all (connection failure, timeout).
pub trait HttpClient: Send + Sync {
    /// Executes a request.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, String>;
}

/// REST client for a Confluence-style document-space service (API v2).
pub struct ConfluenceRemote<C: HttpClient> {
    config: RemoteConfig,
    client: C,
    /// Resolved container IDs keyed by container key.
    containers: RwLock<Vec<(String, String)>>,
}

impl<C: HttpClient> ConfluenceRemote<C> {
    /// Creates a new REST remote.
    pub fn new(config: RemoteConfig, client: C) -> Self {
        Self {
            config,
            client,
            containers: RwLock::new(Vec::new()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_root(), path)
    }

    /// Sends a request, retrying throttled, 5xx and connection failures.
    ///
    /// POST is not idempotent and is sent once.
    fn send(&self, request: &HttpRequest) -> RemoteResult<HttpResponse> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let delay = retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            attempt += 1;

            match self.send_once(request) {
                Err(e)
                    if e.is_retryable()
                        && request.method != Method::Post
                        && attempt < retry.max_attempts =>
                {
                    warn!(url = %request.url, attempt, error = %e, "retrying request");
                }
                other => return other,
            }
        }
    }

    /// Sends a request once, mapping non-2xx statuses to errors.
    fn send_once(&self, request: &HttpRequest) -> RemoteResult<HttpResponse> {
        debug!(method = ?request.method, url = %request.url, "sending request");
        let response = self
            .client
            .execute(request)
            .map_err(RemoteError::transport_retryable)?;

        if response.is_success() {
            return Ok(response);
        }

        match response.status {
            404 => Err(RemoteError::not_found(request.url.clone())),
            status => Err(RemoteError::http(
                format!("{:?} {} failed", request.method, request.url),
                status,
                Some(response.text()),
            )),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, request: &HttpRequest) -> RemoteResult<T> {
        let response = self.send(request)?;
        decode(&response.body)
    }

    /// Follows `_links.next` until exhausted or `limit` results are collected.
    fn get_all<T: DeserializeOwned>(
        &self,
        first: HttpRequest,
        limit: Option<usize>,
    ) -> RemoteResult<Vec<T>> {
        let mut results = Vec::new();
        let mut request = Some(first);

        while let Some(current) = request.take() {
            let page: WireList<T> = self.get_json(&current)?;
            results.extend(page.results);

            if limit.is_some_and(|l| results.len() >= l) {
                break;
            }
            request = page
                .links
                .and_then(|l| l.next)
                .map(|next| HttpRequest::new(Method::Get, self.absolute(&next)));
        }

        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    fn absolute(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}{}", self.config.base_url, link)
        }
    }

    fn cached_container(&self, key: &str) -> Option<String> {
        self.containers
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, id)| id.clone())
    }

    fn update_failed(&self, id: &str, err: RemoteError) -> RemoteError {
        match err {
            RemoteError::Transport {
                status: Some(409),
                body,
                ..
            } => RemoteError::VersionConflict {
                id: id.to_string(),
                message: body.unwrap_or_else(|| "stale version".into()),
            },
            RemoteError::NotFound { .. } => RemoteError::not_found(format!("page {id}")),
            other => other,
        }
    }
}

impl<C: HttpClient> RemoteService for ConfluenceRemote<C> {
    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn resolve_container(&self, key: &str) -> RemoteResult<String> {
        if let Some(id) = self.cached_container(key) {
            return Ok(id);
        }

        let request = HttpRequest::new(Method::Get, self.url("/spaces")).query("keys", key);
        let spaces: Vec<WireSpace> = self.get_all(request, None)?;
        let space = spaces
            .into_iter()
            .find(|s| s.key.as_deref() == Some(key))
            .ok_or_else(|| RemoteError::not_found(format!("space {key}")))?;

        debug!(key, id = %space.id, "resolved space");
        self.containers
            .write()
            .push((key.to_string(), space.id.clone()));
        Ok(space.id)
    }

    fn list_documents(&self, container_key: &str) -> RemoteResult<Vec<DocumentSummary>> {
        let space_id = self.resolve_container(container_key)?;
        let request = HttpRequest::new(Method::Get, self.url("/pages"))
            .query("space-id", space_id)
            .query("status", "current")
            .query("limit", self.config.page_limit.to_string())
            .query("body-format", "storage");

        let pages: Vec<WirePage> = self.get_all(request, None)?;
        Ok(pages.into_iter().map(WirePage::into_summary).collect())
    }

    fn get_document(&self, id: &str) -> RemoteResult<Document> {
        let request = HttpRequest::new(Method::Get, self.url(&format!("/pages/{id}")))
            .query("body-format", "storage");
        let page: WirePage = self.get_json(&request).map_err(|e| match e {
            RemoteError::NotFound { .. } => RemoteError::not_found(format!("page {id}")),
            other => other,
        })?;
        Ok(page.into_document())
    }

    fn create_document(&self, doc: &Document) -> RemoteResult<Document> {
        let space_id = doc
            .container_id
            .clone()
            .ok_or(RemoteError::MissingField("spaceId"))?;
        let payload = CreatePage {
            space_id,
            status: DocumentStatus::Current.as_str(),
            title: &doc.title,
            parent_id: doc.parent_id.as_deref(),
            body: WireBodyOut::from(&doc.body),
        };

        let request = HttpRequest::new(Method::Post, self.url("/pages")).json(&payload)?;
        let page: WirePage = self.get_json(&request)?;
        if page.id.is_empty() {
            return Err(RemoteError::MissingField("id"));
        }
        Ok(page.into_document())
    }

    fn update_document(&self, id: &str, doc: &Document) -> RemoteResult<Document> {
        let number = doc.version.ok_or(RemoteError::MissingField("version"))?;
        let payload = UpdatePage {
            id,
            status: doc.status.as_str(),
            title: &doc.title,
            space_id: doc.container_id.as_deref(),
            body: WireBodyOut::from(&doc.body),
            version: VersionOut {
                number,
                message: format!("Updated via spacesync at {}", Utc::now().to_rfc3339()),
            },
        };

        let request =
            HttpRequest::new(Method::Put, self.url(&format!("/pages/{id}"))).json(&payload)?;
        let response = self
            .send(&request)
            .map_err(|e| self.update_failed(id, e))?;
        let page: WirePage = decode(&response.body)?;
        Ok(page.into_document())
    }

    fn delete_document(&self, id: &str) -> RemoteResult<()> {
        let request = HttpRequest::new(Method::Delete, self.url(&format!("/pages/{id}")));
        match self.send(&request) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(id, "page already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn list_attachments(
        &self,
        document_id: &str,
        filter: &AttachmentFilter,
    ) -> RemoteResult<Vec<AttachmentMeta>> {
        let page_size = filter.limit.clamp(1, AttachmentFilter::MAX_PAGE);
        let mut request = HttpRequest::new(
            Method::Get,
            self.url(&format!("/pages/{document_id}/attachments")),
        )
        .query("limit", page_size.to_string());
        if let Some(media_type) = &filter.media_type {
            request = request.query("mediaType", media_type.clone());
        }
        if let Some(filename) = &filter.filename {
            request = request.query("filename", filename.clone());
        }
        for status in &filter.status {
            request = request.query("status", status.clone());
        }

        let attachments: Vec<WireAttachment> = self.get_all(request, Some(filter.limit))?;
        Ok(attachments.into_iter().map(WireAttachment::into_meta).collect())
    }

    fn get_attachment_bytes(&self, url: &str) -> RemoteResult<Vec<u8>> {
        let mut request = HttpRequest::new(Method::Get, url);
        request.accept = "*/*";
        Ok(self.send_once(&request)?.body)
    }

    fn get_attachment_metadata(&self, id: &str) -> RemoteResult<AttachmentMetadata> {
        let base = self.url(&format!("/attachments/{id}"));
        let attachment: serde_json::Map<String, serde_json::Value> =
            self.get_json(&HttpRequest::new(Method::Get, base.clone()))?;

        let mut metadata = AttachmentMetadata {
            attachment,
            ..AttachmentMetadata::default()
        };

        // Sub-resources are enrichment; a failure leaves the list empty.
        for (name, target) in [
            ("versions", &mut metadata.versions),
            ("labels", &mut metadata.labels),
            ("properties", &mut metadata.properties),
        ] {
            let request = HttpRequest::new(Method::Get, format!("{base}/{name}"));
            match self.get_json::<WireList<serde_json::Value>>(&request) {
                Ok(list) => *target = list.results,
                Err(e) => debug!(attachment = id, resource = name, error = %e, "skipping"),
            }
        }

        Ok(metadata)
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> RemoteResult<T> {
    serde_json::from_slice(body).map_err(|e| RemoteError::Decode(e.to_string()))
}

#[derive(Deserialize)]
struct WireList<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default, rename = "_links")]
    links: Option<WireLinks>,
}

#[derive(Deserialize)]
struct WireLinks {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    download: Option<String>,
}

#[derive(Deserialize)]
struct WireSpace {
    id: String,
    #[serde(default)]
    key: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePage {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    status: DocumentStatus,
    #[serde(default)]
    space_id: Option<String>,
    #[serde(default)]
    version: Option<WireVersion>,
    #[serde(default)]
    body: Option<WireBodyIn>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    owner_id: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    position: Option<i64>,
}

#[derive(Deserialize)]
struct WireVersion {
    number: u64,
}

#[derive(Deserialize)]
struct WireBodyIn {
    #[serde(default)]
    storage: Option<Body>,
}

impl WirePage {
    fn into_summary(self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            title: self.title,
            status: self.status,
            container_id: self.space_id,
            version: self.version.map(|v| v.number),
        }
    }

    fn into_document(self) -> Document {
        let body = self
            .body
            .and_then(|b| b.storage)
            .unwrap_or_default();
        Document {
            id: Some(self.id).filter(|id| !id.is_empty()),
            title: self.title,
            status: self.status,
            body,
            version: self.version.map(|v| v.number),
            container_id: self.space_id,
            created_at: self.created_at,
            author_id: self.author_id,
            owner_id: self.owner_id,
            parent_id: self.parent_id,
            position: self.position,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAttachment {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    download_link: Option<String>,
    #[serde(default, rename = "_links")]
    links: Option<WireLinks>,
}

impl WireAttachment {
    fn into_meta(self) -> AttachmentMeta {
        let download_link = self
            .links
            .and_then(|l| l.download)
            .or(self.download_link);
        AttachmentMeta {
            id: self.id,
            title: self.title,
            media_type: self.media_type,
            file_size: self.file_size,
            download_link,
        }
    }
}

#[derive(Serialize)]
struct WireBodyOut<'a> {
    representation: &'a str,
    value: &'a str,
}

impl<'a> From<&'a Body> for WireBodyOut<'a> {
    fn from(body: &'a Body) -> Self {
        Self {
            representation: if body.representation.is_empty() {
                STORAGE_REPRESENTATION
            } else {
                &body.representation
            },
            value: &body.value,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePage<'a> {
    space_id: String,
    status: &'static str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
    body: WireBodyOut<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePage<'a> {
    id: &'a str,
    status: &'static str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    space_id: Option<&'a str>,
    body: WireBodyOut<'a>,
    version: VersionOut,
}

#[derive(Serialize)]
struct VersionOut {
    number: u64,
    message: String,
}
