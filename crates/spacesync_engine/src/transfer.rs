//! Attachment downloads.
//!
//! A download reference may be site-relative, in which case several path
//! prefixes are tried in turn, or absolute. Each candidate URL gets a bounded
//! number of attempts with linear backoff; a not-found response moves on to
//! the next candidate immediately.

use crate::config::TransferRetry;
use crate::error::{SyncError, SyncResult};
use spacesync_remote::{AttachmentMeta, RemoteError, RemoteService};
use std::thread;
use tracing::{debug, warn};

/// Expands a download reference into the absolute URLs to try, in order.
pub fn candidate_urls(base_url: &str, owner_id: &str, link: &str) -> Vec<String> {
    let base = base_url.trim_end_matches('/');
    if !link.starts_with('/') {
        return vec![link.to_string()];
    }

    let clean = ["/wiki/", "/rest/"]
        .iter()
        .find_map(|prefix| link.strip_prefix(prefix))
        .map(|rest| format!("/{rest}"))
        .unwrap_or_else(|| link.to_string());

    let mut urls = vec![
        format!("{base}{clean}"),
        format!("{base}/wiki{clean}"),
        format!("{base}/rest{clean}"),
        format!("{base}/download{clean}"),
    ];
    if clean.contains("download") {
        urls.push(format!("{base}/attachments/{owner_id}/download"));
        urls.push(format!("{base}/wiki/attachments/{owner_id}/download"));
    }
    urls
}

/// Downloads attachment bytes from a remote service.
pub struct AttachmentTransfer<'a, R: RemoteService + ?Sized> {
    remote: &'a R,
    retry: &'a TransferRetry,
}

impl<'a, R: RemoteService + ?Sized> AttachmentTransfer<'a, R> {
    /// Creates a transfer over `remote`.
    pub fn new(remote: &'a R, retry: &'a TransferRetry) -> Self {
        Self { remote, retry }
    }

    /// Downloads the bytes of `attachment`, owned by document `owner_id`.
    ///
    /// # Errors
    ///
    /// [`SyncError::MissingDownloadLink`] if the attachment has no reference,
    /// [`SyncError::TransferExhausted`] once every candidate has failed.
    pub fn download(&self, owner_id: &str, attachment: &AttachmentMeta) -> SyncResult<Vec<u8>> {
        let link = attachment
            .download_link
            .as_deref()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| SyncError::MissingDownloadLink {
                attachment: attachment.title.clone(),
            })?;

        let candidates = candidate_urls(self.remote.base_url(), owner_id, link);
        let mut last: Option<RemoteError> = None;

        for url in &candidates {
            for attempt in 1..=self.retry.max_attempts {
                debug!(
                    attachment = %attachment.title,
                    url = %url,
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    "downloading attachment"
                );
                match self.remote.get_attachment_bytes(url) {
                    Ok(bytes) => {
                        debug!(attachment = %attachment.title, bytes = bytes.len(), "downloaded");
                        return Ok(bytes);
                    }
                    Err(e) if e.is_not_found() => {
                        debug!(attachment = %attachment.title, url = %url, "not found at candidate");
                        last = Some(e);
                        break;
                    }
                    Err(e) => {
                        warn!(
                            attachment = %attachment.title,
                            url = %url,
                            attempt,
                            error = %e,
                            "attachment download failed"
                        );
                        last = Some(e);
                        if attempt < self.retry.max_attempts {
                            let delay = self.retry.delay_after(attempt);
                            if !delay.is_zero() {
                                thread::sleep(delay);
                            }
                        }
                    }
                }
            }
        }

        Err(SyncError::TransferExhausted {
            attachment: attachment.title.clone(),
            candidates: candidates.len(),
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacesync_remote::{Document, MemoryRemote, RemoteCall};
    use std::time::Duration;

    const BASE: &str = "https://wiki.example.test";

    fn no_wait() -> TransferRetry {
        TransferRetry {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    fn downloads(remote: &MemoryRemote) -> Vec<String> {
        remote
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::GetAttachmentBytes(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn relative_download_link_candidates() {
        let urls = candidate_urls(
            "https://site.test/",
            "55",
            "/wiki/download/attachments/55/a.png?version=1",
        );
        assert_eq!(
            urls,
            vec![
                "https://site.test/download/attachments/55/a.png?version=1",
                "https://site.test/wiki/download/attachments/55/a.png?version=1",
                "https://site.test/rest/download/attachments/55/a.png?version=1",
                "https://site.test/download/download/attachments/55/a.png?version=1",
                "https://site.test/attachments/55/download",
                "https://site.test/wiki/attachments/55/download",
            ]
        );
    }

    #[test]
    fn plain_relative_link_has_four_candidates() {
        let urls = candidate_urls(BASE, "1", "/files/a.png");
        assert_eq!(urls.len(), 4);
        assert_eq!(urls[0], format!("{BASE}/files/a.png"));
    }

    #[test]
    fn absolute_link_is_used_as_is() {
        let urls = candidate_urls(BASE, "1", "https://cdn.test/a.png");
        assert_eq!(urls, vec!["https://cdn.test/a.png"]);
    }

    #[test]
    fn not_found_advances_to_next_candidate() {
        let remote = MemoryRemote::new("DOCS", "98");
        let owner = remote.insert(Document::new("Doc", ""));
        let second = format!("{BASE}/wiki/files/a.png");
        remote.add_attachment(&owner, AttachmentMeta::new("a1", "a.png", "/files/a.png"), &second, b"ok");

        let retry = no_wait();
        let meta = AttachmentMeta::new("a1", "a.png", "/files/a.png");
        let bytes = AttachmentTransfer::new(&remote, &retry).download(&owner, &meta).unwrap();

        assert_eq!(bytes, b"ok");
        assert_eq!(downloads(&remote), vec![format!("{BASE}/files/a.png"), second]);
    }

    #[test]
    fn transient_failures_retry_same_url() {
        let remote = MemoryRemote::new("DOCS", "98");
        let url = "https://cdn.test/a.png";
        remote.add_attachment("1", AttachmentMeta::new("a1", "a.png", url), url, b"ok");
        remote.fail_download(url, 503, 2);

        let retry = no_wait();
        let meta = AttachmentMeta::new("a1", "a.png", url);
        let bytes = AttachmentTransfer::new(&remote, &retry).download("1", &meta).unwrap();

        assert_eq!(bytes, b"ok");
        assert_eq!(downloads(&remote).len(), 3);
    }

    #[test]
    fn exhaustion_reports_candidates() {
        let remote = MemoryRemote::new("DOCS", "98");
        let url = "https://cdn.test/a.png";
        remote.add_attachment("1", AttachmentMeta::new("a1", "a.png", url), url, b"ok");
        remote.fail_download(url, 500, 10);

        let retry = no_wait();
        let meta = AttachmentMeta::new("a1", "a.png", url);
        let err = AttachmentTransfer::new(&remote, &retry)
            .download("1", &meta)
            .unwrap_err();

        assert!(matches!(err, SyncError::TransferExhausted { candidates: 1, .. }));
        assert_eq!(downloads(&remote).len(), 3);
    }

    #[test]
    fn missing_link_is_an_error() {
        let remote = MemoryRemote::new("DOCS", "98");
        let retry = no_wait();
        let mut meta = AttachmentMeta::new("a1", "a.png", "");
        meta.download_link = None;

        let err = AttachmentTransfer::new(&remote, &retry)
            .download("1", &meta)
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingDownloadLink { .. }));
        assert!(remote.calls().is_empty());
    }
}
