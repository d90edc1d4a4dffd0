//! Error types for remote service calls.

use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors raised by a remote document-space service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure or a non-2xx response without a more specific meaning.
    #[error("transport error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        /// Error message.
        message: String,
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Raw response body, if any.
        body: Option<String>,
        /// Whether the request may succeed if sent again.
        retryable: bool,
    },

    /// The addressed resource does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },

    /// The submitted version was stale.
    #[error("version conflict on document {id}: {message}")]
    VersionConflict {
        /// Document ID.
        id: String,
        /// Server-provided detail.
        message: String,
    },

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A response was missing a field the client depends on.
    #[error("response missing field `{0}`")]
    MissingField(&'static str),
}

impl RemoteError {
    /// Creates a retryable transport error without a status code.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            body: None,
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error without a status code.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            body: None,
            retryable: false,
        }
    }

    /// Creates a transport error from an HTTP status and body.
    ///
    /// 429 and 5xx responses are marked retryable.
    pub fn http(message: impl Into<String>, status: u16, body: Option<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: Some(status),
            body,
            retryable: status == 429 || (500..600).contains(&status),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transport { retryable: true, .. })
    }

    /// Returns true if the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }

    /// Returns true if the request lost a version race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::VersionConflict { .. })
    }

    /// Returns the HTTP status code associated with this error.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Transport { status, .. } => *status,
            RemoteError::NotFound { .. } => Some(404),
            RemoteError::VersionConflict { .. } => Some(409),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(RemoteError::transport_retryable("connection reset").is_retryable());
        assert!(!RemoteError::transport_fatal("bad certificate").is_retryable());
        assert!(RemoteError::http("busy", 503, None).is_retryable());
        assert!(RemoteError::http("slow down", 429, None).is_retryable());
        assert!(!RemoteError::http("bad request", 400, None).is_retryable());
        assert!(!RemoteError::not_found("page 7").is_retryable());
    }

    #[test]
    fn status_codes() {
        assert_eq!(RemoteError::not_found("page 7").status(), Some(404));
        let conflict = RemoteError::VersionConflict {
            id: "7".into(),
            message: "stale".into(),
        };
        assert_eq!(conflict.status(), Some(409));
        assert!(conflict.is_conflict());
        assert_eq!(RemoteError::Decode("eof".into()).status(), None);
    }

    #[test]
    fn error_display() {
        let err = RemoteError::http("update failed", 400, Some("{}".into()));
        assert_eq!(err.to_string(), "transport error (HTTP 400): update failed");

        let err = RemoteError::transport_retryable("timed out");
        assert_eq!(err.to_string(), "transport error: timed out");
    }
}
