//! Error types for dayload

use std::time::Duration;
use thiserror::Error;

/// Result type alias for dayload operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors produced while resolving a query.
///
/// The type is `Clone` because one outcome is shared by every caller that
/// joined the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoaderError {
    /// Connection-level failure (reset, refused, request layer error)
    #[error("Transient network error: {0}")]
    Transient(String),

    /// The network call exceeded its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-2xx HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered with `status: "error"`
    #[error("Server error: {0}")]
    Server(String),

    /// Empty, malformed or unexpected response body
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Shutdown was signalled before the request settled
    #[error("Request aborted")]
    Aborted,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Durable store failure. Never surfaced by `DataLoader::fetch`.
    #[error("Cache I/O error: {0}")]
    CacheIo(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl LoaderError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<reqwest::Error> for LoaderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            // timeouts from the reqwest client itself, connect and body errors
            Self::Transient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LoaderError::Transient("reset".into()).is_transient());
        assert!(LoaderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(
            LoaderError::Status {
                status: 503,
                body: "busy".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(
            !LoaderError::Status {
                status: 404,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !LoaderError::Status {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!LoaderError::Server("bad query".into()).is_transient());
        assert!(!LoaderError::InvalidResponse("eof".into()).is_transient());
        assert!(!LoaderError::Aborted.is_transient());
        assert!(LoaderError::Aborted.is_aborted());
    }

    #[test]
    fn test_json_error_is_invalid_response() {
        let err: LoaderError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, LoaderError::InvalidResponse(_)));
    }

    #[test]
    fn test_display() {
        let err = LoaderError::Status {
            status: 500,
            body: "oops".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500: oops");
        assert_eq!(LoaderError::Aborted.to_string(), "Request aborted");
    }
}
