//! Error taxonomy for ingestion and synchronization
//!
//! Document-level and infrastructure failures are typed errors. Per-entry
//! problems are not errors at all: they are collected as
//! [`EntryWarning`](crate::models::EntryWarning) values next to the partial
//! result that was still produced.

use thiserror::Error;

/// Network-layer failure while talking to an upstream provider.
///
/// Every variant is retryable by the caller; nothing is retried internally.
/// URLs held here are already redacted with [`redact_url`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Response from {url} exceeds {limit_bytes} bytes")]
    BodyTooLarge { url: String, limit_bytes: u64 },

    #[error("Request to {url} failed: {message}")]
    Other { url: String, message: String },
}

/// Strips the query string (where Xtream carries credentials) from a URL
/// before it is embedded in an error or a log line.
pub fn redact_url(url: &str) -> String {
    url.split('?').next().unwrap_or_default().to_string()
}

/// Persistence layer failure. Always fatal for the operation that hit it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Persistence failure: {0}")]
pub struct PersistenceError(pub String);

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        PersistenceError(err.to_string())
    }
}

/// Credential blob could not be turned back into plaintext.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Credential decryption failed: {0}")]
pub struct DecryptionFailed(pub String);

/// Top-level failure of a parse, fetch or sync operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Invalid source credentials: {0}")]
    Credentials(String),

    #[error("Sync cancelled")]
    Cancelled,
}

impl From<DecryptionFailed> for IngestError {
    fn from(err: DecryptionFailed) -> Self {
        IngestError::Credentials(err.0)
    }
}

impl IngestError {
    /// Whether retrying the same request later can succeed without user action
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Transport(_) | IngestError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transport = IngestError::from(TransportError::Timeout {
            url: "http://host/get.php".to_string(),
        });
        assert!(transport.is_retryable());
        assert!(!IngestError::AuthenticationFailed("bad".into()).is_retryable());
        assert!(!IngestError::Persistence(PersistenceError("boom".into())).is_retryable());
    }

    #[test]
    fn test_redact_url_drops_query() {
        assert_eq!(
            redact_url("http://host/player_api.php?username=u&password=p"),
            "http://host/player_api.php"
        );
        assert_eq!(redact_url("http://host/list.m3u"), "http://host/list.m3u");
    }
}
