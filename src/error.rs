//! Error types for the index and the RPC boundary.
//!
//! Every variant carries a stable machine-readable kind string that crosses
//! the wire unchanged, so clients can match on `kind` without parsing
//! messages.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Server has not finished its initial scan. Retriable.
    #[error("index not ready, retry in {retry_after_ms}ms")]
    NotReady { retry_after_ms: u64 },

    #[error("empty search pattern")]
    EmptyPattern,

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{path}: {size} bytes exceeds limit of {limit}")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    /// Extension with no extractor behind a symbol-level operation.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Extraction produced partial results; the partial data was kept.
    #[error("partial extraction: {0}")]
    ExtractionPartial(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("file deleted: {0}")]
    FileDeleted(PathBuf),

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("id overflow: {0}")]
    Overflow(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("server version mismatch: server {server}, client {client}")]
    ServerVersionMismatch { server: String, client: String },

    /// A writer panicked while holding an index lock. Fatal to the server.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IndexError {
    /// Stable wire kind for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotReady { .. } => "NotReady",
            Self::EmptyPattern => "EmptyPattern",
            Self::InvalidPattern(_) => "InvalidPattern",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::FileTooLarge { .. } => "FileTooLarge",
            Self::Unsupported(_) => "Unsupported",
            Self::ExtractionPartial(_) => "ExtractionPartial",
            Self::ExtractionFailed(_) => "ExtractionFailed",
            Self::SymbolNotFound(_) => "SymbolNotFound",
            Self::FileDeleted(_) => "FileDeleted",
            Self::InvalidId(_) => "InvalidId",
            Self::Overflow(_) => "Overflow",
            Self::Cancelled => "Cancelled",
            Self::Timeout(_) => "Timeout",
            Self::ServerUnavailable(_) => "ServerUnavailable",
            Self::ServerVersionMismatch { .. } => "ServerVersionMismatch",
            Self::LockPoisoned(_) => "LockPoisoned",
            Self::Internal(_) => "Internal",
        }
    }

    /// Whether the client may retry without changing the request.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NotReady { .. } | Self::Timeout(_))
    }

    /// Fatal errors take the server process down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LockPoisoned(_) | Self::Internal(_))
    }

    /// Rebuild an error from its wire form.
    pub fn from_wire(kind: &str, message: String) -> Self {
        match kind {
            "NotReady" => Self::NotReady {
                retry_after_ms: 500,
            },
            "EmptyPattern" => Self::EmptyPattern,
            "InvalidPattern" => Self::InvalidPattern(message),
            "InvalidConfig" => Self::InvalidConfig(message),
            "Unsupported" => Self::Unsupported(message),
            "ExtractionPartial" => Self::ExtractionPartial(message),
            "ExtractionFailed" => Self::ExtractionFailed(message),
            "SymbolNotFound" => Self::SymbolNotFound(message),
            "FileDeleted" => Self::FileDeleted(PathBuf::from(message)),
            "InvalidId" => Self::InvalidId(message),
            "Overflow" => Self::Overflow(message),
            "Cancelled" => Self::Cancelled,
            "ServerUnavailable" => Self::ServerUnavailable(message),
            "LockPoisoned" => Self::LockPoisoned(message),
            _ => Self::Internal(message),
        }
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("codec: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(IndexError::EmptyPattern.kind(), "EmptyPattern");
        assert_eq!(
            IndexError::InvalidPattern("(".into()).kind(),
            "InvalidPattern"
        );
        assert_eq!(IndexError::Cancelled.kind(), "Cancelled");
    }

    #[test]
    fn retriable_and_fatal() {
        assert!(
            IndexError::NotReady {
                retry_after_ms: 100
            }
            .is_retriable()
        );
        assert!(IndexError::LockPoisoned("trigram".into()).is_fatal());
        assert!(!IndexError::EmptyPattern.is_fatal());
    }

    #[test]
    fn wire_roundtrip_preserves_kind() {
        let e = IndexError::SymbolNotFound("Foo".into());
        let back = IndexError::from_wire(e.kind(), "Foo".into());
        assert_eq!(back.kind(), "SymbolNotFound");
    }
}
