//! Error types for feedkit
//!
//! All modules use `FeedResult<T>` as their return type.
//!
//! `FeedError` is `Clone`: memoizing caches capture a failure once and hand
//! the same error back on every later access, so sources that are not
//! themselves cloneable (IO errors) are held behind an `Arc`.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for feedkit operations
pub type FeedResult<T> = Result<T, FeedError>;

/// All errors that can occur in feedkit
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    // Caller errors
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Cannot access a disposed object: {0}")]
    Disposed(&'static str),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("The operation was cancelled")]
    Cancelled,

    // Transport and protocol errors
    #[error("Request to {uri} failed: {reason}")]
    Transport {
        uri: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Unable to load the service index for source {uri}: {source}")]
    Protocol {
        uri: String,
        #[source]
        source: Arc<FeedError>,
    },

    #[error("{0}")]
    InvalidServiceIndex(String),

    #[error("Invalid feed response from {uri}: {reason}")]
    InvalidFeed { uri: String, reason: String },

    #[error("The feed returned the same next link twice: {uri}")]
    CyclicLink { uri: String },

    // Local integrity errors
    #[error("Invalid package at {path}: {reason}")]
    PackagingFormat { path: PathBuf, reason: String },

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Invalid version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl FeedError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create an invalid argument error
    pub fn argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Create a transport error for a failed request
    pub fn transport(uri: impl Into<String>, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Transport {
            uri: uri.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Wrap a failure to load a source's service index
    pub fn protocol(uri: impl Into<String>, source: FeedError) -> Self {
        Self::Protocol {
            uri: uri.into(),
            source: Arc::new(source),
        }
    }

    /// Check if error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if a failed request is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { status: None, .. } => true,
            Self::Transport {
                status: Some(code), ..
            } => *code >= 500 || *code == 408,
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Transport {
                status: Some(401 | 403),
                ..
            } => Some("The source requires credentials, which feedkit does not manage"),
            Self::CyclicLink { .. } => Some("The feed server returned a broken page link; retry later"),
            Self::ConfigInvalid { .. } => Some("Run: feedkit config path, then fix the file"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FeedError::CyclicLink {
            uri: "https://example.org/Packages?$skip=100".to_string(),
        };
        assert!(err.to_string().contains("$skip=100"));
    }

    #[test]
    fn protocol_error_keeps_inner_cause() {
        let inner = FeedError::InvalidServiceIndex("The source does not have the 'version' property.".into());
        let err = FeedError::protocol("https://example.org/index.json", inner);

        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("'version' property"));
        assert!(err.to_string().contains("https://example.org/index.json"));
    }

    #[test]
    fn error_retryable() {
        assert!(FeedError::transport("u", Some(503), "unavailable").is_retryable());
        assert!(FeedError::transport("u", None, "connection reset").is_retryable());
        assert!(!FeedError::transport("u", Some(404), "not found").is_retryable());
        assert!(!FeedError::Cancelled.is_retryable());
    }

    #[test]
    fn cloned_io_error_shares_source() {
        let err = FeedError::io("reading hash", std::io::Error::other("boom"));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }

    #[test]
    fn error_hint() {
        let err = FeedError::transport("u", Some(401), "unauthorized");
        assert!(err.hint().is_some());
        assert_eq!(FeedError::Cancelled.hint(), None);
    }
}
