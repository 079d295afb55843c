//! Error types for newsdesk.
//!
//! Library crates use [`NewsdeskError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Variants line up with the pipeline's failure classes: configuration,
//! fetch (`Network`, `Http`, `Fetch`), validation, enrichment and publish.
//! Only configuration and storage errors are expected to abort a whole run;
//! the rest are caught at the item or source boundary and reported.

use std::path::PathBuf;

/// Top-level error type for all newsdesk operations.
#[derive(Debug, thiserror::Error)]
pub enum NewsdeskError {
    /// Missing credential, bad setting, or unknown adapter kind.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status from a remote endpoint.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// A source responded but its payload could not be used.
    #[error("fetch error: {message}")]
    Fetch { message: String },

    /// Structural or contract violation on a single item.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Classification call or response decoding failed for one article.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Publishing platform rejected or failed a mutation.
    #[error("publish error: {0}")]
    Publish(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A spawned task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NewsdeskError>;

impl NewsdeskError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a non-retriable fetch error.
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
