//! Error types for folioscan.
//!
//! Library crates use [`FolioError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all folioscan operations.
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    /// Configuration loading or validation error (including a malformed
    /// pagination pattern).
    #[error("config error: {message}")]
    Config { message: String },

    /// The image folder could not be listed or holds no images.
    #[error("input unavailable: {message}")]
    InputUnavailable { message: String },

    /// The document structure file could not be read or decoded.
    #[error("document read failure: {message}")]
    DocumentRead { message: String },

    /// The document structure file could not be encoded or written.
    #[error("document write failure: {message}")]
    DocumentWrite { message: String },

    /// A structural type is unknown to the schema or not allowed where it
    /// was attached.
    #[error("schema violation: {message}")]
    SchemaViolation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Journal database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Data validation error (invalid format, missing fields, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FolioError>;

impl FolioError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an input-unavailable error.
    pub fn input_unavailable(msg: impl Into<String>) -> Self {
        Self::InputUnavailable {
            message: msg.into(),
        }
    }

    /// Create a document read error.
    pub fn document_read(msg: impl Into<String>) -> Self {
        Self::DocumentRead {
            message: msg.into(),
        }
    }

    /// Create a document write error.
    pub fn document_write(msg: impl Into<String>) -> Self {
        Self::DocumentWrite {
            message: msg.into(),
        }
    }

    /// Create a schema violation.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaViolation {
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
}
