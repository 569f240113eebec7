//! Error types for nbforge.
//!
//! Library crates use [`NbforgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all nbforge operations.
#[derive(Debug, thiserror::Error)]
pub enum NbforgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A build command exited with a non-zero status.
    #[error("build command failed with exit code {code}: {command}")]
    Build { code: i32, command: String },

    /// Template rendering error (unknown template or missing variable).
    #[error("render error: {message}")]
    Render { message: String },

    /// Notebook metadata extraction error (malformed or empty first cells).
    #[error("metadata extraction error: {message}")]
    MetadataExtraction { message: String },

    /// Network/HTTP error while talking to the CI provider.
    #[error("network error: {0}")]
    Network(String),

    /// JSON or notebook parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad repository layout, unexpected file, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NbforgeError>;

impl NbforgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a build error from a command string and its exit code.
    pub fn build(code: i32, command: impl Into<String>) -> Self {
        Self::Build {
            code,
            command: command.into(),
        }
    }

    /// Create a render error from any displayable message.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    /// Create a metadata extraction error from any displayable message.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::MetadataExtraction {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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
