//! Error types for satchel operations
//!
//! Every fallible operation returns a `SatchelError` carrying enough context
//! (path, io kind, reason) to diagnose the failure without a debugger.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for satchel operations
pub type SatchelResult<T> = Result<T, SatchelError>;

/// Satchel error types with detailed context
#[derive(Debug, Error)]
pub enum SatchelError {
    /// The caller passed a key the store cannot accept
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// The caller passed a document the store cannot accept
    #[error("invalid document: {reason}")]
    InvalidDocument {
        /// Why the document was rejected
        reason: String,
    },

    /// I/O operation failed
    #[error("I/O error: {message} ({kind})")]
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: io::ErrorKind,
        /// Human-readable description, including the path when known
        message: String,
    },

    /// An artifact's bytes no longer decode to a document
    #[error("corrupt artifact {}: {reason}", .path.display())]
    CorruptArtifact {
        /// Path to the undecodable artifact
        path: PathBuf,
        /// What the decoder objected to
        reason: String,
    },

    /// Rejected configuration
    #[error("configuration error: {reason}")]
    Config {
        /// Which parameter was out of range
        reason: String,
    },
}

impl SatchelError {
    /// Build an `Io` error from a path, a short description of the attempted
    /// operation, and the underlying error.
    pub(crate) fn io(path: &std::path::Path, what: &str, err: io::Error) -> Self {
        SatchelError::Io {
            kind: err.kind(),
            message: format!("{} {}: {}", what, path.display(), err),
            path: Some(path.to_path_buf()),
        }
    }
}

/// Convert std::io::Error when no path context is available
impl From<io::Error> for SatchelError {
    fn from(err: io::Error) -> Self {
        SatchelError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
