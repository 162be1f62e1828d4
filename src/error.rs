//! Error types for the snapvault library
//!
//! Every fallible operation returns [`Result<T>`]. Operations that walk many
//! independent files (restore, export, search) do not fail on a single bad
//! file; those per-file problems are reported as
//! [`FileFailure`](crate::types::FileFailure) values instead.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the snapvault library
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for all snapvault operations
#[derive(Debug, Error)]
pub enum VaultError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors raised by the embedded metadata database
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Errors raised while walking the working tree
    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// Snapshot reference did not resolve to an id or a tag
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// A resolved snapshot does not contain the requested path
    #[error("File '{path}' not found in snapshot '{snapshot}'")]
    FileNotInSnapshot {
        /// Reference the caller used
        snapshot: String,
        /// Requested project-relative path
        path: String,
    },

    /// Blob for a known hash is missing from the blob store
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Hash is not a lowercase hex digest usable as a blob key
    #[error("Invalid content hash: {0:?}")]
    InvalidHash(String),

    /// The same path appears twice in one snapshot file list
    #[error("Duplicate path in file list: {0}")]
    DuplicatePath(String),

    /// A file listed for a new snapshot could not be read from the project
    #[error("Cannot read source file {path:?}: {source}")]
    SourceUnreadable {
        /// Absolute path that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Compression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Pattern parsing error
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Search query rejected before any work was done
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Storage is not initialized
    #[error("Storage not initialized at path: {0:?}")]
    StorageNotInitialized(PathBuf),

    /// Storage already exists
    #[error("Storage already exists at path: {0:?}")]
    StorageAlreadyExists(PathBuf),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Create a storage error with a custom message
    pub fn storage(msg: impl Into<String>) -> Self {
        VaultError::Storage(msg.into())
    }

    /// Create a compression error with a custom message
    pub fn compression(msg: impl Into<String>) -> Self {
        VaultError::Compression(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        VaultError::Internal(msg.into())
    }

    /// Check if this error means "the thing asked for does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VaultError::SnapshotNotFound(_)
                | VaultError::FileNotInSnapshot { .. }
                | VaultError::ObjectNotFound(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            VaultError::SnapshotNotFound(reference) => {
                format!(
                    "Snapshot '{}' not found. Use 'snapvault list --all' to see available snapshots.",
                    reference
                )
            }
            VaultError::StorageNotInitialized(path) => {
                format!(
                    "No snapshot storage at {:?}. Create a snapshot first with 'snapvault create'.",
                    path
                )
            }
            VaultError::SourceUnreadable { path, .. } => {
                format!(
                    "Could not read {:?} while snapshotting. The file may have been removed mid-scan; try again.",
                    path
                )
            }
            _ => self.to_string(),
        }
    }
}
