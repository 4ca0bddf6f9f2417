//! Error types for store operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading the snapshot at startup failed.
    #[error("failed to load snapshot from {path}: {source}")]
    Load {
        /// Snapshot location.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot exists but could not be parsed.
    #[error("snapshot at {path} is corrupt: {source}")]
    Corrupt {
        /// Snapshot location.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot was written by an incompatible version of the store.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    /// Writing the snapshot failed. In-memory state is unaffected.
    #[error("failed to write snapshot to {path}: {source}")]
    Flush {
        /// Snapshot location.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Serializing in-memory state failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The initial load exceeded the configured timeout.
    #[error("snapshot load timed out after {0:?}")]
    LoadTimeout(Duration),

    /// An operation was invoked on a store whose startup failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
