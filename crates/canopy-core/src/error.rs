//! Error types for tree building.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a tree build.
///
/// Every variant is fatal: a build either completes or fails as a whole.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Root path does not exist.
    #[error("Path not found: {path}")]
    PathNotFound { path: PathBuf },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Listing a directory failed.
    #[error("Failed to list directory {path}: {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A node failed to classify itself.
    #[error("Failed to classify {path}: {message}")]
    Classification {
        path: PathBuf,
        kind: std::io::ErrorKind,
        message: String,
    },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Children can only be attached to branch nodes.
    #[error("Not a branch node: {path}")]
    NotABranch { path: String },

    /// The node belongs to a finished tree and no longer accepts children.
    #[error("Node is sealed: {path}")]
    Sealed { path: String },

    /// Two entries mapped onto the same logical path.
    #[error("Duplicate logical path {path} for {realpath}")]
    DuplicatePath { path: String, realpath: PathBuf },

    /// The background build task panicked or was dropped.
    #[error("Build task failed: {message}")]
    TaskFailed { message: String },
}

impl TreeError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::PathNotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create a classification error from a failed stat.
    pub fn classification(
        path: impl Into<PathBuf>,
        kind: std::io::ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Classification {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Result alias for tree operations.
pub type Result<T, E = TreeError> = std::result::Result<T, E>;
