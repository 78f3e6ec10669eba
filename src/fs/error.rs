use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by working-tree operations.
///
/// `Validation` carries a message meant to be shown to the user as-is.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("{0}")]
    Validation(String),

    #[error("Path must be absolute: '{path}'")]
    InvalidPath { path: String },

    #[error("No such file or directory: '{path}'")]
    NotFound { path: String },

    #[error("Not a directory: '{path}'")]
    NotADirectory { path: String },

    #[error("Is a directory: '{path}'")]
    IsADirectory { path: String },

    #[error("Directory not empty: '{path}'")]
    DirectoryNotEmpty { path: String },

    #[error("Already exists: '{path}'")]
    AlreadyExists { path: String },

    #[error("Cannot move '{from}' into itself")]
    InvalidMove { from: String },

    #[error("Too many levels of symbolic links: '{path}'")]
    SymlinkLoop { path: String },

    #[error("A native directory is already mounted")]
    AlreadyMounted,

    #[error("No native directory is mounted")]
    NotMounted,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by backing stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Backing store I/O failed at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode snapshot '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to lock '{path}': {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backing store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
