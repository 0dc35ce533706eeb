//! Error types for staged-fs.
//!
//! All library operations return `Result<T>` which aliases `Result<T, StageError>`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from staging, commit and rollback.
#[derive(Debug, Error)]
pub enum StageError {
    /// Target must exist for the requested mode but is absent.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Exclusive creation hit an existing path.
    #[error("Path already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Mode string could not be parsed.
    #[error("Invalid mode '{0}': {1}")]
    InvalidMode(String, String),

    /// Terminal operation attempted outside `Pending`, or with the
    /// staging handle still open.
    #[error("Invalid transaction state: {0}")]
    InvalidState(String),

    /// Read or write direction not granted by the open mode.
    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    /// Directory commit failed after the old tree was removed. The staged
    /// tree was kept on disk at `staging`.
    #[error("Commit of {target} interrupted, staged contents kept at {staging}")]
    CommitInterrupted {
        target: PathBuf,
        staging: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File system operation failed.
    #[error(transparent)]
    Io(io::Error),
}

impl StageError {
    /// Maps the error onto the closest `io::ErrorKind`.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            StageError::NotFound(_) => io::ErrorKind::NotFound,
            StageError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            StageError::InvalidMode(..) => io::ErrorKind::InvalidInput,
            StageError::InvalidState(_) => io::ErrorKind::Other,
            StageError::UnsupportedOperation(_) => io::ErrorKind::Unsupported,
            StageError::CommitInterrupted { source, .. } => source.kind(),
            StageError::Io(e) => e.kind(),
        }
    }
}

impl From<io::Error> for StageError {
    fn from(e: io::Error) -> Self {
        // Capability refusals surface from `Read`/`Write` impls as io errors.
        if e.kind() == io::ErrorKind::Unsupported {
            StageError::UnsupportedOperation(e.to_string())
        } else {
            StageError::Io(e)
        }
    }
}

impl From<StageError> for io::Error {
    fn from(e: StageError) -> Self {
        match e {
            StageError::Io(inner) => inner,
            other => io::Error::new(other.kind(), other),
        }
    }
}

/// Result type alias for staged-fs operations.
pub type Result<T> = std::result::Result<T, StageError>;
