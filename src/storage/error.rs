use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unrecognised destination scheme '{scheme}' in '{uri}'")]
    UnsupportedScheme { scheme: String, uri: String },

    #[error("Invalid destination '{uri}': {reason}")]
    InvalidDestination { uri: String, reason: String },

    #[error("No storage destinations configured")]
    NoDestinations,

    #[error("Refusing storage path '{0}': must be relative and must not leave the base directory")]
    InvalidPath(String),

    #[error("'{0}' does not exist")]
    NotFound(String),

    #[error("I/O error on {}: {source}", .target.display())]
    Io {
        target: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),

    #[error("SFTP error: {0}")]
    Sftp(#[from] ssh2::Error),

    #[error("Host key for {host} does not match the pinned fingerprint (got SHA256:{actual})")]
    HostKeyMismatch { host: String, actual: String },

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{} storage operations failed: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<StorageError>),
}

impl StorageError {
    pub(crate) fn io(target: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            target: target.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

fn join_errors(errors: &[StorageError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fold per-backend failures into a single result. One failure is returned
/// as is; several become [`StorageError::Multiple`].
pub(crate) fn combine(mut errors: Vec<StorageError>) -> Result<(), StorageError> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(StorageError::Multiple(errors)),
    }
}
