use thiserror::Error;

use crate::auth::AuthError;
use crate::storage::StorageError;

/// Failure of one chunked file transfer.
///
/// Any of these fails the whole file; the destination is aborted so no
/// partial blob survives.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Probe of {url} returned HTTP {status}")]
    ProbeStatus { url: String, status: u16 },

    #[error("HTTP {status} fetching {range} of {url}")]
    ChunkStatus {
        url: String,
        range: String,
        status: u16,
    },

    #[error("Short chunk {range} of {url}: expected {expected} bytes, got {actual}")]
    ChunkLength {
        url: String,
        range: String,
        expected: u64,
        actual: u64,
    },

    #[error("HTTP error downloading {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub(crate) fn http(url: &str, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.to_string(),
            source,
        }
    }
}
