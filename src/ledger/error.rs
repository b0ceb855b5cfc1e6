use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to persist ledger: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}
