use thiserror::Error;

use super::SweepStats;
use crate::auth::AuthError;
use crate::download::TransferError;
use crate::ledger::LedgerError;
use crate::zoom::{ApiError, ListingError};

/// One thing that went wrong during a sweep.
///
/// Authorization and listing failures end the sweep early; the others are
/// collected while the sweep carries on with the next file or meeting.
#[derive(Debug, Error)]
pub enum SyncFailure {
    #[error("Authorization failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Listing(#[from] ListingError),

    #[error("Transfer of '{path}' failed: {source}")]
    Transfer {
        path: String,
        #[source]
        source: TransferError,
    },

    #[error("Deleting recordings of meeting {meeting_id} ('{topic}') failed: {source}")]
    Deletion {
        meeting_id: i64,
        topic: String,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Every failure of one sweep, joined.
#[derive(Debug, Error)]
#[error("Sweep finished with {} error(s): {}", .failures.len(), join_failures(.failures))]
pub struct SweepError {
    pub stats: SweepStats,
    pub failures: Vec<SyncFailure>,
}

fn join_failures(failures: &[SyncFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
