use chrono::NaiveDate;
use thiserror::Error;

use super::types::Meeting;
use crate::auth::AuthError;

/// Failure of a single call against the recordings API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// A listing sweep aborted because one month window failed.
///
/// Meetings gathered by the windows that did finish are kept in `partial`
/// (already deduplicated) so the caller can report how far it got.
#[derive(Debug, Error)]
#[error("Listing recordings for {from}..{to} failed ({} meetings gathered before the failure): {source}", .partial.len())]
pub struct ListingError {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub partial: Vec<Meeting>,
    #[source]
    pub source: ApiError,
}

impl ListingError {
    /// True when the window failed because no token could be obtained.
    pub fn is_auth(&self) -> bool {
        matches!(self.source, ApiError::Auth(_))
    }
}
