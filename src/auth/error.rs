use thiserror::Error;

/// Errors raised while obtaining a bearer token from the OAuth endpoint.
///
/// Any of these is fatal to a sweep: no API call can be made without a token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unable to authorize account {account_id} with client {client_id} (HTTP {status}): {body}")]
    Rejected {
        account_id: String,
        client_id: String,
        status: u16,
        body: String,
    },

    #[error("Token response is missing an access token")]
    EmptyToken,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
