use serde::Deserialize;

/// Response from the `oauth/token` client-credentials exchange.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime of the token in seconds.
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
}
