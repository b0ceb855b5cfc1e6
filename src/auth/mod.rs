//! Server-to-server OAuth ("account credentials") token management.
//!
//! Tokens are obtained lazily: every outbound call asks
//! [`CredentialManager::token`] first, and a new token is only requested once
//! the cached one has expired. The cache sits behind an async mutex that is
//! held across the refresh, so callers racing past expiry trigger a single
//! token request between them.

pub mod error;
pub mod responses;

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use url::Url;

pub use self::error::AuthError;
use self::responses::TokenResponse;
use crate::zoom::join_url;

/// A bearer token and the instant it stops being valid.
#[derive(Clone)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    /// A credential is invalid from `expires_at` onwards.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Account id and app client credentials used for the token exchange.
#[derive(Clone)]
pub struct AccountCredentials {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_id", &self.account_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Owns the cached bearer token. Shared by reference (`Arc`) with every
/// component that talks to the remote API.
pub struct CredentialManager {
    client: Client,
    token_url: Url,
    credentials: AccountCredentials,
    cached: Mutex<Option<Credential>>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("token_url", &self.token_url.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    /// `auth_endpoint` is the OAuth host root; the token path is appended.
    pub fn new(client: Client, auth_endpoint: &Url, credentials: AccountCredentials) -> Self {
        Self {
            client,
            token_url: join_url(auth_endpoint, &["oauth", "token"]),
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Return a valid token, refreshing it first if it is missing or expired.
    pub async fn token(&self) -> Result<Credential, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(credential) = cached.as_ref() {
            if !credential.is_expired() {
                return Ok(credential.clone());
            }
            tracing::debug!(expired_at = %credential.expires_at, "Access token expired");
        }

        let fresh = self.request_token().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    async fn request_token(&self) -> Result<Credential, AuthError> {
        let requested_at = Utc::now();
        let response = self
            .client
            .post(self.token_url.clone())
            .header(
                AUTHORIZATION,
                basic_auth_header(&self.credentials.client_id, &self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.credentials.account_id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                account_id: self.credentials.account_id.clone(),
                client_id: self.credentials.client_id.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = serde_json::from_slice(&response.bytes().await?)?;
        if body.access_token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        tracing::debug!(
            token_type = %body.token_type,
            expires_in = body.expires_in,
            "Obtained access token"
        );

        Ok(Credential {
            access_token: body.access_token,
            expires_at: expiry_after(requested_at, body.expires_in),
        })
    }
}

/// `start + expires_in` seconds, saturating at the latest representable
/// instant for lifetimes chrono cannot hold.
fn expiry_after(start: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
    i64::try_from(expires_in)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| start.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `Basic base64(client_id:client_secret)`.
pub(crate) fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{client_id}:{client_secret}"));
    format!("Basic {encoded}")
}
