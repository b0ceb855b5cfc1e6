//! Client for the cloud recording REST API: listing and deletion.
//!
//! Every request goes through [`ZoomClient::send`], which fetches a bearer
//! token from the shared [`CredentialManager`] first.

pub mod error;
pub mod listing;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Response};
use url::Url;

pub use self::error::{ApiError, ListingError};
pub use self::types::{Meeting, RecordingFile, RecordingType};
use crate::auth::CredentialManager;

const USER_AGENT: &str = concat!("zoomdl-rs/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the API, auth and transfer layers.
///
/// Only the connect phase is bounded; media downloads can legitimately take
/// hours.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(30))
        .build()
}

/// Append path segments to `base`, tolerating a trailing slash on the base.
pub(crate) fn join_url(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        path.extend(segments);
    }
    url
}

pub struct ZoomClient {
    http: Client,
    api_base: Url,
    credentials: Arc<CredentialManager>,
    page_size: u32,
}

impl ZoomClient {
    pub fn new(
        http: Client,
        api_base: Url,
        credentials: Arc<CredentialManager>,
        page_size: u32,
    ) -> Self {
        Self {
            http,
            api_base,
            credentials,
            page_size,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        join_url(&self.api_base, segments)
    }

    /// Send an authorized request and require a 2xx answer.
    async fn send(&self, method: Method, url: Url) -> Result<Response, ApiError> {
        let token = self.credentials.token().await?;
        let response = self
            .http
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                method: method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Delete every cloud recording file of a meeting.
    pub async fn delete_recording(&self, meeting_id: i64) -> Result<(), ApiError> {
        let id = meeting_id.to_string();
        let url = self.endpoint(&["meetings", &id, "recordings"]);
        self.send(Method::DELETE, url).await?;
        tracing::info!(meeting_id, "Deleted cloud recording");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeApi;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_join_url_with_and_without_trailing_slash() {
        let a = Url::parse("https://api.zoom.us/v2").unwrap();
        let b = Url::parse("https://api.zoom.us/v2/").unwrap();
        assert_eq!(
            join_url(&a, &["users", "me", "recordings"]).as_str(),
            "https://api.zoom.us/v2/users/me/recordings"
        );
        assert_eq!(
            join_url(&b, &["users", "me", "recordings"]).as_str(),
            "https://api.zoom.us/v2/users/me/recordings"
        );
    }

    #[test]
    fn test_join_url_encodes_segments() {
        let base = Url::parse("https://api.zoom.us/v2").unwrap();
        let url = join_url(&base, &["meetings", "a/b", "recordings"]);
        assert_eq!(url.as_str(), "https://api.zoom.us/v2/meetings/a%2Fb/recordings");
    }

    #[tokio::test]
    async fn test_delete_recording_success() {
        let api = FakeApi::start().await;
        let client = api.zoom_client();
        client.delete_recording(42).await.unwrap();
        assert_eq!(api.deleted_meetings(), vec![42]);
    }

    #[tokio::test]
    async fn test_delete_recording_twice_reports_status() {
        let api = FakeApi::start().await;
        let client = api.zoom_client();
        client.delete_recording(7).await.unwrap();
        match client.delete_recording(7).await {
            Err(ApiError::Status { status, method, .. }) => {
                assert_eq!(status, 404);
                assert_eq!(method, "DELETE");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_recording_auth_failure() {
        let api = FakeApi::start().await;
        api.state.reject_token.store(true, Ordering::SeqCst);
        let client = api.zoom_client();
        assert!(matches!(
            client.delete_recording(1).await,
            Err(ApiError::Auth(_))
        ));
        assert!(api.deleted_meetings().is_empty());
    }
}
