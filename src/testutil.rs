//! In-process fake of the recording API, OAuth endpoint and file host.
//!
//! Every knob is a field of [`FakeState`] so tests can flip behavior while the
//! server is running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Form, Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use url::Url;

use crate::auth::{basic_auth_header, AccountCredentials, CredentialManager};
use crate::download::TransferClient;
use crate::zoom::ZoomClient;

const DEFAULT_CONTENT_LEN: usize = 300;

#[derive(Debug, Clone, Serialize)]
pub struct FakeFile {
    pub id: String,
    pub recording_type: String,
    pub recording_start: DateTime<Utc>,
    pub file_extension: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FakeMeeting {
    pub id: i64,
    pub uuid: String,
    pub topic: String,
    pub start_time: DateTime<Utc>,
    pub recording_files: Vec<FakeFile>,
}

pub fn fake_meeting(
    id: i64,
    uuid: &str,
    topic: &str,
    start_time: DateTime<Utc>,
    recording_files: Vec<FakeFile>,
) -> FakeMeeting {
    FakeMeeting {
        id,
        uuid: uuid.into(),
        topic: topic.into(),
        start_time,
        recording_files,
    }
}

/// A file with an empty download URL; [`FakeApi::add_meeting`] points it at
/// the fake file host.
pub fn fake_file(id: &str, kind: &str, ext: &str, start: DateTime<Utc>) -> FakeFile {
    FakeFile {
        id: id.into(),
        recording_type: kind.into(),
        recording_start: start,
        file_extension: ext.into(),
        download_url: String::new(),
    }
}

/// Deterministic non-repeating-looking content.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub struct FakeState {
    pub token_requests: AtomicUsize,
    pub token_ttl_secs: AtomicU64,
    pub reject_token: AtomicBool,
    token_counter: AtomicUsize,

    pub listing_requests: AtomicUsize,
    pub listing_delay_ms: AtomicU64,
    listing_in_flight: AtomicUsize,
    pub max_listing_in_flight: AtomicUsize,
    /// The first N listing requests succeed, the rest answer 500.
    pub fail_listing_after: AtomicUsize,

    pub ranges_enabled: AtomicBool,
    /// Answer range requests with the whole body.
    pub ignore_range: AtomicBool,
    /// Later chunks answer sooner.
    pub reverse_delay: AtomicBool,
    pub file_delay_ms: AtomicU64,
    pub file_heads: AtomicUsize,
    pub file_gets: AtomicUsize,
    file_in_flight: AtomicUsize,
    pub max_file_in_flight: AtomicUsize,
    fail_chunk: Mutex<Option<(String, u64)>>,

    catalog: Mutex<Vec<FakeMeeting>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<i64>>,
    account: AccountCredentials,
}

impl FakeState {
    fn new(account: AccountCredentials) -> Self {
        Self {
            token_requests: AtomicUsize::new(0),
            token_ttl_secs: AtomicU64::new(3600),
            reject_token: AtomicBool::new(false),
            token_counter: AtomicUsize::new(0),
            listing_requests: AtomicUsize::new(0),
            listing_delay_ms: AtomicU64::new(0),
            listing_in_flight: AtomicUsize::new(0),
            max_listing_in_flight: AtomicUsize::new(0),
            fail_listing_after: AtomicUsize::new(usize::MAX),
            ranges_enabled: AtomicBool::new(true),
            ignore_range: AtomicBool::new(false),
            reverse_delay: AtomicBool::new(false),
            file_delay_ms: AtomicU64::new(0),
            file_heads: AtomicUsize::new(0),
            file_gets: AtomicUsize::new(0),
            file_in_flight: AtomicUsize::new(0),
            max_file_in_flight: AtomicUsize::new(0),
            fail_chunk: Mutex::new(None),
            catalog: Mutex::new(Vec::new()),
            contents: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            account,
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("Bearer token-"))
    }
}

/// Counts a request as in flight until dropped and tracks the peak.
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeApi {
    pub state: Arc<FakeState>,
    base_url: String,
}

impl FakeApi {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::new(Self::account()));
        let app = Router::new()
            .route("/oauth/token", post(token))
            .route("/v2/users/me/recordings", get(list_recordings))
            .route("/v2/meetings/:id/recordings", delete(delete_recordings))
            .route("/files/:id", get(file_get).head(file_head))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            base_url: format!("http://{addr}/"),
        }
    }

    pub fn account() -> AccountCredentials {
        AccountCredentials {
            account_id: "acct-1".into(),
            client_id: "client-1".into(),
            client_secret: "secret-1".into(),
        }
    }

    /// Server root, with a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential_manager(&self) -> CredentialManager {
        let base = Url::parse(&self.base_url).unwrap();
        CredentialManager::new(reqwest::Client::new(), &base, Self::account())
    }

    pub fn zoom_client(&self) -> ZoomClient {
        self.zoom_client_with_page_size(300)
    }

    pub fn zoom_client_with_page_size(&self, page_size: u32) -> ZoomClient {
        let api_base = Url::parse(&format!("{}v2", self.base_url)).unwrap();
        ZoomClient::new(
            reqwest::Client::new(),
            api_base,
            Arc::new(self.credential_manager()),
            page_size,
        )
    }

    pub fn transfer_client(&self) -> TransferClient {
        TransferClient::new(reqwest::Client::new(), Arc::new(self.credential_manager()))
    }

    /// Add a meeting to the catalog. Files without a download URL are served
    /// by the fake file host with patterned content.
    pub fn add_meeting(&self, mut meeting: FakeMeeting) {
        for file in &mut meeting.recording_files {
            if file.download_url.is_empty() {
                file.download_url = format!("{}files/{}", self.base_url, file.id);
                self.state
                    .contents
                    .lock()
                    .unwrap()
                    .entry(file.id.clone())
                    .or_insert_with(|| patterned_bytes(DEFAULT_CONTENT_LEN));
            }
        }
        self.state.catalog.lock().unwrap().push(meeting);
    }

    /// Serve `bytes` under `files/{id}` and return its URL.
    pub fn add_content(&self, id: &str, bytes: Vec<u8>) -> String {
        self.state.contents.lock().unwrap().insert(id.into(), bytes);
        format!("{}files/{}", self.base_url, id)
    }

    pub fn content(&self, id: &str) -> Vec<u8> {
        self.state
            .contents
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Answer 500 to the range request of `id` starting at `start`.
    pub fn fail_chunk(&self, id: &str, start: u64) {
        *self.state.fail_chunk.lock().unwrap() = Some((id.into(), start));
    }

    pub fn mark_deleted(&self, meeting_id: i64) {
        self.state.deleted.lock().unwrap().push(meeting_id);
    }

    pub fn deleted_meetings(&self) -> Vec<i64> {
        self.state.deleted.lock().unwrap().clone()
    }
}

async fn token(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let expected = basic_auth_header(&state.account.client_id, &state.account.client_secret);
    let basic_ok = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    let form_ok = form.get("grant_type").map(String::as_str) == Some("account_credentials")
        && form.get("account_id") == Some(&state.account.account_id);

    if state.reject_token.load(Ordering::SeqCst) || !basic_ok || !form_ok {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "reason": "Invalid client_id or client_secret",
                "error": "invalid_client"
            })),
        )
            .into_response();
    }

    let n = state.token_counter.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({
        "access_token": format!("token-{n}"),
        "token_type": "bearer",
        "expires_in": state.token_ttl_secs.load(Ordering::SeqCst),
        "scope": "recording:read:admin"
    }))
    .into_response()
}

async fn list_recordings(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let n = state.listing_requests.fetch_add(1, Ordering::SeqCst);
    let _guard = InFlight::enter(&state.listing_in_flight, &state.max_listing_in_flight);

    let delay = state.listing_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if n >= state.fail_listing_after.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "listing unavailable").into_response();
    }

    let parse_date = |key: &str| {
        query
            .get(key)
            .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
    };
    let (Some(from), Some(to)) = (parse_date("from"), parse_date("to")) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let page_size: usize = query
        .get("page_size")
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    let offset: usize = query
        .get("next_page_token")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let matching: Vec<FakeMeeting> = state
        .catalog
        .lock()
        .unwrap()
        .iter()
        .filter(|m| {
            let day = m.start_time.date_naive();
            from <= day && day <= to
        })
        .cloned()
        .collect();
    let page: Vec<&FakeMeeting> = matching.iter().skip(offset).take(page_size).collect();
    let next = offset + page.len();
    let next_page_token = if next < matching.len() {
        next.to_string()
    } else {
        String::new()
    };

    Json(serde_json::json!({
        "from": from,
        "to": to,
        "page_size": page_size,
        "total_records": matching.len(),
        "next_page_token": next_page_token,
        "meetings": page,
    }))
    .into_response()
}

async fn delete_recordings(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut deleted = state.deleted.lock().unwrap();
    if deleted.contains(&id) {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "code": 3301, "message": "This recording does not exist." })),
        )
            .into_response();
    }
    deleted.push(id);
    StatusCode::NO_CONTENT.into_response()
}

async fn file_head(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.file_heads.fetch_add(1, Ordering::SeqCst);
    let Some(len) = state.contents.lock().unwrap().get(&id).map(Vec::len) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, len);
    if state.ranges_enabled.load(Ordering::SeqCst) {
        response = response.header(header::ACCEPT_RANGES, "bytes");
    }
    response.body(Body::empty()).unwrap()
}

/// `bytes=a-b` with an inclusive end, clamped to the content.
fn parse_range(value: &str, len: usize) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = end.trim().parse().ok()?;
    let end = end.min(len.checked_sub(1)?);
    (start <= end).then_some((start, end))
}

async fn file_get(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.file_gets.fetch_add(1, Ordering::SeqCst);
    let _guard = InFlight::enter(&state.file_in_flight, &state.max_file_in_flight);

    let Some(content) = state.contents.lock().unwrap().get(&id).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let requested = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .filter(|_| state.ranges_enabled.load(Ordering::SeqCst))
        .and_then(|v| parse_range(v, content.len()));
    let start = requested.map_or(0, |(start, _)| start);

    let mut delay = state.file_delay_ms.load(Ordering::SeqCst);
    if state.reverse_delay.load(Ordering::SeqCst) {
        delay += ((content.len() - start) / 16) as u64;
    }
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let failing = state.fail_chunk.lock().unwrap().clone();
    if failing.is_some_and(|(fail_id, fail_start)| fail_id == id && fail_start == start as u64) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "chunk unavailable").into_response();
    }

    match requested {
        Some((start, end)) if !state.ignore_range.load(Ordering::SeqCst) => Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(
                header::CONTENT_RANGE,
                format!("bytes {start}-{end}/{}", content.len()),
            )
            .body(Body::from(content[start..=end].to_vec()))
            .unwrap(),
        _ => Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(content))
            .unwrap(),
    }
}
