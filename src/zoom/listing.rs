//! Month-window listing of cloud recordings.
//!
//! The API only answers date ranges of at most one month, so the catalog is
//! walked backwards from now in one-month windows down to a lower bound. Each
//! window is fetched page by page; windows run concurrently under a small
//! fixed ceiling because the listing endpoint is rate limited more tightly
//! than downloads are.

use std::collections::HashSet;

use chrono::{DateTime, Months, NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use reqwest::Method;

use super::error::{ApiError, ListingError};
use super::types::{ListRecordingsResponse, Meeting};
use super::ZoomClient;

/// Upper bound on concurrent listing requests, independent of the transfer
/// concurrency.
pub const API_CALL_CONCURRENCY_LIMIT: usize = 2;

/// One `[from, to]` listing request range (both ends inclusive, UTC dates).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Windows ending at `now`, `now - 1 month`, ... while the window end is not
/// before `since`. Newest first.
pub fn month_windows(now: DateTime<Utc>, since: DateTime<Utc>) -> Vec<MonthWindow> {
    let mut windows = Vec::new();
    let mut cursor = now;
    while cursor >= since {
        let Some(previous) = cursor.checked_sub_months(Months::new(1)) else {
            break;
        };
        windows.push(MonthWindow {
            from: previous.date_naive(),
            to: cursor.date_naive(),
        });
        cursor = previous;
    }
    windows
}

/// Midnight UTC on January 1st of `year`, the listing floor for an empty ledger.
pub fn floor_date(year: i32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Drop meetings whose `uuid` was already seen, keeping the first occurrence.
pub fn dedup_meetings(meetings: Vec<Meeting>) -> Vec<Meeting> {
    let mut seen = HashSet::with_capacity(meetings.len());
    meetings
        .into_iter()
        .filter(|m| seen.insert(m.uuid.clone()))
        .collect()
}

impl ZoomClient {
    /// List every meeting with cloud recordings between `since` (or January
    /// 1st of `floor_year` when there is no checkpoint) and now.
    ///
    /// All windows are awaited before merging. If any failed, the first
    /// failure (in window order) is returned together with the deduplicated
    /// meetings from the windows that succeeded.
    pub async fn list_recordings(
        &self,
        since: Option<DateTime<Utc>>,
        floor_year: i32,
        concurrency: usize,
    ) -> Result<Vec<Meeting>, ListingError> {
        let lower = since.unwrap_or_else(|| floor_date(floor_year));
        let windows = month_windows(Utc::now(), lower);
        tracing::debug!(
            since = %lower,
            windows = windows.len(),
            concurrency,
            "Listing recordings"
        );

        let results: Vec<(MonthWindow, Result<Vec<Meeting>, ApiError>)> = stream::iter(windows)
            .map(|window| async move { (window, self.list_window(window).await) })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut merged = Vec::new();
        let mut failure = None;
        for (window, result) in results {
            match result {
                Ok(meetings) => merged.extend(meetings),
                Err(e) => {
                    tracing::warn!(from = %window.from, to = %window.to, error = %e, "Listing window failed");
                    if failure.is_none() {
                        failure = Some((window, e));
                    }
                }
            }
        }

        let merged = dedup_meetings(merged);
        match failure {
            Some((window, source)) => Err(ListingError {
                from: window.from,
                to: window.to,
                partial: merged,
                source,
            }),
            None => Ok(merged),
        }
    }

    /// Fetch every page of one window.
    async fn list_window(&self, window: MonthWindow) -> Result<Vec<Meeting>, ApiError> {
        let mut meetings = Vec::new();
        let mut page_token = String::new();
        let page_size = self.page_size.to_string();
        let from = window.from.format("%Y-%m-%d").to_string();
        let to = window.to.format("%Y-%m-%d").to_string();

        loop {
            let mut url = self.endpoint(&["users", "me", "recordings"]);
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("page_size", &page_size)
                    .append_pair("from", &from)
                    .append_pair("to", &to);
                if !page_token.is_empty() {
                    query.append_pair("next_page_token", &page_token);
                }
            }

            let page: ListRecordingsResponse = self.send(Method::GET, url).await?.json().await?;
            tracing::debug!(
                from = %from,
                to = %to,
                meetings = page.meetings.len(),
                "Fetched listing page"
            );
            meetings.extend(page.meetings);

            if page.next_page_token.is_empty() {
                break;
            }
            page_token = page.next_page_token;
        }

        Ok(meetings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fake_file, fake_meeting, FakeApi};
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn meeting(uuid: &str, topic: &str) -> Meeting {
        Meeting {
            id: 1,
            uuid: uuid.into(),
            topic: topic.into(),
            start_time: None,
            recording_files: Vec::new(),
        }
    }

    #[test]
    fn test_month_windows_walk_back_to_since() {
        let now = Utc.with_ymd_and_hms(2022, 12, 15, 10, 0, 0).unwrap();
        let since = Utc.with_ymd_and_hms(2022, 10, 1, 0, 0, 0).unwrap();
        let windows = month_windows(now, since);
        assert_eq!(
            windows,
            vec![
                MonthWindow { from: date(2022, 11, 15), to: date(2022, 12, 15) },
                MonthWindow { from: date(2022, 10, 15), to: date(2022, 11, 15) },
                MonthWindow { from: date(2022, 9, 15), to: date(2022, 10, 15) },
            ]
        );
    }

    #[test]
    fn test_month_windows_since_equal_now_yields_one_window() {
        let now = Utc.with_ymd_and_hms(2023, 3, 31, 0, 0, 0).unwrap();
        let windows = month_windows(now, now);
        assert_eq!(
            windows,
            vec![MonthWindow { from: date(2023, 2, 28), to: date(2023, 3, 31) }]
        );
    }

    #[test]
    fn test_month_windows_since_in_future_is_empty() {
        let now = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
        let since = Utc.with_ymd_and_hms(2023, 4, 1, 0, 0, 0).unwrap();
        assert!(month_windows(now, since).is_empty());
    }

    #[test]
    fn test_month_windows_from_floor_year_cover_range() {
        let now = Utc.with_ymd_and_hms(2023, 1, 10, 0, 0, 0).unwrap();
        let windows = month_windows(now, floor_date(2022));
        assert_eq!(windows.len(), 13);
        assert_eq!(windows.last().unwrap().from, date(2021, 12, 10));
    }

    #[test]
    fn test_floor_date() {
        assert_eq!(
            floor_date(2018),
            Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let meetings = vec![
            meeting("a", "first"),
            meeting("b", "other"),
            meeting("a", "second"),
        ];
        let deduped = dedup_meetings(meetings);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].topic, "first");
        assert_eq!(deduped[1].uuid, "b");
    }

    #[tokio::test]
    async fn test_list_recordings_follows_pages() {
        let api = FakeApi::start().await;
        let start = Utc::now() - chrono::Duration::days(3);
        for i in 0..5 {
            api.add_meeting(fake_meeting(
                i,
                &format!("uuid-{i}"),
                &format!("meeting {i}"),
                start,
                vec![],
            ));
        }
        let client = api.zoom_client_with_page_size(2);

        let since = Utc::now() - chrono::Duration::days(10);
        let meetings = client.list_recordings(Some(since), 2018, 2).await.unwrap();

        assert_eq!(meetings.len(), 5);
        // 3 pages for the only window.
        assert_eq!(api.state.listing_requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_list_recordings_dedups_boundary_meeting() {
        let api = FakeApi::start().await;
        let boundary = Utc::now().checked_sub_months(Months::new(1)).unwrap();
        let boundary = boundary.date_naive().and_hms_opt(12, 0, 0).unwrap().and_utc();
        api.add_meeting(fake_meeting(
            1,
            "edge",
            "edge",
            boundary,
            vec![fake_file("f1", "gallery_view", "MP4", boundary)],
        ));

        let client = api.zoom_client();
        let since = Utc::now() - chrono::Duration::days(45);
        let meetings = client.list_recordings(Some(since), 2018, 2).await.unwrap();

        // The meeting sits on the shared edge of two windows.
        assert_eq!(api.state.listing_requests.load(Ordering::SeqCst), 2);
        assert_eq!(meetings.len(), 1);
        assert_eq!(meetings[0].uuid, "edge");
    }

    #[tokio::test]
    async fn test_list_recordings_respects_concurrency_bound() {
        let api = FakeApi::start().await;
        api.state.listing_delay_ms.store(20, Ordering::SeqCst);
        let client = api.zoom_client();

        let since = Utc::now() - chrono::Duration::days(365);
        client.list_recordings(Some(since), 2018, 2).await.unwrap();

        assert!(api.state.listing_requests.load(Ordering::SeqCst) >= 12);
        assert!(api.state.max_listing_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_list_recordings_failure_keeps_partial_results() {
        let api = FakeApi::start().await;
        let recent = Utc::now() - chrono::Duration::days(2);
        api.add_meeting(fake_meeting(1, "u1", "recent", recent, vec![]));
        api.state.fail_listing_after.store(1, Ordering::SeqCst);

        let client = api.zoom_client();
        let since = Utc::now() - chrono::Duration::days(70);
        let err = client
            .list_recordings(Some(since), 2018, 1)
            .await
            .unwrap_err();

        assert!(matches!(
            err.source,
            ApiError::Status { status: 500, .. }
        ));
        assert_eq!(err.partial.len(), 1);
        assert_eq!(err.partial[0].uuid, "u1");
        assert!(!err.is_auth());
    }

    #[tokio::test]
    async fn test_list_recordings_auth_failure() {
        let api = FakeApi::start().await;
        api.state.reject_token.store(true, Ordering::SeqCst);
        let client = api.zoom_client();
        let err = client
            .list_recordings(Some(Utc::now()), 2018, 2)
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert!(err.partial.is_empty());
    }
}
