//! Sweep orchestration: list, filter, transfer, delete, persist.
//!
//! A sweep loads the ledger, makes sure a token can be obtained, lists every
//! meeting recorded since the ledger checkpoint, then walks the meetings one
//! at a time. Per-file and per-meeting failures are collected and the sweep
//! moves on; only authorization and listing failures end it early. The
//! ledger is written back at the end no matter how the sweep went.

pub mod error;
pub mod filter;

use std::collections::HashSet;
use std::io::IsTerminal;
use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

pub use self::error::{SweepError, SyncFailure};
use self::filter::{plan_meeting, MeetingPlan, PlannedTransfer};
use crate::download::{TransferClient, TransferOptions};
use crate::ledger::{Ledger, TransferRecord};
use crate::storage::Storage;
use crate::zoom::{RecordingType, ZoomClient};

/// What a sweep transfers and how.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    pub allowed_types: HashSet<RecordingType>,
    pub ignored_titles: HashSet<String>,
    pub delete_after: bool,
    /// Listing floor when the ledger is empty.
    pub start_year: i32,
    pub listing_concurrency: usize,
    pub transfer: TransferOptions,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

/// Counters for one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub meetings: usize,
    pub transferred: usize,
    pub skipped: usize,
    pub deleted: usize,
}

impl std::fmt::Display for SweepStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} meetings, {} transferred, {} skipped, {} deleted",
            self.meetings, self.transferred, self.skipped, self.deleted
        )
    }
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub stats: SweepStats,
    pub failures: Vec<SyncFailure>,
}

impl SweepReport {
    pub fn into_result(self) -> Result<SweepStats, SweepError> {
        if self.failures.is_empty() {
            Ok(self.stats)
        } else {
            Err(SweepError {
                stats: self.stats,
                failures: self.failures,
            })
        }
    }
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a TTY (e.g. piped output, systemd).
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

pub struct Syncer {
    zoom: ZoomClient,
    transfer: TransferClient,
    storage: Arc<dyn Storage>,
    policy: SyncPolicy,
}

impl Syncer {
    pub fn new(
        zoom: ZoomClient,
        transfer: TransferClient,
        storage: Arc<dyn Storage>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            zoom,
            transfer,
            storage,
            policy,
        }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Run one sweep to completion (or until `cancel` fires).
    pub async fn sweep(&self, cancel: &CancellationToken) -> SweepReport {
        let mut ledger = Ledger::load(self.storage.as_ref()).await;
        tracing::info!(
            records = ledger.len(),
            checkpoint = ?ledger.checkpoint(),
            "Loaded ledger"
        );

        let mut report = SweepReport::default();
        self.run(&mut ledger, &mut report, cancel).await;

        if self.policy.dry_run {
            tracing::info!("[DRY RUN] Ledger not written");
        } else if let Err(e) = ledger.persist(self.storage.as_ref()).await {
            tracing::error!(error = %e, "Failed to persist ledger");
            report.failures.push(e.into());
        }

        tracing::info!(stats = %report.stats, failures = report.failures.len(), "Sweep finished");
        report
    }

    async fn run(&self, ledger: &mut Ledger, report: &mut SweepReport, cancel: &CancellationToken) {
        if let Err(e) = self.zoom.credentials().token().await {
            tracing::error!(error = %e, "Authorization failed");
            report.failures.push(e.into());
            return;
        }

        let since = ledger.checkpoint();
        tracing::info!("Pulling recordings");
        let listing = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Shutdown requested, abandoning listing");
                return;
            }
            result = self.zoom.list_recordings(
                since,
                self.policy.start_year,
                self.policy.listing_concurrency,
            ) => result,
        };
        let meetings = match listing {
            Ok(meetings) => meetings,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    gathered = e.partial.len(),
                    "Listing failed, nothing will be transferred this sweep"
                );
                report.failures.push(e.into());
                return;
            }
        };
        report.stats.meetings = meetings.len();
        tracing::info!(meetings = meetings.len(), "Fetched recordings");

        let mut seen = HashSet::new();
        let plans: Vec<MeetingPlan> = meetings
            .iter()
            .map(|m| plan_meeting(m, ledger, &self.policy, &mut seen))
            .collect();
        report.stats.skipped = plans.iter().map(|p| p.skipped).sum();

        let total: usize = plans.iter().map(|p| p.transfers.len()).sum();
        let pb = create_progress_bar(self.policy.no_progress_bar, total as u64);

        for plan in &plans {
            if cancel.is_cancelled() {
                pb.suspend(|| tracing::info!("Shutdown requested, stopping sweep"));
                break;
            }

            let mut failed = false;
            for transfer in &plan.transfers {
                if cancel.is_cancelled() {
                    break;
                }
                pb.set_message(transfer.path.clone());
                if !self.transfer_file(ledger, report, &pb, transfer, cancel).await {
                    failed = true;
                }
                pb.inc(1);
            }

            if self.policy.delete_after && !cancel.is_cancelled() {
                self.delete_meeting(plan, failed, report, &pb).await;
            }
        }
        pb.finish_and_clear();
    }

    /// Transfer one file and record it. Returns `false` if it failed.
    async fn transfer_file(
        &self,
        ledger: &mut Ledger,
        report: &mut SweepReport,
        pb: &ProgressBar,
        transfer: &PlannedTransfer,
        cancel: &CancellationToken,
    ) -> bool {
        if self.policy.dry_run {
            pb.suspend(|| {
                tracing::info!(
                    path = %transfer.path,
                    recording_type = %transfer.recording_type,
                    "[DRY RUN] Would transfer"
                )
            });
            return true;
        }

        pb.suspend(|| {
            tracing::info!(
                path = %transfer.path,
                recorded_at = %transfer.recorded_at,
                "Transferring"
            )
        });
        match self
            .transfer
            .download_to(
                self.storage.as_ref(),
                &transfer.path,
                &transfer.download_url,
                self.policy.transfer,
                cancel,
            )
            .await
        {
            Ok(bytes) => {
                ledger.append(TransferRecord {
                    id: transfer.file_id.clone(),
                    session_id: transfer.session_id.clone(),
                    saved_at: Utc::now(),
                    recorded_at: transfer.recorded_at,
                    path: transfer.path.clone(),
                });
                report.stats.transferred += 1;
                tracing::debug!(path = %transfer.path, bytes, "Transfer complete");
                true
            }
            Err(e) => {
                pb.suspend(|| tracing::error!(path = %transfer.path, error = %e, "Transfer failed"));
                report.failures.push(SyncFailure::Transfer {
                    path: transfer.path.clone(),
                    source: e,
                });
                false
            }
        }
    }

    async fn delete_meeting(
        &self,
        plan: &MeetingPlan,
        transfers_failed: bool,
        report: &mut SweepReport,
        pb: &ProgressBar,
    ) {
        if transfers_failed {
            pb.suspend(|| {
                tracing::warn!(
                    meeting_id = plan.meeting_id,
                    topic = %plan.topic,
                    "Keeping cloud recording, some of its files failed to transfer"
                )
            });
            return;
        }
        if self.policy.dry_run {
            pb.suspend(|| {
                tracing::info!(meeting_id = plan.meeting_id, topic = %plan.topic, "[DRY RUN] Would delete")
            });
            return;
        }

        match self.zoom.delete_recording(plan.meeting_id).await {
            Ok(()) => report.stats.deleted += 1,
            Err(e) => {
                pb.suspend(|| {
                    tracing::error!(
                        meeting_id = plan.meeting_id,
                        topic = %plan.topic,
                        error = %e,
                        "Failed to delete cloud recording"
                    )
                });
                report.failures.push(SyncFailure::Deletion {
                    meeting_id: plan.meeting_id,
                    topic: plan.topic.clone(),
                    source: e,
                });
            }
        }
    }
}
