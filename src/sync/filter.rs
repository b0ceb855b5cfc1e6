//! Per-meeting and per-file selection for a sweep.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::SyncPolicy;
use crate::download::paths::recording_path;
use crate::ledger::Ledger;
use crate::zoom::{Meeting, RecordingFile, RecordingType};

/// Why a recording file is not transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Missing extension, type, start time or download URL.
    Unusable,
    AlreadyTransferred,
    TypeNotAllowed,
}

/// A file selected for transfer.
#[derive(Debug, Clone)]
pub struct PlannedTransfer {
    pub file_id: String,
    pub session_id: String,
    pub recording_type: RecordingType,
    pub recorded_at: DateTime<Utc>,
    pub download_url: String,
    /// Storage path relative to every destination root.
    pub path: String,
}

/// What a sweep does with one meeting.
#[derive(Debug, Clone)]
pub struct MeetingPlan {
    pub meeting_id: i64,
    pub topic: String,
    /// Topic is on the ignore list: nothing is transferred, but the meeting
    /// may still be deleted.
    pub ignored: bool,
    pub transfers: Vec<PlannedTransfer>,
    pub skipped: usize,
}

pub fn is_ignored(meeting: &Meeting, policy: &SyncPolicy) -> bool {
    policy.ignored_titles.contains(&meeting.topic)
}

pub fn classify_file(
    file: &RecordingFile,
    ledger: &Ledger,
    policy: &SyncPolicy,
) -> Result<DateTime<Utc>, SkipReason> {
    let recorded_at = match file.recording_start {
        Some(start)
            if !file.file_extension.is_empty()
                && !file.recording_type.is_empty()
                && !file.download_url.is_empty() =>
        {
            start
        }
        _ => return Err(SkipReason::Unusable),
    };
    if ledger.contains(&file.id) {
        return Err(SkipReason::AlreadyTransferred);
    }
    if !policy.allowed_types.contains(&file.recording_type) {
        return Err(SkipReason::TypeNotAllowed);
    }
    Ok(recorded_at)
}

/// Select the files of `meeting` to transfer.
///
/// `seen` holds file ids already planned earlier in the sweep, so a file
/// reported under two meetings is only transferred once.
pub fn plan_meeting(
    meeting: &Meeting,
    ledger: &Ledger,
    policy: &SyncPolicy,
    seen: &mut HashSet<String>,
) -> MeetingPlan {
    let mut plan = MeetingPlan {
        meeting_id: meeting.id,
        topic: meeting.topic.clone(),
        ignored: is_ignored(meeting, policy),
        transfers: Vec::new(),
        skipped: 0,
    };

    if plan.ignored {
        tracing::debug!(topic = %meeting.topic, "Ignoring meeting by title");
        plan.skipped = meeting.recording_files.len();
        return plan;
    }

    for file in &meeting.recording_files {
        match classify_file(file, ledger, policy) {
            Ok(recorded_at) if seen.insert(file.id.clone()) => {
                plan.transfers.push(PlannedTransfer {
                    file_id: file.id.clone(),
                    session_id: meeting.uuid.clone(),
                    recording_type: file.recording_type.clone(),
                    recorded_at,
                    download_url: file.download_url.clone(),
                    path: recording_path(
                        &meeting.topic,
                        &recorded_at,
                        &file.recording_type,
                        &file.file_extension,
                    ),
                });
            }
            Ok(_) => plan.skipped += 1,
            Err(reason) => {
                tracing::debug!(
                    topic = %meeting.topic,
                    file_id = %file.id,
                    recording_type = %file.recording_type,
                    ?reason,
                    "Skipping file"
                );
                plan.skipped += 1;
            }
        }
    }
    plan
}
