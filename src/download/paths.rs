use chrono::{DateTime, Utc};

use crate::zoom::RecordingType;

/// Make a meeting topic usable as a directory name: apostrophes are dropped
/// and colons become `" -"`.
pub fn sanitize_topic(topic: &str) -> String {
    let mut out = String::with_capacity(topic.len() + 4);
    for c in topic.chars() {
        match c {
            '\'' => {}
            ':' => out.push_str(" -"),
            // Keeps the topic a single path component.
            '/' | '\\' => out.push('-'),
            _ => out.push(c),
        }
    }
    out
}

/// Storage path of one recording file:
/// `<topic>/<YYYY-MM-DD_HH-MM-SS>_<recording type>.<extension>`.
///
/// A topic that sanitizes to nothing usable as a directory (empty, `.` or
/// `..`) places the file at the destination root.
pub fn recording_path(
    topic: &str,
    recording_start: &DateTime<Utc>,
    recording_type: &RecordingType,
    extension: &str,
) -> String {
    let name = format!(
        "{}_{}.{}",
        recording_start.format("%Y-%m-%d_%H-%M-%S"),
        recording_type,
        extension.to_lowercase()
    );
    let dir = sanitize_topic(topic);
    match dir.trim() {
        "" | "." | ".." => name,
        _ => format!("{dir}/{name}"),
    }
}
