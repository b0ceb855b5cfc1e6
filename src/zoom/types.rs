//! Wire types for the cloud recording listing API.
//!
//! Only the fields the sync engine reads are modelled; everything else in the
//! payload is ignored by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a recorded media file, as reported by `recording_type`.
///
/// Unknown values are preserved verbatim in [`RecordingType::Other`] so that a
/// new server-side type can still be allow-listed by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordingType {
    SharedScreenWithSpeakerViewCc,
    SharedScreenWithSpeakerView,
    SharedScreenWithGalleryView,
    SpeakerView,
    GalleryView,
    SharedScreen,
    AudioOnly,
    AudioTranscript,
    ChatFile,
    ActiveSpeaker,
    Poll,
    Timeline,
    ClosedCaption,
    Other(String),
}

impl RecordingType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SharedScreenWithSpeakerViewCc => "shared_screen_with_speaker_view(CC)",
            Self::SharedScreenWithSpeakerView => "shared_screen_with_speaker_view",
            Self::SharedScreenWithGalleryView => "shared_screen_with_gallery_view",
            Self::SpeakerView => "speaker_view",
            Self::GalleryView => "gallery_view",
            Self::SharedScreen => "shared_screen",
            Self::AudioOnly => "audio_only",
            Self::AudioTranscript => "audio_transcript",
            Self::ChatFile => "chat_file",
            Self::ActiveSpeaker => "active_speaker",
            Self::Poll => "poll",
            Self::Timeline => "timeline",
            Self::ClosedCaption => "closed_caption",
            Self::Other(s) => s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl Default for RecordingType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for RecordingType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "shared_screen_with_speaker_view(CC)" => Self::SharedScreenWithSpeakerViewCc,
            "shared_screen_with_speaker_view" => Self::SharedScreenWithSpeakerView,
            "shared_screen_with_gallery_view" => Self::SharedScreenWithGalleryView,
            "speaker_view" => Self::SpeakerView,
            "gallery_view" => Self::GalleryView,
            "shared_screen" => Self::SharedScreen,
            "audio_only" => Self::AudioOnly,
            "audio_transcript" => Self::AudioTranscript,
            "chat_file" => Self::ChatFile,
            "active_speaker" => Self::ActiveSpeaker,
            "poll" => Self::Poll,
            "timeline" => Self::Timeline,
            "closed_caption" => Self::ClosedCaption,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for RecordingType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<RecordingType> for String {
    fn from(t: RecordingType) -> Self {
        match t {
            RecordingType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for RecordingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded meeting instance.
#[derive(Debug, Clone, Deserialize)]
pub struct Meeting {
    pub id: i64,
    /// Stable per-instance identifier; the dedup key for listings.
    pub uuid: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recording_files: Vec<RecordingFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingFile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub recording_type: RecordingType,
    #[serde(default)]
    pub recording_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_extension: String,
    #[serde(default)]
    pub download_url: String,
}

/// One page of `GET /users/me/recordings`.
#[derive(Debug, Deserialize)]
pub struct ListRecordingsResponse {
    #[serde(default)]
    pub next_page_token: String,
    #[serde(default)]
    pub meetings: Vec<Meeting>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_type_known_names_round_trip() {
        for name in [
            "shared_screen_with_speaker_view(CC)",
            "gallery_view",
            "active_speaker",
            "audio_only",
        ] {
            let t = RecordingType::from(name);
            assert!(!matches!(t, RecordingType::Other(_)), "{name}");
            assert_eq!(t.as_str(), name);
        }
    }

    #[test]
    fn test_recording_type_unknown_is_preserved() {
        let t = RecordingType::from("summary_next_steps");
        assert_eq!(t, RecordingType::Other("summary_next_steps".into()));
        assert_eq!(String::from(t), "summary_next_steps");
    }

    #[test]
    fn test_recording_type_default_is_empty() {
        assert!(RecordingType::default().is_empty());
        assert!(!RecordingType::GalleryView.is_empty());
    }

    #[test]
    fn test_deserialize_listing_page() {
        let json = r#"{
            "from": "2022-09-01",
            "to": "2022-10-01",
            "page_size": 300,
            "next_page_token": "tok",
            "meetings": [{
                "id": 81234567890,
                "uuid": "abc==",
                "topic": "static",
                "start_time": "2022-10-01T00:00:00Z",
                "recording_files": [{
                    "id": "f1",
                    "recording_type": "gallery_view",
                    "recording_start": "2022-10-01T00:00:00Z",
                    "file_extension": "MP4",
                    "download_url": "https://example.com/rec/download/f1",
                    "file_size": 1024
                }]
            }]
        }"#;
        let page: ListRecordingsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_page_token, "tok");
        assert_eq!(page.meetings.len(), 1);
        let file = &page.meetings[0].recording_files[0];
        assert_eq!(file.recording_type, RecordingType::GalleryView);
        assert_eq!(file.file_extension, "MP4");
        assert!(file.recording_start.is_some());
    }

    #[test]
    fn test_deserialize_sparse_file() {
        let json = r#"{"id": 1, "uuid": "u", "recording_files": [{"id": "f"}]}"#;
        let meeting: Meeting = serde_json::from_str(json).unwrap();
        assert!(meeting.topic.is_empty());
        assert!(meeting.start_time.is_none());
        let file = &meeting.recording_files[0];
        assert!(file.recording_type.is_empty());
        assert!(file.file_extension.is_empty());
        assert!(file.recording_start.is_none());
    }

    #[test]
    fn test_deserialize_empty_page() {
        let page: ListRecordingsResponse = serde_json::from_str("{}").unwrap();
        assert!(page.next_page_token.is_empty());
        assert!(page.meetings.is_empty());
    }
}
