//! Persisted ledger of transferred recording files.
//!
//! The ledger is a single JSON document stored next to the recordings on
//! every destination. It is read once at the start of a sweep, appended to in
//! memory as files complete, and rewritten in full (sorted by recording time)
//! at the end. The newest `recorded_at` is the lower bound of the next
//! listing.

pub mod error;
pub mod types;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncReadExt;

pub use self::error::LedgerError;
use self::types::LedgerDocument;
pub use self::types::TransferRecord;
use crate::storage::Storage;

/// Ledger location relative to each destination root.
pub const LEDGER_FILE_NAME: &str = ".zoomdl_saved_records.json";

#[derive(Serialize)]
struct LedgerDocumentRef<'a> {
    #[serde(rename = "Records")]
    records: &'a [TransferRecord],
}

#[derive(Debug, Default, Clone)]
pub struct Ledger {
    records: Vec<TransferRecord>,
    ids: HashSet<String>,
}

impl Ledger {
    /// Read the ledger from the primary destination.
    ///
    /// Never fails: a missing, unreadable or corrupt ledger yields an empty
    /// one, which makes the next listing start from the floor year.
    pub async fn load(storage: &dyn Storage) -> Self {
        let mut reader = match storage.reader(LEDGER_FILE_NAME).await {
            Ok(reader) => reader,
            Err(e) if e.is_not_found() => {
                tracing::info!("No ledger found, starting with an empty one");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unable to open ledger, starting with an empty one");
                return Self::default();
            }
        };

        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            tracing::warn!(error = %e, "Unable to read ledger, starting with an empty one");
            return Self::default();
        }
        Self::from_json(&buf)
    }

    /// Parse a ledger document. Empty input is an empty ledger; malformed
    /// input is logged and also treated as empty.
    pub fn from_json(bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Self::default();
        }
        match serde_json::from_slice::<LedgerDocument>(bytes) {
            Ok(doc) => Self::from_records(doc.records.unwrap_or_default()),
            Err(e) => {
                tracing::warn!(error = %e, "Unable to parse ledger, starting with an empty one");
                Self::default()
            }
        }
    }

    /// Build a ledger from existing records, dropping repeated ids (first
    /// one wins) and sorting by recording time.
    pub fn from_records(records: Vec<TransferRecord>) -> Self {
        let mut ledger = Self::default();
        for record in records {
            let id = record.id.clone();
            if !ledger.append(record) {
                tracing::debug!(id = %id, "Dropping duplicate ledger entry");
            }
        }
        ledger.sort();
        ledger
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TransferRecord] {
        &self.records
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.ids.contains(file_id)
    }

    /// Add a record. Returns `false`, leaving the ledger untouched, if a
    /// record with the same file id already exists.
    pub fn append(&mut self, record: TransferRecord) -> bool {
        if !self.ids.insert(record.id.clone()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Lower bound for the next listing: the newest `recorded_at`, or `None`
    /// for an empty ledger.
    pub fn checkpoint(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.recorded_at).max()
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.recorded_at).min()
    }

    /// Stable sort by `recorded_at`, ascending.
    pub fn sort(&mut self) {
        self.records.sort_by_key(|r| r.recorded_at);
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut body = serde_json::to_vec(&LedgerDocumentRef {
            records: &self.records,
        })?;
        body.push(b'\n');
        Ok(body)
    }

    /// Sort and overwrite the ledger on every destination.
    pub async fn persist(&mut self, storage: &dyn Storage) -> Result<(), LedgerError> {
        self.sort();
        let body = self.to_json()?;

        let mut writer = storage.writer(LEDGER_FILE_NAME).await?;
        if let Err(e) = writer.write(&body).await {
            // Closing keeps the complete copies on the backends that did
            // accept the write; aborting would delete the ledger everywhere.
            if let Err(close_err) = writer.close().await {
                tracing::warn!(error = %close_err, "Failed to close ledger after write error");
            }
            return Err(e.into());
        }
        writer.close().await?;

        tracing::debug!(records = self.records.len(), "Ledger persisted");
        Ok(())
    }
}
