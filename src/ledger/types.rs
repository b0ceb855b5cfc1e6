use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recording file that has been transferred to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Remote file id; unique across the ledger.
    pub id: String,
    /// UUID of the meeting instance the file belongs to.
    pub session_id: String,
    pub saved_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    /// Storage path relative to each destination root.
    pub path: String,
}

/// On-disk shape of the ledger file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct LedgerDocument {
    // A `null` list is accepted on read.
    #[serde(rename = "Records", default)]
    pub records: Option<Vec<TransferRecord>>,
}
