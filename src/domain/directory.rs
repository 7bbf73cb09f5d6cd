use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per sender/recipient record of past transfers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDirectoryEntry {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub transfer_count: u64,
    pub last_transfer_at: DateTime<Utc>,
}

impl TransferDirectoryEntry {
    pub fn first(sender_id: Uuid, recipient_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            sender_id,
            recipient_id,
            transfer_count: 1,
            last_transfer_at: at,
        }
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        self.transfer_count += 1;
        self.last_transfer_at = at;
    }
}

/// Directory entry resolved against the member directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentRecipient {
    pub recipient_id: Uuid,
    pub display_name: String,
    /// `false` when the member could not be found anymore
    pub known: bool,
    pub transfer_count: u64,
    pub last_transfer_at: DateTime<Utc>,
}
