//! Notification records and the envelopes exchanged between tabs.
//!
//! The JSON shape (`type`, `message`, `toastId`) is what gets persisted under
//! the storage key and what travels over the broadcast channel.

use serde::{Deserialize, Serialize};

/// Id used for failures that happen before a transaction hash exists.
pub const FALLBACK_ID: &str = "tx_error";

const REPLACED_PREFIX: &str = "replaced_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Pending,
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(rename = "toastId")]
    pub id: String,
}

impl NotificationRecord {
    pub fn new(kind: NotificationKind, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), id: id.into() }
    }

    pub fn pending(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Pending, id, message)
    }

    pub fn success(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, id, message)
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, id, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissalEvent {
    #[serde(rename = "dismissedId")]
    pub id: String,
}

impl DismissalEvent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// What travels over the channel. Decoding tries the dismissal shape first,
/// so a payload carrying `dismissedId` is never mistaken for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BroadcastEnvelope {
    Dismissal(DismissalEvent),
    Notification(NotificationRecord),
}

impl BroadcastEnvelope {
    pub fn id(&self) -> &str {
        match self {
            BroadcastEnvelope::Dismissal(d) => &d.id,
            BroadcastEnvelope::Notification(r) => &r.id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl From<NotificationRecord> for BroadcastEnvelope {
    fn from(record: NotificationRecord) -> Self {
        BroadcastEnvelope::Notification(record)
    }
}

impl From<DismissalEvent> for BroadcastEnvelope {
    fn from(event: DismissalEvent) -> Self {
        BroadcastEnvelope::Dismissal(event)
    }
}

pub fn replaced_id(id: &str) -> String {
    format!("{REPLACED_PREFIX}{id}")
}

/// `0x1234567890...` becomes `0x12...7890`.
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 8 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Message text for each stage of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub amount: String,
    pub symbol: String,
    pub recipient: String,
}

impl TransferSummary {
    pub fn new(amount: impl Into<String>, symbol: impl Into<String>, recipient: &str) -> Self {
        Self { amount: amount.into(), symbol: symbol.into(), recipient: short_address(recipient) }
    }

    pub fn sending(&self) -> String {
        format!("Sending {} {} to {}", self.amount, self.symbol, self.recipient)
    }

    pub fn sent(&self) -> String {
        format!("Sent {} {} to {}", self.amount, self.symbol, self.recipient)
    }

    pub fn failed(&self) -> String {
        format!("Failed to send {} {} to {}", self.amount, self.symbol, self.recipient)
    }

    pub fn replaced(&self) -> String {
        format!("TX replaced, sending {} {} to {}", self.amount, self.symbol, self.recipient)
    }
}
