use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript line. `ts` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl ChatMessage {
    pub fn now(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            ts: Some(Utc::now().timestamp_millis()),
        }
    }
}

/// Session state as served by `GET /session/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshotView {
    #[serde(rename = "resume", default)]
    pub resume_text: String,
    #[serde(rename = "chat", default)]
    pub chat_log: Vec<ChatMessage>,
    /// Revision of the stored resume; 0 when nothing was ever saved.
    #[serde(default)]
    pub revision: u64,
}

impl SessionSnapshotView {
    pub fn is_empty(&self) -> bool {
        self.resume_text.is_empty() && self.chat_log.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAck {
    #[serde(default)]
    pub saved: bool,
    pub updated_at: Option<i64>,
    pub revision: Option<u64>,
}

/// Acknowledgement of an explicit snapshot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotReceipt {
    pub snapshot_id: Option<Uuid>,
    pub taken_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count_messages: usize,
}

/// One entry of a session's snapshot history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub snapshot_id: Uuid,
    pub session_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub key: String,
}
