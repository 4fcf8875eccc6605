use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds since the Unix epoch, the timestamp unit used on the wire.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single transcript line. `ts` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl ChatEntry {
    pub fn now(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            ts: Some(now_ms()),
        }
    }
}

/// The live resume draft held in hot storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeRecord {
    pub text: String,
    /// Monotonic per-session write counter.
    pub revision: u64,
    pub updated_at: i64,
}

/// Immutable point-in-time copy of a session, written once to the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub snapshot_id: Uuid,
    pub session_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub resume: String,
    pub revision: u64,
    pub chat: Vec<ChatEntry>,
}

impl SnapshotRecord {
    pub fn capture(session_id: Uuid, resume: Option<ResumeRecord>, chat: Vec<ChatEntry>) -> Self {
        let (resume, revision) = resume
            .map(|r| (r.text, r.revision))
            .unwrap_or_default();
        Self {
            snapshot_id: Uuid::new_v4(),
            session_id,
            taken_at: Utc::now(),
            resume,
            revision,
            chat,
        }
    }
}

/// Where a snapshot landed. Returned by the archive on write and when listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotReceipt {
    pub snapshot_id: Uuid,
    pub session_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub key: String,
}
