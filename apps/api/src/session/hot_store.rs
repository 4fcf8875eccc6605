//! Hot storage: the mutable, low-latency record behind live session reads and writes.
//!
//! The resume draft is only ever replaced whole. Each replacement carries a
//! per-session revision so a slow, older write can never overwrite a newer one.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::session::{now_ms, ChatEntry, ResumeRecord};

/// Result of a conditional resume write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Saved { revision: u64, updated_at: i64 },
    Stale { current: u64 },
}

#[async_trait]
pub trait HotStore: Send + Sync {
    async fn get_resume(&self, session_id: Uuid) -> Result<Option<ResumeRecord>, AppError>;

    /// Replaces the resume text. A supplied `revision` must be strictly greater
    /// than the stored one; `None` overwrites unconditionally and bumps the counter.
    async fn put_resume(
        &self,
        session_id: Uuid,
        text: &str,
        revision: Option<u64>,
    ) -> Result<PutOutcome, AppError>;

    async fn append_chat(&self, session_id: Uuid, entry: &ChatEntry) -> Result<(), AppError>;

    /// Returns the transcript oldest first; `last_n` keeps only the newest entries.
    async fn list_chat(
        &self,
        session_id: Uuid,
        last_n: Option<usize>,
    ) -> Result<Vec<ChatEntry>, AppError>;
}

/// Largest revision a client may send. Lua numbers are doubles, so the Redis
/// compare-and-set is only exact up to 2^53.
pub const MAX_REVISION: u64 = (1 << 53) - 1;

/// Decides the revision a write lands at, or `None` if the write is stale.
pub fn next_revision(current: u64, requested: Option<u64>) -> Option<u64> {
    match requested {
        None => Some(current + 1),
        Some(r) if r > current => Some(r),
        Some(_) => None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

// ARGV: text, requested revision (-1 = unconditional), updatedAt.
// Returns {1, revision} when written, {0, current} when stale.
const PUT_RESUME_SCRIPT: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'revision') or '0')
local requested = tonumber(ARGV[2])
local next = current + 1
if requested >= 0 then
  if requested <= current then
    return {0, current}
  end
  next = requested
end
redis.call('HSET', KEYS[1], 'text', ARGV[1], 'revision', next, 'updatedAt', ARGV[3])
return {1, next}
"#;

#[derive(Clone)]
pub struct RedisHotStore {
    client: redis::Client,
    put_resume: Script,
}

impl RedisHotStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            put_resume: Script::new(PUT_RESUME_SCRIPT),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, AppError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

fn resume_key(session_id: Uuid) -> String {
    format!("session:{session_id}:resume")
}

fn chat_key(session_id: Uuid) -> String {
    format!("session:{session_id}:chat")
}

#[async_trait]
impl HotStore for RedisHotStore {
    async fn get_resume(&self, session_id: Uuid) -> Result<Option<ResumeRecord>, AppError> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(resume_key(session_id)).await?;
        let Some(text) = fields.get("text") else {
            return Ok(None);
        };
        Ok(Some(ResumeRecord {
            text: text.clone(),
            revision: fields
                .get("revision")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            updated_at: fields
                .get("updatedAt")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }))
    }

    async fn put_resume(
        &self,
        session_id: Uuid,
        text: &str,
        revision: Option<u64>,
    ) -> Result<PutOutcome, AppError> {
        let mut conn = self.connection().await?;
        let updated_at = now_ms();
        let requested = revision.map(|r| r.min(MAX_REVISION) as i64).unwrap_or(-1);
        let (written, rev): (i64, u64) = self
            .put_resume
            .key(resume_key(session_id))
            .arg(text)
            .arg(requested)
            .arg(updated_at)
            .invoke_async(&mut conn)
            .await?;

        if written == 1 {
            debug!("Stored resume for session {session_id} at revision {rev}");
            Ok(PutOutcome::Saved {
                revision: rev,
                updated_at,
            })
        } else {
            Ok(PutOutcome::Stale { current: rev })
        }
    }

    async fn append_chat(&self, session_id: Uuid, entry: &ChatEntry) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(entry)?;
        conn.rpush::<_, _, ()>(chat_key(session_id), payload).await?;
        Ok(())
    }

    async fn list_chat(
        &self,
        session_id: Uuid,
        last_n: Option<usize>,
    ) -> Result<Vec<ChatEntry>, AppError> {
        let mut conn = self.connection().await?;
        let start = match last_n {
            Some(0) => return Ok(Vec::new()),
            Some(n) => -(n as isize),
            None => 0,
        };
        let raw: Vec<String> = conn.lrange(chat_key(session_id), start, -1).await?;
        Ok(raw
            .iter()
            .filter_map(|item| match serde_json::from_str::<ChatEntry>(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping undecodable chat entry for session {session_id}: {e}");
                    None
                }
            })
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory (LOCAL_DEV and tests)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryHotStore {
    resumes: RwLock<HashMap<Uuid, ResumeRecord>>,
    chats: RwLock<HashMap<Uuid, Vec<ChatEntry>>>,
}

#[async_trait]
impl HotStore for MemoryHotStore {
    async fn get_resume(&self, session_id: Uuid) -> Result<Option<ResumeRecord>, AppError> {
        Ok(self.resumes.read().await.get(&session_id).cloned())
    }

    async fn put_resume(
        &self,
        session_id: Uuid,
        text: &str,
        revision: Option<u64>,
    ) -> Result<PutOutcome, AppError> {
        let mut resumes = self.resumes.write().await;
        let current = resumes.get(&session_id).map(|r| r.revision).unwrap_or(0);
        let Some(revision) = next_revision(current, revision) else {
            return Ok(PutOutcome::Stale { current });
        };
        let updated_at = now_ms();
        resumes.insert(
            session_id,
            ResumeRecord {
                text: text.to_string(),
                revision,
                updated_at,
            },
        );
        Ok(PutOutcome::Saved {
            revision,
            updated_at,
        })
    }

    async fn append_chat(&self, session_id: Uuid, entry: &ChatEntry) -> Result<(), AppError> {
        self.chats
            .write()
            .await
            .entry(session_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn list_chat(
        &self,
        session_id: Uuid,
        last_n: Option<usize>,
    ) -> Result<Vec<ChatEntry>, AppError> {
        let chats = self.chats.read().await;
        let all = chats.get(&session_id).map(Vec::as_slice).unwrap_or_default();
        let skip = last_n.map(|n| all.len().saturating_sub(n)).unwrap_or(0);
        Ok(all[skip..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::Role;

    #[test]
    fn test_next_revision_unconditional_bumps() {
        assert_eq!(next_revision(0, None), Some(1));
        assert_eq!(next_revision(4, None), Some(5));
    }

    #[test]
    fn test_next_revision_rejects_equal_or_older() {
        assert_eq!(next_revision(5, Some(5)), None);
        assert_eq!(next_revision(5, Some(3)), None);
        assert_eq!(next_revision(5, Some(9)), Some(9));
    }

    #[tokio::test]
    async fn test_memory_put_then_get() {
        let store = MemoryHotStore::default();
        let id = Uuid::new_v4();
        assert!(store.get_resume(id).await.unwrap().is_none());

        let outcome = store.put_resume(id, "A", Some(1)).await.unwrap();
        assert!(matches!(outcome, PutOutcome::Saved { revision: 1, .. }));

        let record = store.get_resume(id).await.unwrap().unwrap();
        assert_eq!(record.text, "A");
        assert_eq!(record.revision, 1);
    }

    #[tokio::test]
    async fn test_memory_late_older_write_is_rejected() {
        let store = MemoryHotStore::default();
        let id = Uuid::new_v4();
        store.put_resume(id, "ABC", Some(3)).await.unwrap();

        let outcome = store.put_resume(id, "AB", Some(2)).await.unwrap();
        assert_eq!(outcome, PutOutcome::Stale { current: 3 });
        assert_eq!(store.get_resume(id).await.unwrap().unwrap().text, "ABC");
    }

    #[tokio::test]
    async fn test_memory_chat_last_n() {
        let store = MemoryHotStore::default();
        let id = Uuid::new_v4();
        for i in 0..5 {
            store
                .append_chat(id, &ChatEntry::now(Role::User, format!("m{i}")))
                .await
                .unwrap();
        }
        let tail = store.list_chat(id, Some(2)).await.unwrap();
        assert_eq!(
            tail.iter().map(|e| e.text.as_str()).collect::<Vec<_>>(),
            vec!["m3", "m4"]
        );
        assert_eq!(store.list_chat(id, None).await.unwrap().len(), 5);
        assert!(store.list_chat(Uuid::new_v4(), Some(10)).await.unwrap().is_empty());
    }
}
