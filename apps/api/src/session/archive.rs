//! Cold storage: an append-only archive of session snapshots.
//!
//! Every snapshot gets its own object key. Nothing here overwrites or deletes.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use chrono::DateTime;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::session::{SnapshotReceipt, SnapshotRecord};

#[async_trait]
pub trait SnapshotArchive: Send + Sync {
    async fn put(&self, record: &SnapshotRecord) -> Result<SnapshotReceipt, AppError>;

    /// The most recent snapshot for a session, if any was ever taken.
    async fn latest(&self, session_id: Uuid) -> Result<Option<SnapshotRecord>, AppError>;

    /// All snapshots for a session, oldest first.
    async fn list(&self, session_id: Uuid) -> Result<Vec<SnapshotReceipt>, AppError>;
}

fn session_prefix(session_id: Uuid) -> String {
    format!("sessions/{session_id}/snapshots/")
}

/// `sessions/{id}/snapshots/{epoch_ms:013}-{snapshot_id}.json`
///
/// The zero-padded timestamp makes lexical key order match capture order.
pub fn snapshot_key(record: &SnapshotRecord) -> String {
    format!(
        "{}{:013}-{}.json",
        session_prefix(record.session_id),
        record.taken_at.timestamp_millis(),
        record.snapshot_id
    )
}

/// Recovers a receipt from an object key written by [`snapshot_key`].
pub fn parse_snapshot_key(session_id: Uuid, key: &str) -> Option<SnapshotReceipt> {
    let name = key
        .strip_prefix(&session_prefix(session_id))?
        .strip_suffix(".json")?;
    let (millis, snapshot_id) = name.split_once('-')?;
    Some(SnapshotReceipt {
        snapshot_id: Uuid::parse_str(snapshot_id).ok()?,
        session_id,
        taken_at: DateTime::from_timestamp_millis(millis.parse().ok()?)?,
        key: key.to_string(),
    })
}

fn receipt_for(record: &SnapshotRecord) -> SnapshotReceipt {
    SnapshotReceipt {
        snapshot_id: record.snapshot_id,
        session_id: record.session_id,
        taken_at: record.taken_at,
        key: snapshot_key(record),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// S3 / MinIO
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct S3SnapshotArchive {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3SnapshotArchive {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    async fn list_keys(&self, session_id: Uuid) -> Result<Vec<String>, AppError> {
        let prefix = session_prefix(session_id);
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| AppError::S3(format!("Snapshot listing failed: {e}")))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl SnapshotArchive for S3SnapshotArchive {
    async fn put(&self, record: &SnapshotRecord) -> Result<SnapshotReceipt, AppError> {
        let receipt = receipt_for(record);
        let body = serde_json::to_vec(record)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&receipt.key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .if_none_match("*")
            .send()
            .await
            .map_err(|e| AppError::S3(format!("Snapshot upload failed: {e}")))?;

        info!("Uploaded snapshot to s3://{}/{}", self.bucket, receipt.key);
        Ok(receipt)
    }

    async fn latest(&self, session_id: Uuid) -> Result<Option<SnapshotRecord>, AppError> {
        let keys = self.list_keys(session_id).await?;
        let Some(key) = keys.last() else {
            return Ok(None);
        };

        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::S3(format!("Snapshot download failed: {e}")))?;
        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| AppError::S3(format!("Snapshot body read failed: {e}")))?
            .into_bytes();

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn list(&self, session_id: Uuid) -> Result<Vec<SnapshotReceipt>, AppError> {
        Ok(self
            .list_keys(session_id)
            .await?
            .iter()
            .filter_map(|key| parse_snapshot_key(session_id, key))
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory (LOCAL_DEV and tests)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySnapshotArchive {
    snapshots: RwLock<HashMap<Uuid, Vec<SnapshotRecord>>>,
}

#[async_trait]
impl SnapshotArchive for MemorySnapshotArchive {
    async fn put(&self, record: &SnapshotRecord) -> Result<SnapshotReceipt, AppError> {
        self.snapshots
            .write()
            .await
            .entry(record.session_id)
            .or_default()
            .push(record.clone());
        Ok(receipt_for(record))
    }

    async fn latest(&self, session_id: Uuid) -> Result<Option<SnapshotRecord>, AppError> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(&session_id)
            .and_then(|all| all.last().cloned()))
    }

    async fn list(&self, session_id: Uuid) -> Result<Vec<SnapshotReceipt>, AppError> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(&session_id)
            .map(|all| all.iter().map(receipt_for).collect())
            .unwrap_or_default())
    }
}
