//! Session reads, writes and snapshots, composed over the hot store and archive.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::session::{ChatEntry, SnapshotReceipt, SnapshotRecord};
use crate::session::archive::SnapshotArchive;
use crate::session::hot_store::{HotStore, PutOutcome};

/// What a client hydrates from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub resume: String,
    pub chat: Vec<ChatEntry>,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rehydrated_in_ms: Option<u64>,
}

/// Reads a session from hot storage.
///
/// An unknown session is not an error. If hot storage holds nothing, the newest
/// archived snapshot (if any) is written back and served; otherwise the view is empty.
pub async fn load_session(
    hot: &dyn HotStore,
    archive: &dyn SnapshotArchive,
    session_id: Uuid,
    chat_limit: usize,
) -> Result<SessionView, AppError> {
    if let Some(view) = read_hot(hot, session_id, chat_limit).await? {
        return Ok(view);
    }

    let started = Instant::now();
    match rehydrate_from_snapshot(hot, archive, session_id).await? {
        Rehydrated::Restored { snapshot, revision } => {
            let elapsed = started.elapsed().as_millis() as u64;
            info!(
                "Rehydrated session {session_id} from snapshot {} in {elapsed}ms",
                snapshot.snapshot_id
            );
            let skip = snapshot.chat.len().saturating_sub(chat_limit);
            Ok(SessionView {
                resume: snapshot.resume,
                chat: snapshot.chat.into_iter().skip(skip).collect(),
                revision,
                updated_at: None,
                rehydrated_in_ms: Some(elapsed),
            })
        }
        Rehydrated::Overtaken => {
            debug!("Session {session_id} was written during rehydration; serving hot state");
            Ok(read_hot(hot, session_id, chat_limit)
                .await?
                .unwrap_or_else(SessionView::empty))
        }
        Rehydrated::NoSnapshot => Ok(SessionView::empty()),
    }
}

impl SessionView {
    fn empty() -> Self {
        SessionView {
            resume: String::new(),
            chat: Vec::new(),
            revision: 0,
            updated_at: None,
            rehydrated_in_ms: None,
        }
    }
}

/// The hot view, or `None` when hot storage holds nothing for the session.
async fn read_hot(
    hot: &dyn HotStore,
    session_id: Uuid,
    chat_limit: usize,
) -> Result<Option<SessionView>, AppError> {
    let resume = hot.get_resume(session_id).await?;
    let chat = hot.list_chat(session_id, Some(chat_limit)).await?;
    if resume.is_none() && chat.is_empty() {
        return Ok(None);
    }

    let updated_at = resume.as_ref().map(|r| r.updated_at);
    let (resume, revision) = resume.map(|r| (r.text, r.revision)).unwrap_or_default();
    Ok(Some(SessionView {
        resume,
        chat,
        revision,
        updated_at,
        rehydrated_in_ms: None,
    }))
}

enum Rehydrated {
    Restored { snapshot: SnapshotRecord, revision: u64 },
    /// Another writer reached hot storage first; its state stands.
    Overtaken,
    NoSnapshot,
}

/// Copies the newest snapshot back into hot storage.
///
/// The resume is written at revision 1, which only succeeds while nothing has
/// been stored yet. The transcript is restored only when that write wins, so
/// racing loads restore it once and a concurrent edit is never overwritten.
async fn rehydrate_from_snapshot(
    hot: &dyn HotStore,
    archive: &dyn SnapshotArchive,
    session_id: Uuid,
) -> Result<Rehydrated, AppError> {
    let Some(snapshot) = archive.latest(session_id).await? else {
        return Ok(Rehydrated::NoSnapshot);
    };

    let revision = match hot.put_resume(session_id, &snapshot.resume, Some(1)).await? {
        PutOutcome::Saved { revision, .. } => revision,
        PutOutcome::Stale { .. } => return Ok(Rehydrated::Overtaken),
    };
    for entry in &snapshot.chat {
        hot.append_chat(session_id, entry).await?;
    }
    Ok(Rehydrated::Restored { snapshot, revision })
}

/// Outcome of a snapshot commit.
#[derive(Debug, Clone)]
pub struct SnapshotTaken {
    pub receipt: SnapshotReceipt,
    pub count_messages: usize,
}

/// Copies whatever hot storage currently holds into a new archived snapshot.
pub async fn take_snapshot(
    hot: &dyn HotStore,
    archive: &dyn SnapshotArchive,
    session_id: Uuid,
) -> Result<SnapshotTaken, AppError> {
    let resume = hot.get_resume(session_id).await?;
    let chat = hot.list_chat(session_id, None).await?;
    let record = SnapshotRecord::capture(session_id, resume, chat);
    let count_messages = record.chat.len();

    let receipt = archive.put(&record).await?;
    info!(
        "Snapshot {} taken for session {session_id} (revision {}, {count_messages} messages)",
        receipt.snapshot_id, record.revision
    );

    Ok(SnapshotTaken {
        receipt,
        count_messages,
    })
}
