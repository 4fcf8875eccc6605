use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::session::SnapshotReceipt;
use crate::session::hot_store::{PutOutcome, MAX_REVISION};
use crate::session::service::{load_session, take_snapshot, SessionView};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResumeUpdate {
    pub text: String,
    #[serde(default)]
    pub revision: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeSaved {
    pub saved: bool,
    pub updated_at: i64,
    pub revision: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub snapshotted: bool,
    pub snapshot_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub count_messages: usize,
}

/// GET /session/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let view = load_session(
        state.hot.as_ref(),
        state.archive.as_ref(),
        session_id,
        state.config.chat_history_limit,
    )
    .await?;
    Ok(Json(view))
}

/// PUT /resume/:id
///
/// Whole-value overwrite. A request revision at or below the stored one is refused with 409;
/// one above [`MAX_REVISION`] with 400.
pub async fn handle_put_resume(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(update): Json<ResumeUpdate>,
) -> Result<Json<ResumeSaved>, AppError> {
    if update.revision.is_some_and(|r| r > MAX_REVISION) {
        return Err(AppError::Validation(format!(
            "revision must not exceed {MAX_REVISION}"
        )));
    }
    match state
        .hot
        .put_resume(session_id, &update.text, update.revision)
        .await?
    {
        PutOutcome::Saved {
            revision,
            updated_at,
        } => Ok(Json(ResumeSaved {
            saved: true,
            updated_at,
            revision,
        })),
        PutOutcome::Stale { current } => {
            tracing::debug!(
                "Refused stale resume write for session {session_id}: {:?} <= {current}",
                update.revision
            );
            Err(AppError::StaleRevision { current })
        }
    }
}

/// POST /snapshot/:id
pub async fn handle_snapshot(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let taken = take_snapshot(state.hot.as_ref(), state.archive.as_ref(), session_id).await?;
    Ok(Json(SnapshotResponse {
        snapshotted: true,
        snapshot_id: taken.receipt.snapshot_id,
        taken_at: taken.receipt.taken_at,
        count_messages: taken.count_messages,
    }))
}

/// GET /snapshots/:id
pub async fn handle_list_snapshots(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<SnapshotReceipt>>, AppError> {
    Ok(Json(state.archive.list(session_id).await?))
}
