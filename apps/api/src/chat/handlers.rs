//! Chat relay: records the turn in hot storage and forwards the message to the assistant.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::session::{ChatEntry, Role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub assistant_message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmStatus {
    pub provider: String,
    pub api_key_present: bool,
    pub model: String,
}

/// POST /chat
///
/// The user entry is stored before the assistant is called, so a failed call
/// still leaves the question in the transcript.
pub async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }

    state
        .hot
        .append_chat(
            request.session_id,
            &ChatEntry::now(Role::User, request.message.clone()),
        )
        .await?;

    let reply = state
        .llm
        .reply(&request.message)
        .await
        .map_err(|e| AppError::Llm(format!("Chat reply failed: {e}")))?;

    state
        .hot
        .append_chat(
            request.session_id,
            &ChatEntry::now(Role::Assistant, reply.clone()),
        )
        .await?;

    Ok(Json(ChatResponse {
        assistant_message: reply,
    }))
}

/// GET /llm/status
pub async fn handle_llm_status(State(state): State<AppState>) -> Json<LlmStatus> {
    Json(LlmStatus {
        provider: state.llm.provider().to_string(),
        api_key_present: state.llm.has_api_key(),
        model: state.llm.model().to_string(),
    })
}
