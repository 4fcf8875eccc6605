use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::models::session::now_ms;
use crate::state::AppState;

/// GET /
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "ok": true,
        "hint": "See /health, /session/{id}, /chat"
    }))
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "ts": now_ms(),
        "local": state.config.local_dev,
        "version": env!("CARGO_PKG_VERSION"),
        "service": "resume-session-api"
    }))
}
