pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::chat::handlers as chat;
use crate::matcher::handlers as matcher;
use crate::session::handlers as session;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root_handler))
        .route("/health", get(health::health_handler))
        // Hot storage
        .route("/session/:id", get(session::handle_get_session))
        .route("/resume/:id", put(session::handle_put_resume))
        // Cold storage
        .route("/snapshot/:id", post(session::handle_snapshot))
        .route("/snapshots/:id", get(session::handle_list_snapshots))
        // Assistant
        .route("/chat", post(chat::handle_chat))
        .route("/llm/status", get(chat::handle_llm_status))
        // Keyword matcher
        .route("/match", post(matcher::handle_match))
        .with_state(state)
}
