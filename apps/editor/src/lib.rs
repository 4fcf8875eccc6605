//! Client-side session core for the resume editor.
//!
//! Owns the session-id bootstrap, the autosave debounce and save indicator,
//! snapshot commits and chat turns. Every operation takes the [`SessionId`]
//! explicitly; nothing here reads ambient state.

pub mod backend;
pub mod config;
pub mod controller;
pub mod errors;
pub mod indicator;
pub mod models;
pub mod quick_actions;
pub mod session_id;

pub use backend::{HttpBackend, SessionBackend};
pub use config::EditorConfig;
pub use controller::{ControllerConfig, SessionController, CHAT_FAILURE_TEXT};
pub use errors::{BackendError, ChatError, LoadError, SaveError, SessionIdError, SnapshotError};
pub use indicator::SaveIndicator;
pub use models::{ChatMessage, Role, SessionSnapshotView, SnapshotReceipt, SnapshotSummary};
pub use quick_actions::QuickAction;
pub use session_id::{
    resolve_session_id, rotate_session_id, FileIdStore, IdStore, MemoryIdStore, SessionId,
};

/// Builds a controller talking HTTP to the configured API.
pub fn connect(config: &EditorConfig) -> Result<SessionController<HttpBackend>, BackendError> {
    let backend = HttpBackend::new(config.api_base.clone(), config.request_timeout)?;
    tracing::info!("Session backend at {}", config.api_base);
    Ok(SessionController::new(backend, config.controller_config()))
}

/// Resolves this client's session id from the configured id store, then connects.
/// The same store yields the same id on every start.
pub fn open_session(
    config: &EditorConfig,
) -> anyhow::Result<(SessionId, SessionController<HttpBackend>)> {
    let session_id = resolve_session_id(&config.id_store())?;
    tracing::info!("Using session {session_id}");
    Ok((session_id, connect(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config_in(dir: &std::path::Path) -> EditorConfig {
        EditorConfig {
            api_base: "http://127.0.0.1:8000".to_string(),
            autosave_debounce: Duration::from_millis(700),
            request_timeout: Duration::from_secs(10),
            id_store_path: dir.join("ids.json"),
        }
    }

    #[test]
    fn test_open_session_reuses_stored_id() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let (first, _) = open_session(&config).unwrap();
        let (second, _) = open_session(&config).unwrap();
        assert_eq!(first, second);
        assert!(config.id_store_path.exists());
    }

    #[test]
    fn test_open_session_after_rotation_uses_new_id() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let (first, _) = open_session(&config).unwrap();
        let rotated = rotate_session_id(&config.id_store()).unwrap();
        let (second, _) = open_session(&config).unwrap();
        assert_ne!(first, rotated);
        assert_eq!(second, rotated);
    }
}
