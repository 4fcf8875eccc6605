use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::controller::ControllerConfig;
use crate::session_id::FileIdStore;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    pub api_base: String,
    pub autosave_debounce: Duration,
    pub request_timeout: Duration,
    /// File standing in for browser-local storage of the session id.
    pub id_store_path: PathBuf,
}

impl EditorConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str, default: u64| -> Result<Duration> {
            Ok(Duration::from_millis(match var(key) {
                Some(v) => v
                    .parse()
                    .with_context(|| format!("{key} must be a whole number of milliseconds"))?,
                None => default,
            }))
        };

        Ok(EditorConfig {
            api_base: var("EDITOR_API_BASE")
                .unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),
            autosave_debounce: millis("EDITOR_AUTOSAVE_DEBOUNCE_MS", 700)?,
            request_timeout: millis("EDITOR_REQUEST_TIMEOUT_MS", 10_000)?,
            id_store_path: var("EDITOR_ID_STORE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".resume-editor.json")),
        })
    }

    /// The store holding this client's session id.
    pub fn id_store(&self) -> FileIdStore {
        FileIdStore::new(&self.id_store_path)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            debounce: self.autosave_debounce,
            request_timeout: self.request_timeout,
            ..ControllerConfig::default()
        }
    }
}
