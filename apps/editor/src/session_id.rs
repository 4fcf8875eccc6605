//! Session identity: a client-minted random id kept in local storage.
//!
//! The backend never issues ids. [`IdStore`] stands in for the browser's local
//! storage so the bootstrap can run against a file, or memory in tests.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{InvalidSessionId, SessionIdError};

/// Well-known local storage key holding the current session id.
pub const SESSION_ID_KEY: &str = "sessionId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Mints a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Uuid::parse_str(s.trim())?;
        if id.is_nil() {
            return Err(InvalidSessionId::Nil);
        }
        Ok(Self(id))
    }
}

pub trait IdStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SessionIdError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionIdError>;
}

/// Returns the stored session id, minting and persisting one if none is stored.
///
/// A missing or malformed stored value is replaced; the function never hands out
/// an empty or unparsable id.
pub fn resolve_session_id(store: &dyn IdStore) -> Result<SessionId, SessionIdError> {
    if let Some(raw) = store.get(SESSION_ID_KEY)? {
        match raw.parse::<SessionId>() {
            Ok(id) => return Ok(id),
            Err(e) => warn!("Discarding malformed stored session id {raw:?}: {e}"),
        }
    }
    rotate_session_id(store)
}

/// Mints a new session id and makes it the current one. The previous session's
/// server-side data is left alone.
pub fn rotate_session_id(store: &dyn IdStore) -> Result<SessionId, SessionIdError> {
    let id = SessionId::generate();
    store.set(SESSION_ID_KEY, &id.to_string())?;
    info!("Started session {id}");
    Ok(id)
}

// ────────────────────────────────────────────────────────────────────────────
// Stores
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryIdStore {
    values: Mutex<HashMap<String, String>>,
}

impl IdStore for MemoryIdStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionIdError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionIdError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON object on disk. Writes go through a temp file and rename.
pub struct FileIdStore {
    path: PathBuf,
}

impl FileIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, SessionIdError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl IdStore for FileIdStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionIdError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionIdError> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
