use std::time::Duration;

use thiserror::Error;

use crate::session_id::SessionId;

/// Failure of a single call to the session backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("stale revision (backend holds {current})")]
    Stale { current: u64 },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Session hydration failed. The caller must not proceed with stale local state.
#[derive(Debug, Error)]
#[error("failed to load session {session_id}: {source}")]
pub struct LoadError {
    pub session_id: SessionId,
    #[source]
    pub source: BackendError,
}

/// An autosave write failed. Non-fatal: the next edit retries with the latest text.
#[derive(Debug, Error)]
#[error("failed to save session {session_id} at revision {revision}: {source}")]
pub struct SaveError {
    pub session_id: SessionId,
    pub revision: u64,
    #[source]
    pub source: BackendError,
}

/// An explicit snapshot failed. Non-fatal; retry is up to the user.
#[derive(Debug, Error)]
#[error("failed to snapshot session {session_id}: {source}")]
pub struct SnapshotError {
    pub session_id: SessionId,
    #[source]
    pub source: BackendError,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat message is empty")]
    EmptyMessage,

    #[error("no text selected")]
    EmptySelection,

    #[error("assistant unreachable for session {session_id}: {source}")]
    Backend {
        session_id: SessionId,
        #[source]
        source: BackendError,
    },
}

#[derive(Debug, Error)]
pub enum SessionIdError {
    #[error("session id store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session id store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum InvalidSessionId {
    #[error("malformed session id: {0}")]
    Malformed(#[from] uuid::Error),

    #[error("nil session id")]
    Nil,
}
