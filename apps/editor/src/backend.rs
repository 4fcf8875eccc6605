//! The HTTP surface the controller consumes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::BackendError;
use crate::models::{SaveAck, SessionSnapshotView, SnapshotReceipt, SnapshotSummary};
use crate::session_id::SessionId;

#[async_trait]
pub trait SessionBackend: Send + Sync + 'static {
    /// The backend answers an unknown session with an empty view. Any failure,
    /// a 404 included, is an error: the caller must not hydrate from nothing.
    async fn load_session(&self, id: SessionId) -> Result<SessionSnapshotView, BackendError>;

    async fn save_resume(
        &self,
        id: SessionId,
        text: &str,
        revision: u64,
    ) -> Result<SaveAck, BackendError>;

    /// Returns the assistant's reply, empty when it gave none.
    async fn send_chat(&self, id: SessionId, message: &str) -> Result<String, BackendError>;

    async fn snapshot(&self, id: SessionId) -> Result<SnapshotReceipt, BackendError>;

    async fn list_snapshots(&self, id: SessionId) -> Result<Vec<SnapshotSummary>, BackendError>;
}

#[async_trait]
impl<T: SessionBackend + ?Sized> SessionBackend for Arc<T> {
    async fn load_session(&self, id: SessionId) -> Result<SessionSnapshotView, BackendError> {
        (**self).load_session(id).await
    }

    async fn save_resume(
        &self,
        id: SessionId,
        text: &str,
        revision: u64,
    ) -> Result<SaveAck, BackendError> {
        (**self).save_resume(id, text, revision).await
    }

    async fn send_chat(&self, id: SessionId, message: &str) -> Result<String, BackendError> {
        (**self).send_chat(id, message).await
    }

    async fn snapshot(&self, id: SessionId) -> Result<SnapshotReceipt, BackendError> {
        (**self).snapshot(id).await
    }

    async fn list_snapshots(&self, id: SessionId) -> Result<Vec<SnapshotSummary>, BackendError> {
        (**self).list_snapshots(id).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatReply {
    assistant_message: Option<String>,
}

/// `SessionBackend` over HTTP, paths relative to a base URL.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Pulls a human-readable message out of an error body.
/// Understands `{"error":{"message"}}`, `{"message"}` and `{"detail"}`.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .or_else(|| v.get("detail"))
        })
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed: {status}"))
}

async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::CONFLICT {
        if let Some(current) = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("currentRevision").and_then(Value::as_u64))
        {
            return Err(BackendError::Stale { current });
        }
    }
    Err(BackendError::Status {
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn load_session(&self, id: SessionId) -> Result<SessionSnapshotView, BackendError> {
        let response = self.client.get(self.url(&format!("/session/{id}"))).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn save_resume(
        &self,
        id: SessionId,
        text: &str,
        revision: u64,
    ) -> Result<SaveAck, BackendError> {
        let response = self
            .client
            .put(self.url(&format!("/resume/{id}")))
            .json(&json!({ "text": text, "revision": revision }))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn send_chat(&self, id: SessionId, message: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .post(self.url("/chat"))
            .json(&json!({ "sessionId": id, "message": message }))
            .send()
            .await?;
        let reply: ChatReply = check(response).await?.json().await?;
        Ok(reply.assistant_message.unwrap_or_default())
    }

    async fn snapshot(&self, id: SessionId) -> Result<SnapshotReceipt, BackendError> {
        let response = self
            .client
            .post(self.url(&format!("/snapshot/{id}")))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn list_snapshots(&self, id: SessionId) -> Result<Vec<SnapshotSummary>, BackendError> {
        let response = self
            .client
            .get(self.url(&format!("/snapshots/{id}")))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}
