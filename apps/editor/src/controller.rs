//! SessionController — mediates every durability-affecting operation for a session.
//!
//! Autosave is a coalescing debounce, not a queue: each edit restarts the timer and
//! replaces the pending text, so only the last edit in a window reaches the backend.
//! Saves are single-flight per session; text debounced while a save is in flight is
//! parked and sent once it completes. Failed saves are not retried automatically.
//!
//! All methods that start background work must be called from within a Tokio runtime.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::SessionBackend;
use crate::errors::{BackendError, ChatError, LoadError, SaveError, SnapshotError};
use crate::indicator::SaveIndicator;
use crate::models::{ChatMessage, Role, SessionSnapshotView, SnapshotReceipt, SnapshotSummary};
use crate::quick_actions::QuickAction;
use crate::session_id::SessionId;

/// Transcript entry appended when the assistant cannot be reached.
pub const CHAT_FAILURE_TEXT: &str = "⚠️ Failed to reach assistant.";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub debounce: Duration,
    /// How long `Saved` stays visible.
    pub saved_display: Duration,
    /// How long `Error` stays visible.
    pub error_display: Duration,
    /// Upper bound on any single backend call.
    pub request_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(700),
            saved_display: Duration::from_millis(1000),
            error_display: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(10),
        }
    }
}

struct Slot {
    /// Bumped on every schedule and flush. A timer whose generation no longer
    /// matches has been superseded and does nothing when it fires.
    generation: u64,
    pending: Option<String>,
    timer: Option<JoinHandle<()>>,
    /// Debounced text waiting for the in-flight save.
    parked: Option<String>,
    busy: watch::Sender<bool>,
    /// Last revision handed to the backend, or learned from it.
    revision: u64,
    autosave_status: Status,
    snapshot_status: Status,
}

/// A status channel whose settled states fall back to `Idle`. The epoch is
/// bumped on every transition so an outdated fallback does nothing.
struct Status {
    epoch: u64,
    tx: watch::Sender<SaveIndicator>,
}

impl Status {
    fn new() -> Self {
        Self {
            epoch: 0,
            tx: watch::channel(SaveIndicator::Idle).0,
        }
    }
}

type StatusOf = fn(&mut Slot) -> &mut Status;

fn autosave_status(slot: &mut Slot) -> &mut Status {
    &mut slot.autosave_status
}

fn snapshot_status(slot: &mut Slot) -> &mut Status {
    &mut slot.snapshot_status
}

impl Slot {
    fn new() -> Self {
        Self {
            generation: 0,
            pending: None,
            timer: None,
            parked: None,
            busy: watch::channel(false).0,
            revision: 0,
            autosave_status: Status::new(),
            snapshot_status: Status::new(),
        }
    }

    fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }
}

struct Inner<B> {
    backend: B,
    config: ControllerConfig,
    slots: Mutex<HashMap<SessionId, Slot>>,
}

pub struct SessionController<B: SessionBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: SessionBackend> Clone for SessionController<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: SessionBackend> SessionController<B> {
    pub fn new(backend: B, config: ControllerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Fetches `{resume, chat}` for hydration. An unknown session is an empty view.
    ///
    /// The returned revision seeds this controller's write counter, so later
    /// autosaves land above whatever the backend already holds.
    pub async fn load_session(&self, id: SessionId) -> Result<SessionSnapshotView, LoadError> {
        let view = self
            .inner
            .timed(self.inner.backend.load_session(id))
            .await
            .map_err(|source| LoadError {
                session_id: id,
                source,
            })?;

        let mut slots = self.inner.slots();
        let slot = slots.entry(id).or_insert_with(Slot::new);
        slot.revision = slot.revision.max(view.revision);
        debug!(
            "Loaded session {id} (revision {}, {} chat entries)",
            view.revision,
            view.chat_log.len()
        );
        Ok(view)
    }

    /// Records intent to persist `text`. Restarts the debounce window; any earlier
    /// text still waiting in the window is discarded.
    pub fn schedule_autosave(&self, id: SessionId, text: impl Into<String>) {
        let mut slots = self.inner.slots();
        let slot = slots.entry(id).or_insert_with(Slot::new);

        slot.generation += 1;
        slot.pending = Some(text.into());
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }

        let generation = slot.generation;
        let delay = self.inner.config.debounce;
        let inner = Arc::clone(&self.inner);
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(id, generation).await;
        }));
    }

    /// Writes any pending autosave now instead of waiting for the debounce, then
    /// waits until no save for the session is in flight.
    ///
    /// The save itself runs on its own task, so dropping this future (for example
    /// under a timeout) only stops the waiting.
    pub async fn flush_autosave(&self, id: SessionId) {
        let (text, mut busy) = {
            let mut slots = self.inner.slots();
            let Some(slot) = slots.get_mut(&id) else {
                return;
            };
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
            slot.generation += 1;

            let busy = slot.busy.subscribe();
            let text = match slot.pending.take() {
                Some(text) if !slot.is_busy() => {
                    slot.busy.send_replace(true);
                    Some(text)
                }
                Some(text) => {
                    slot.parked = Some(text);
                    None
                }
                None => None,
            };
            (text, busy)
        };

        if let Some(text) = text {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_saves(id, text).await });
        }
        let _ = busy.wait_for(|in_flight| !*in_flight).await;
    }

    /// Current autosave indicator for a session.
    pub fn indicator(&self, id: SessionId) -> SaveIndicator {
        self.inner
            .slots()
            .get(&id)
            .map(|slot| *slot.autosave_status.tx.borrow())
            .unwrap_or_default()
    }

    /// Watches the autosave indicator for a session.
    pub fn subscribe_indicator(&self, id: SessionId) -> watch::Receiver<SaveIndicator> {
        self.inner
            .slots()
            .entry(id)
            .or_insert_with(Slot::new)
            .autosave_status
            .tx
            .subscribe()
    }

    /// Current state of the explicit snapshot button. Independent of autosave.
    pub fn snapshot_indicator(&self, id: SessionId) -> SaveIndicator {
        self.inner
            .slots()
            .get(&id)
            .map(|slot| *slot.snapshot_status.tx.borrow())
            .unwrap_or_default()
    }

    /// Asks the backend to archive what it currently holds for the session.
    ///
    /// Reads server state, not any local buffer: an autosave still in its
    /// debounce window is not included.
    ///
    /// Drives the snapshot indicator through `Saving` to `Saved` or `Error`.
    pub async fn commit_snapshot(&self, id: SessionId) -> Result<SnapshotReceipt, SnapshotError> {
        self.inner.show_with(id, snapshot_status, SaveIndicator::Saving, None);

        match self.inner.timed(self.inner.backend.snapshot(id)).await {
            Ok(receipt) => {
                info!(
                    "Snapshot committed for session {id} ({} messages)",
                    receipt.count_messages
                );
                let hold = self.inner.config.saved_display;
                self.inner.show_with(id, snapshot_status, SaveIndicator::Saved, Some(hold));
                Ok(receipt)
            }
            Err(source) => {
                let hold = self.inner.config.error_display;
                self.inner.show_with(id, snapshot_status, SaveIndicator::Error, Some(hold));
                Err(SnapshotError {
                    session_id: id,
                    source,
                })
            }
        }
    }

    /// Fire-and-forget snapshot for page hide or close. May silently fail: the
    /// outcome is only logged.
    pub fn best_effort_snapshot(&self, id: SessionId) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match inner.timed(inner.backend.snapshot(id)).await {
                Ok(_) => debug!("Best-effort snapshot for session {id} delivered"),
                Err(e) => warn!("Best-effort snapshot for session {id} failed: {e}"),
            }
        });
    }

    pub async fn list_snapshots(&self, id: SessionId) -> Result<Vec<SnapshotSummary>, SnapshotError> {
        self.inner
            .timed(self.inner.backend.list_snapshots(id))
            .await
            .map_err(|source| SnapshotError {
                session_id: id,
                source,
            })
    }

    /// Sends one chat message.
    ///
    /// Appends exactly one user entry, then exactly one assistant entry: the reply
    /// on success, or [`CHAT_FAILURE_TEXT`] on failure. Empty messages leave the
    /// transcript untouched.
    pub async fn send_chat(
        &self,
        id: SessionId,
        transcript: &mut Vec<ChatMessage>,
        message: &str,
    ) -> Result<(), ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        transcript.push(ChatMessage::now(Role::User, message));

        match self.inner.timed(self.inner.backend.send_chat(id, message)).await {
            Ok(reply) => {
                let reply = if reply.trim().is_empty() {
                    "(no reply)".to_string()
                } else {
                    reply
                };
                transcript.push(ChatMessage::now(Role::Assistant, reply));
                Ok(())
            }
            Err(source) => {
                warn!("Chat for session {id} failed: {source}");
                transcript.push(ChatMessage::now(Role::Assistant, CHAT_FAILURE_TEXT));
                Err(ChatError::Backend {
                    session_id: id,
                    source,
                })
            }
        }
    }

    /// Runs a selection action through the assistant and returns its suggestion,
    /// or `None` when the reply is empty.
    ///
    /// On success the transcript gains a short user entry naming the action and
    /// one assistant entry. A failed request leaves the transcript untouched.
    pub async fn ask_about_selection(
        &self,
        id: SessionId,
        transcript: &mut Vec<ChatMessage>,
        action: QuickAction,
        selection: &str,
    ) -> Result<Option<String>, ChatError> {
        if selection.trim().is_empty() {
            return Err(ChatError::EmptySelection);
        }

        let prompt = action.prompt(selection);
        let reply = self
            .inner
            .timed(self.inner.backend.send_chat(id, &prompt))
            .await
            .map_err(|source| {
                warn!("{action:?} for session {id} failed: {source}");
                ChatError::Backend {
                    session_id: id,
                    source,
                }
            })?;

        let suggestion = Some(reply.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        transcript.push(ChatMessage::now(Role::User, action.transcript_entry(selection)));
        transcript.push(ChatMessage::now(
            Role::Assistant,
            suggestion.as_deref().unwrap_or(action.empty_reply()),
        ));
        Ok(suggestion)
    }

    /// Cancels every pending debounce. In-flight saves run to completion.
    pub fn shutdown(&self) {
        let mut slots = self.inner.slots();
        for slot in slots.values_mut() {
            slot.generation += 1;
            slot.pending = None;
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
        }
    }
}

impl<B: SessionBackend> Inner<B> {
    fn slots(&self) -> MutexGuard<'_, HashMap<SessionId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        let limit = self.config.request_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(BackendError::Timeout(limit)))
    }

    /// Debounce expiry. Does nothing if a later edit or flush superseded it.
    async fn fire(self: &Arc<Self>, id: SessionId, generation: u64) {
        let text = {
            let mut slots = self.slots();
            let Some(slot) = slots.get_mut(&id) else {
                return;
            };
            if slot.generation != generation {
                return;
            }
            slot.timer = None;
            let Some(text) = slot.pending.take() else {
                return;
            };
            if slot.is_busy() {
                debug!("Save in flight for session {id}; parking newer text");
                slot.parked = Some(text);
                return;
            }
            slot.busy.send_replace(true);
            text
        };
        self.run_saves(id, text).await;
    }

    /// Saves `text`, then keeps draining parked text until none is left.
    /// The caller must have marked the slot busy.
    async fn run_saves(self: &Arc<Self>, id: SessionId, mut text: String) {
        loop {
            let revision = {
                let mut slots = self.slots();
                let slot = slots.entry(id).or_insert_with(Slot::new);
                slot.revision += 1;
                self.show(slot, id, autosave_status, SaveIndicator::Saving, None);
                slot.revision
            };

            let result = self
                .timed(self.backend.save_resume(id, &text, revision))
                .await;

            let mut slots = self.slots();
            let slot = slots.entry(id).or_insert_with(Slot::new);
            match result {
                Ok(ack) => {
                    if let Some(stored) = ack.revision {
                        slot.revision = slot.revision.max(stored);
                    }
                    debug!("Autosaved session {id} at revision {revision}");
                    let hold = self.config.saved_display;
                    self.show(slot, id, autosave_status, SaveIndicator::Saved, Some(hold));
                }
                Err(BackendError::Stale { current }) if slot.parked.is_some() => {
                    // Newer local text is about to be written above `current`.
                    slot.revision = slot.revision.max(current);
                }
                Err(source) => {
                    if let BackendError::Stale { current } = &source {
                        slot.revision = slot.revision.max(*current);
                    }
                    let error = SaveError {
                        session_id: id,
                        revision,
                        source,
                    };
                    warn!("{error}");
                    let hold = self.config.error_display;
                    self.show(slot, id, autosave_status, SaveIndicator::Error, Some(hold));
                }
            }

            match slot.parked.take() {
                Some(next) => text = next,
                None => {
                    slot.busy.send_replace(false);
                    return;
                }
            }
        }
    }

    /// Sets a status and, with `hold`, schedules the return to `Idle`.
    /// A later transition cancels the pending return.
    fn show(
        self: &Arc<Self>,
        slot: &mut Slot,
        id: SessionId,
        which: StatusOf,
        state: SaveIndicator,
        hold: Option<Duration>,
    ) {
        let status = which(slot);
        status.epoch += 1;
        status.tx.send_replace(state);

        if let Some(hold) = hold {
            let epoch = status.epoch;
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(hold).await;
                if let Some(slot) = inner.slots().get_mut(&id) {
                    let status = which(slot);
                    if status.epoch == epoch {
                        status.tx.send_replace(SaveIndicator::Idle);
                    }
                }
            });
        }
    }

    fn show_with(
        self: &Arc<Self>,
        id: SessionId,
        which: StatusOf,
        state: SaveIndicator,
        hold: Option<Duration>,
    ) {
        let mut slots = self.slots();
        let slot = slots.entry(id).or_insert_with(Slot::new);
        self.show(slot, id, which, state, hold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::SaveAck;

    #[derive(Default)]
    struct FakeState {
        stored: Option<(String, u64)>,
        attempts: Vec<(String, u64)>,
        save_delay: Duration,
        in_flight: usize,
        max_in_flight: usize,
        fail_saves: bool,
        fail_load: bool,
        fail_chat: bool,
        empty_chat: bool,
        chat_prompts: Vec<String>,
        snapshot_delay: Duration,
        fail_snapshot: bool,
        snapshots: Vec<String>,
    }

    #[derive(Default)]
    struct FakeBackend {
        state: std::sync::Mutex<FakeState>,
    }

    impl FakeBackend {
        fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
            f(&mut self.state.lock().unwrap())
        }

        fn stored_text(&self) -> Option<String> {
            self.with(|s| s.stored.as_ref().map(|(text, _)| text.clone()))
        }

        fn attempted_texts(&self) -> Vec<String> {
            self.with(|s| s.attempts.iter().map(|(t, _)| t.clone()).collect())
        }
    }

    fn unavailable() -> BackendError {
        BackendError::Status {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[async_trait]
    impl SessionBackend for FakeBackend {
        async fn load_session(&self, _id: SessionId) -> Result<SessionSnapshotView, BackendError> {
            self.with(|s| {
                if s.fail_load {
                    return Err(unavailable());
                }
                let (resume_text, revision) = s.stored.clone().unwrap_or_default();
                Ok(SessionSnapshotView {
                    resume_text,
                    chat_log: Vec::new(),
                    revision,
                })
            })
        }

        async fn save_resume(
            &self,
            _id: SessionId,
            text: &str,
            revision: u64,
        ) -> Result<SaveAck, BackendError> {
            let delay = self.with(|s| {
                s.attempts.push((text.to_string(), revision));
                s.in_flight += 1;
                s.max_in_flight = s.max_in_flight.max(s.in_flight);
                s.save_delay
            });
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.with(|s| {
                s.in_flight -= 1;
                if s.fail_saves {
                    return Err(unavailable());
                }
                let current = s.stored.as_ref().map(|(_, r)| *r).unwrap_or(0);
                if revision <= current {
                    return Err(BackendError::Stale { current });
                }
                s.stored = Some((text.to_string(), revision));
                Ok(SaveAck {
                    saved: true,
                    updated_at: Some(0),
                    revision: Some(revision),
                })
            })
        }

        async fn send_chat(&self, _id: SessionId, message: &str) -> Result<String, BackendError> {
            self.with(|s| {
                s.chat_prompts.push(message.to_string());
                if s.fail_chat {
                    Err(unavailable())
                } else if s.empty_chat {
                    Ok(String::new())
                } else {
                    Ok(format!("Improved: {message}"))
                }
            })
        }

        async fn snapshot(&self, _id: SessionId) -> Result<SnapshotReceipt, BackendError> {
            let delay = self.with(|s| s.snapshot_delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.with(|s| {
                if s.fail_snapshot {
                    return Err(unavailable());
                }
                let resume = s.stored.as_ref().map(|(t, _)| t.clone()).unwrap_or_default();
                s.snapshots.push(resume);
                Ok(SnapshotReceipt {
                    snapshot_id: Some(Uuid::new_v4()),
                    taken_at: Some(Utc::now()),
                    count_messages: 0,
                })
            })
        }

        async fn list_snapshots(&self, id: SessionId) -> Result<Vec<SnapshotSummary>, BackendError> {
            self.with(|s| {
                Ok(s.snapshots
                    .iter()
                    .enumerate()
                    .map(|(i, _)| SnapshotSummary {
                        snapshot_id: Uuid::new_v4(),
                        session_id: id.as_uuid(),
                        taken_at: Utc::now(),
                        key: format!("snapshot-{i}"),
                    })
                    .collect())
            })
        }
    }

    fn controller(fake: &Arc<FakeBackend>) -> SessionController<Arc<FakeBackend>> {
        SessionController::new(Arc::clone(fake), ControllerConfig::default())
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    // ── autosave ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_only_last_edit_in_window_is_sent() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        advance(100).await;
        c.schedule_autosave(id, "AB");
        advance(100).await;
        c.schedule_autosave(id, "ABC");
        advance(1000).await;

        assert_eq!(fake.with(|s| s.attempts.clone()), vec![("ABC".to_string(), 1)]);
        assert_eq!(fake.stored_text().as_deref(), Some("ABC"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_edit_then_burst() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        advance(1000).await;
        assert_eq!(fake.stored_text().as_deref(), Some("A"));

        c.schedule_autosave(id, "AB");
        advance(50).await;
        c.schedule_autosave(id, "ABC");
        advance(1000).await;

        assert_eq!(fake.stored_text().as_deref(), Some("ABC"));
        assert_eq!(fake.attempted_texts(), vec!["A", "ABC"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_edit_restarts_the_window() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        advance(600).await;
        c.schedule_autosave(id, "B");
        advance(600).await;
        assert!(fake.attempted_texts().is_empty());

        advance(200).await;
        assert_eq!(fake.attempted_texts(), vec!["B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_cycles_back_to_idle() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.save_delay = Duration::from_millis(200));
        let c = controller(&fake);
        let id = SessionId::generate();
        let rx = c.subscribe_indicator(id);

        c.schedule_autosave(id, "A");
        assert_eq!(*rx.borrow(), SaveIndicator::Idle);
        advance(800).await;
        assert_eq!(*rx.borrow(), SaveIndicator::Saving);
        advance(200).await;
        assert_eq!(c.indicator(id), SaveIndicator::Saved);
        advance(1000).await;
        assert_eq!(c.indicator(id), SaveIndicator::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_is_not_retried_until_next_edit() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.fail_saves = true);
        let c = controller(&fake);
        let id = SessionId::generate();

        let buffer = String::from("draft");
        c.schedule_autosave(id, buffer.clone());
        advance(800).await;
        assert_eq!(c.indicator(id), SaveIndicator::Error);
        assert_eq!(buffer, "draft");

        advance(5000).await;
        assert_eq!(c.indicator(id), SaveIndicator::Idle);
        assert_eq!(fake.attempted_texts().len(), 1);

        fake.with(|s| s.fail_saves = false);
        c.schedule_autosave(id, "draft 2");
        advance(800).await;
        assert_eq!(fake.stored_text().as_deref(), Some("draft 2"));
        assert_eq!(c.indicator(id), SaveIndicator::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saves_are_single_flight_and_coalesced() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.save_delay = Duration::from_millis(2000));
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        advance(750).await; // "A" in flight until 2700
        c.schedule_autosave(id, "AB");
        advance(800).await; // "AB" debounced, parked
        c.schedule_autosave(id, "ABC");
        advance(800).await; // "ABC" debounced, replaces "AB"
        advance(3000).await;

        assert_eq!(
            fake.with(|s| s.attempts.clone()),
            vec![("A".to_string(), 1), ("ABC".to_string(), 2)]
        );
        assert_eq!(fake.with(|s| s.max_in_flight), 1);
        assert_eq!(fake.stored_text().as_deref(), Some("ABC"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_save_times_out_to_error() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.save_delay = Duration::from_secs(60));
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        advance(5000).await;
        assert_eq!(c.indicator(id), SaveIndicator::Saving);
        advance(6000).await;
        assert_eq!(c.indicator(id), SaveIndicator::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_revision_from_another_writer() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.stored = Some(("other tab".to_string(), 5)));
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        advance(800).await;
        assert_eq!(c.indicator(id), SaveIndicator::Error);
        assert_eq!(fake.stored_text().as_deref(), Some("other tab"));

        advance(2000).await;
        c.schedule_autosave(id, "AB");
        advance(800).await;
        assert_eq!(fake.with(|s| s.stored.clone()), Some(("AB".to_string(), 6)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_without_waiting() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        let started = tokio::time::Instant::now();
        c.flush_autosave(id).await;
        assert!(started.elapsed() < c.config().debounce);
        assert_eq!(fake.stored_text().as_deref(), Some("A"));

        advance(2000).await;
        assert_eq!(fake.attempted_texts(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_drains_in_flight_and_parked() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.save_delay = Duration::from_millis(500));
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        advance(800).await; // "A" in flight until 1200
        c.schedule_autosave(id, "AB");
        c.flush_autosave(id).await;

        assert_eq!(fake.stored_text().as_deref(), Some("AB"));
        assert_eq!(fake.attempted_texts(), vec!["A", "AB"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_flush_does_not_stall_autosave() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.save_delay = Duration::from_millis(500));
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        let waited = tokio::time::timeout(Duration::from_millis(100), c.flush_autosave(id)).await;
        assert!(waited.is_err());

        c.schedule_autosave(id, "AB");
        advance(5000).await;

        assert_eq!(fake.attempted_texts(), vec!["A", "AB"]);
        assert_eq!(fake.stored_text().as_deref(), Some("AB"));
        assert_eq!(c.indicator(id), SaveIndicator::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_pending_edits() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        c.shutdown();
        advance(2000).await;
        assert!(fake.attempted_texts().is_empty());
    }

    // ── load ───────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_unknown_session_loads_empty() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let view = c.load_session(SessionId::generate()).await.unwrap();
        assert!(view.is_empty());
        assert_eq!(view.revision, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_is_load_error() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.fail_load = true);
        let c = controller(&fake);
        let id = SessionId::generate();

        let err = c.load_session(id).await.unwrap_err();
        assert_eq!(err.session_id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_seeds_revision_for_next_save() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.stored = Some(("old".to_string(), 4)));
        let c = controller(&fake);
        let id = SessionId::generate();

        let view = c.load_session(id).await.unwrap();
        assert_eq!(view.resume_text, "old");

        c.schedule_autosave(id, "new");
        advance(800).await;
        assert_eq!(fake.with(|s| s.stored.clone()), Some(("new".to_string(), 5)));
        assert_eq!(c.indicator(id), SaveIndicator::Saved);
    }

    // ── snapshots ──────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_is_unaffected_by_later_edits() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "ABC");
        advance(800).await;
        c.commit_snapshot(id).await.unwrap();

        c.schedule_autosave(id, "ABCD");
        advance(800).await;

        assert_eq!(fake.with(|s| s.snapshots.clone()), vec!["ABC"]);
        assert_eq!(fake.stored_text().as_deref(), Some("ABCD"));
        assert_eq!(c.list_snapshots(id).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reads_backend_not_pending_text() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let id = SessionId::generate();

        c.schedule_autosave(id, "A");
        advance(800).await;
        c.schedule_autosave(id, "AB");
        c.commit_snapshot(id).await.unwrap();

        assert_eq!(fake.with(|s| s.snapshots.clone()), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_failure_is_reported() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.fail_snapshot = true);
        let c = controller(&fake);
        let id = SessionId::generate();

        let err = c.commit_snapshot(id).await.unwrap_err();
        assert_eq!(err.session_id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_indicator_cycles_independently() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.snapshot_delay = Duration::from_millis(200));
        let c = controller(&fake);
        let id = SessionId::generate();

        let pending = tokio::spawn({
            let c = c.clone();
            async move { c.commit_snapshot(id).await }
        });
        advance(100).await;
        assert_eq!(c.snapshot_indicator(id), SaveIndicator::Saving);
        assert_eq!(c.indicator(id), SaveIndicator::Idle);

        pending.await.unwrap().unwrap();
        assert_eq!(c.snapshot_indicator(id), SaveIndicator::Saved);
        assert_eq!(c.snapshot_indicator(id).snapshot_label(), "Snapshot saved ✓");
        advance(1100).await;
        assert_eq!(c.snapshot_indicator(id), SaveIndicator::Idle);

        fake.with(|s| s.fail_snapshot = true);
        c.commit_snapshot(id).await.unwrap_err();
        assert_eq!(c.snapshot_indicator(id), SaveIndicator::Error);
        advance(1600).await;
        assert_eq!(c.snapshot_indicator(id), SaveIndicator::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_snapshot_swallows_failure() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.fail_snapshot = true);
        let c = controller(&fake);
        let id = SessionId::generate();

        c.best_effort_snapshot(id);
        advance(10).await;
        assert!(fake.with(|s| s.snapshots.is_empty()));

        fake.with(|s| s.fail_snapshot = false);
        c.best_effort_snapshot(id);
        advance(10).await;
        assert_eq!(fake.with(|s| s.snapshots.len()), 1);
    }

    // ── chat ───────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_chat_appends_user_then_assistant() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let mut transcript = Vec::new();

        c.send_chat(SessionId::generate(), &mut transcript, "  Led a team  ")
            .await
            .unwrap();

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[0].text, "Led a team");
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].text, "Improved: Led a team");
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_failure_appends_error_entry() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.fail_chat = true);
        let c = controller(&fake);
        let mut transcript = Vec::new();

        let err = c
            .send_chat(SessionId::generate(), &mut transcript, "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Backend { .. }));
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].text, CHAT_FAILURE_TEXT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_chat_message_leaves_transcript_alone() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let mut transcript = Vec::new();

        let err = c
            .send_chat(SessionId::generate(), &mut transcript, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert!(transcript.is_empty());
    }

    // ── selection actions ──────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_selection_action_records_label_and_suggestion() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let mut transcript = Vec::new();

        let suggestion = c
            .ask_about_selection(
                SessionId::generate(),
                &mut transcript,
                QuickAction::Shorten,
                "Built a cache",
            )
            .await
            .unwrap();

        let prompt = fake.with(|s| s.chat_prompts[0].clone());
        assert_eq!(prompt, QuickAction::Shorten.prompt("Built a cache"));
        assert_eq!(suggestion, Some(format!("Improved: {prompt}")));
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[0].text, "[SHORTEN] on selection:\nBuilt a cache");
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(Some(transcript[1].text.clone()), suggestion);
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_action_empty_reply() {
        let fake = Arc::new(FakeBackend::default());
        fake.with(|s| s.empty_chat = true);
        let c = controller(&fake);
        let mut transcript = Vec::new();

        let ideas = c
            .ask_about_selection(
                SessionId::generate(),
                &mut transcript,
                QuickAction::MetricsHelper,
                "Cut costs",
            )
            .await
            .unwrap();

        assert_eq!(ideas, None);
        assert_eq!(transcript[0].text, "[METRICS HELPER] for selection:\nCut costs");
        assert_eq!(transcript[1].text, "(no metrics ideas)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_action_failure_and_empty_selection() {
        let fake = Arc::new(FakeBackend::default());
        let c = controller(&fake);
        let id = SessionId::generate();
        let mut transcript = Vec::new();

        let err = c
            .ask_about_selection(id, &mut transcript, QuickAction::Star, "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptySelection));
        assert!(fake.with(|s| s.chat_prompts.is_empty()));

        fake.with(|s| s.fail_chat = true);
        let err = c
            .ask_about_selection(id, &mut transcript, QuickAction::Star, "Led a team")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Backend { .. }));
        assert!(transcript.is_empty());
    }
}
