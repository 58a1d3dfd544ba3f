//! # Collaboration Session
//!
//! Client side of the partitioned sync protocol for one project.
//!
//! ## Lifecycle
//!
//! `stopped → starting → active → stopping → stopped`. `start` authenticates
//! over the transport, subscribes to the configured partitions and waits for
//! the first sync response; any failure on the way, including a server
//! refusal of the partitions, leaves the session `stopped`. `stop` is
//! idempotent.
//!
//! ## Reconnect
//!
//! While active, a supervisor task watches the transport. When the link
//! drops the session turns `reconnecting`, retries the handshake with the
//! backoff of its `ReconnectPolicy` and resumes from the observed cursor.
//! A refusal, a disabled policy or running out of attempts ends in
//! `stopped` with the cause as the last error.
//!
//! ## Drafts
//!
//! `submit_legacy_command` only queues. `flush_drafts` sends a snapshot of
//! the queue in submission order and removes each draft once its send
//! succeeded, so a transport failure leaves the unsent tail queued and drafts
//! submitted during a flush wait for the next one.
//!
//! ## Convergence
//!
//! Committed events reach the session as `committed` pushes or inside a
//! `sync_response`. Each one past the observed cursor is folded into the
//! projected state and advances the cursor. `sync_now` asks the server for
//! its head cursor and waits until the observed cursor reaches it.
//!
//! The persisted cursor is only adopted when the projection was seeded with
//! `with_initial_state`; an unseeded session replays from its own cursor so
//! the state it builds is complete.

use crate::config::{DraftPolicy, SessionConfig};
use crate::cursor_store::{cursor_key, CursorStore, MemoryCursorStore};
use crate::errors::CollabError;
use crate::projection;
use routevn_protocol::{
    Actor, ClientMessage, Command, CommandBuilder, CommittedEvent, ConnectionState, LegacyEvent,
    MessageSubscription, ServerMessage, SubmitStatus, Transport, TransportError,
};
use routevn_tree::TreeCollection;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

const COMMITTED_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Stopped,
    Starting,
    Active,
    Reconnecting,
    Stopping,
}

/// Who the server authenticated this session as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    pub client_id: String,
}

/// Most recent failure reported by the server or the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub code: String,
    pub message: String,
}

/// A submitted command the server refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRejection {
    pub command_id: String,
    pub reason: String,
    pub message: String,
}

type HandshakeResult = Result<SessionIdentity, LastError>;
type SyncResult = Result<u64, LastError>;

struct SessionState {
    status: SessionStatus,
    identity: Option<SessionIdentity>,
    drafts: Vec<Command>,
    last_error: Option<LastError>,
    rejections: Vec<CommandRejection>,
    projection: Value,
    observed_cursor: u64,
    handshake: Option<oneshot::Sender<HandshakeResult>>,
    pending_syncs: HashMap<String, oneshot::Sender<SyncResult>>,
}

/// Connection-facing half of the session, shared with the transport's
/// message handler and the reconnect supervisor
struct Shared {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
    subscription: Mutex<Option<MessageSubscription>>,
    cursor: watch::Sender<u64>,
    committed: broadcast::Sender<CommittedEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn status(&self) -> SessionStatus {
        self.lock().status
    }

    fn observed_cursor(&self) -> u64 {
        self.lock().observed_cursor
    }

    fn handle(&self, message: &ServerMessage) {
        let mut state = self.lock();

        match message {
            ServerMessage::Connected { user_id, client_id } => {
                let identity = SessionIdentity {
                    user_id: user_id.clone(),
                    client_id: client_id.clone(),
                };
                tracing::info!(user_id = %user_id, client_id = %client_id, "session authenticated");
                state.identity = Some(identity.clone());
                if let Some(handshake) = state.handshake.take() {
                    let _ = handshake.send(Ok(identity));
                }
            }

            // Errors carry no request id, so every outstanding wait fails
            ServerMessage::Error { code, message } => {
                tracing::warn!(code = %code, message = %message, "server error");
                let error = LastError {
                    code: code.clone(),
                    message: message.clone(),
                };
                state.last_error = Some(error.clone());
                if let Some(handshake) = state.handshake.take() {
                    let _ = handshake.send(Err(error.clone()));
                }
                for (_, waiter) in state.pending_syncs.drain() {
                    let _ = waiter.send(Err(error.clone()));
                }
            }

            ServerMessage::SubmitResult {
                command_id,
                status,
                reason,
                message,
                cursor,
            } => match status {
                SubmitStatus::Rejected => {
                    let rejection = CommandRejection {
                        command_id: command_id.clone(),
                        reason: reason.clone().unwrap_or_else(|| "validation_failed".to_string()),
                        message: message.clone().unwrap_or_default(),
                    };
                    tracing::warn!(
                        command_id = %command_id,
                        reason = %rejection.reason,
                        "command rejected"
                    );
                    state.last_error = Some(LastError {
                        code: rejection.reason.clone(),
                        message: rejection.message.clone(),
                    });
                    state.rejections.push(rejection);
                }
                SubmitStatus::Accepted | SubmitStatus::Duplicate => {
                    tracing::debug!(command_id = %command_id, ?status, ?cursor, "command acknowledged");
                }
            },

            ServerMessage::Committed { event } => {
                self.apply_committed(&mut state, event);
            }

            ServerMessage::SyncResponse {
                request_id,
                cursor,
                events,
            } => {
                for event in events {
                    self.apply_committed(&mut state, event);
                }
                tracing::debug!(request_id = %request_id, cursor, events = events.len(), "sync response");
                if let Some(waiter) = state.pending_syncs.remove(request_id) {
                    let _ = waiter.send(Ok(*cursor));
                }
            }
        }
    }

    /// Fold one committed event into the projection. Events at or below the
    /// observed cursor were already applied and are skipped.
    fn apply_committed(&self, state: &mut SessionState, event: &CommittedEvent) {
        if event.cursor <= state.observed_cursor {
            return;
        }

        match event.event.legacy_event() {
            Ok(legacy) => {
                state.projection = projection::apply_event(&state.projection, &legacy);
            }
            Err(e) => {
                tracing::warn!(command_id = %event.command_id, error = ?e, "committed event is not a legacy event");
            }
        }

        state.observed_cursor = event.cursor;
        self.cursor.send_replace(event.cursor);
        let _ = self.committed.send(event.clone());
    }

    /// Connect, authenticate, then sync from `since` and wait for the
    /// response, which also proves the partitions were accepted.
    async fn establish(self: &Arc<Self>, since: u64) -> Result<SessionIdentity, CollabError> {
        let (handshake_tx, handshake_rx) = oneshot::channel();
        self.lock().handshake = Some(handshake_tx);
        self.attach_handler();

        let identity = self.handshake(handshake_rx).await?;

        let request_id = Uuid::new_v4().to_string();
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.lock().pending_syncs.insert(request_id.clone(), waiter_tx);
        self.send_sync(request_id, since).await?;

        let timeout = self.config.handshake_timeout();
        let head = sync_outcome(tokio::time::timeout(timeout, waiter_rx).await, timeout)?;
        tracing::debug!(since, head, "initial sync complete");
        Ok(identity)
    }

    fn attach_handler(self: &Arc<Self>) {
        let shared = Arc::downgrade(self);
        let subscription = self.transport.on_message(Arc::new(move |message: &ServerMessage| {
            if let Some(shared) = shared.upgrade() {
                shared.handle(message);
            }
        }));
        *self.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);
    }

    async fn handshake(
        &self,
        handshake_rx: oneshot::Receiver<HandshakeResult>,
    ) -> Result<SessionIdentity, CollabError> {
        self.transport.connect().await?;
        self.transport
            .send(ClientMessage::Connect {
                token: self.config.token.clone(),
            })
            .await?;

        let timeout = self.config.handshake_timeout();
        match tokio::time::timeout(timeout, handshake_rx).await {
            Err(_) => Err(CollabError::Timeout(timeout)),
            Ok(Err(_)) => Err(CollabError::Disconnected),
            Ok(Ok(Err(error))) => Err(CollabError::Auth {
                code: error.code,
                message: error.message,
            }),
            Ok(Ok(Ok(identity))) => Ok(identity),
        }
    }

    async fn send_sync(&self, request_id: String, since: u64) -> Result<(), TransportError> {
        self.transport
            .send(ClientMessage::Sync {
                request_id,
                partitions: self.config.resolved_partitions(),
                since,
            })
            .await
    }

    fn persist_cursor(&self, store: &dyn CursorStore) {
        let cursor = self.observed_cursor();
        let key = cursor_key(&self.config.project_id);
        if let Err(e) = store.save(&key, cursor) {
            tracing::warn!(key = %key, cursor, error = %e, "failed to persist cursor");
        }
    }

    fn record_error(&self, error: &CollabError) {
        self.lock().last_error = Some(LastError {
            code: error.code().to_string(),
            message: error.to_string(),
        });
    }

    /// Detach, disconnect and forget everything tied to the connection,
    /// leaving the session in `status`
    async fn release(&self, status: SessionStatus) {
        let subscription = self.subscription.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(subscription);

        if let Err(e) = self.transport.disconnect().await {
            tracing::warn!(error = %e, "disconnect failed");
        }

        let mut state = self.lock();
        state.handshake = None;
        state.pending_syncs.clear();
        state.identity = None;
        state.status = status;
    }
}

fn sync_outcome(
    waited: Result<Result<SyncResult, oneshot::error::RecvError>, tokio::time::error::Elapsed>,
    timeout: Duration,
) -> Result<u64, CollabError> {
    match waited {
        Err(_) => Err(CollabError::Timeout(timeout)),
        Ok(Err(_)) => Err(CollabError::Disconnected),
        Ok(Ok(Err(error))) => Err(CollabError::Server {
            code: error.code,
            message: error.message,
        }),
        Ok(Ok(Ok(head))) => Ok(head),
    }
}

/// Watch the link of an active session and bring it back when it drops
async fn supervise(shared: Arc<Shared>, cursor_store: Arc<dyn CursorStore>) {
    let mut link = shared.transport.connection_state();
    loop {
        let dropped = link
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await
            .map(|_| ());
        if dropped.is_err() || shared.status() != SessionStatus::Active {
            return;
        }

        tracing::warn!(project_id = %shared.config.project_id, cursor = shared.observed_cursor(), "connection lost");
        shared.release(SessionStatus::Reconnecting).await;

        if let Err(e) = reconnect(&shared).await {
            tracing::warn!(project_id = %shared.config.project_id, error = %e, "reconnect abandoned");
            shared.record_error(&e);
            shared.persist_cursor(cursor_store.as_ref());
            shared.release(SessionStatus::Stopped).await;
            return;
        }
    }
}

async fn reconnect(shared: &Arc<Shared>) -> Result<(), CollabError> {
    let policy = &shared.config.reconnect;
    let mut attempt = 0;
    loop {
        attempt += 1;
        if !policy.allows(attempt) {
            return Err(CollabError::Disconnected);
        }

        let delay = policy.delay_for_attempt(attempt);
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        tokio::time::sleep(delay).await;

        let since = shared.observed_cursor();
        match shared.establish(since).await {
            Ok(identity) => {
                shared.lock().status = SessionStatus::Active;
                tracing::info!(
                    project_id = %shared.config.project_id,
                    user_id = %identity.user_id,
                    attempt,
                    since,
                    "session reconnected"
                );
                return Ok(());
            }
            Err(e) if e.is_refusal() => return Err(e),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                shared.release(SessionStatus::Reconnecting).await;
            }
        }
    }
}

/// One user's live connection to a project
pub struct CollabSession {
    shared: Arc<Shared>,
    cursor_store: Arc<dyn CursorStore>,
    seeded: bool,
    builder: Mutex<CommandBuilder>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    lifecycle: tokio::sync::Mutex<()>,
    flush_gate: tokio::sync::Mutex<()>,
}

impl CollabSession {
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        let (cursor, _) = watch::channel(0);
        let (committed, _) = broadcast::channel(COMMITTED_CHANNEL_CAPACITY);
        let builder = CommandBuilder::new(config.project_id.clone(), config.actor.clone());

        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                state: Mutex::new(SessionState {
                    status: SessionStatus::Stopped,
                    identity: None,
                    drafts: Vec::new(),
                    last_error: None,
                    rejections: Vec::new(),
                    projection: projection::empty_state(),
                    observed_cursor: 0,
                    handshake: None,
                    pending_syncs: HashMap::new(),
                }),
                subscription: Mutex::new(None),
                cursor,
                committed,
            }),
            cursor_store: Arc::new(MemoryCursorStore::new()),
            seeded: false,
            builder: Mutex::new(builder),
            supervisor: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            flush_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_cursor_store(mut self, store: Arc<dyn CursorStore>) -> Self {
        self.cursor_store = store;
        self
    }

    /// Seed the projection with a snapshot saved alongside the persisted
    /// cursor. Only a seeded session resumes from that cursor.
    pub fn with_initial_state(mut self, state: Value) -> Self {
        self.shared.lock().projection = state;
        self.seeded = true;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Authenticate, subscribe and catch up. A no-op while active or
    /// reconnecting.
    pub async fn start(&self) -> Result<(), CollabError> {
        let _lifecycle = self.lifecycle.lock().await;
        if matches!(self.status(), SessionStatus::Active | SessionStatus::Reconnecting) {
            return Ok(());
        }

        let project_id = &self.shared.config.project_id;
        let since = match self.resume_cursor() {
            Ok(since) => since,
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "session start failed");
                self.shared.record_error(&e);
                return Err(e);
            }
        };

        self.shared.lock().status = SessionStatus::Starting;
        tracing::info!(project_id = %project_id, url = %self.shared.config.url, since, "session starting");

        let identity = match self.shared.establish(since).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "session start failed");
                self.shared.record_error(&e);
                self.shared.release(SessionStatus::Stopped).await;
                return Err(e);
            }
        };

        self.shared.lock().status = SessionStatus::Active;
        self.spawn_supervisor();
        tracing::info!(
            project_id = %project_id,
            user_id = %identity.user_id,
            cursor = self.observed_cursor(),
            "session active"
        );
        Ok(())
    }

    /// Queue a command for the next flush. Returns `false` if a draft with
    /// the same id is already queued.
    pub fn submit_legacy_command(&self, command: Command) -> bool {
        let mut state = self.shared.lock();
        if state.drafts.iter().any(|draft| draft.id == command.id) {
            tracing::debug!(command_id = %command.id, "draft already queued");
            return false;
        }

        tracing::debug!(command_id = %command.id, partition = %command.partition, "draft queued");
        state.drafts.push(command);
        true
    }

    /// Build a command for `event` as this session's actor and queue it
    pub fn submit_legacy_event(&self, event: LegacyEvent) -> Result<String, CollabError> {
        let command = self
            .builder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .build(event)?;
        let id = command.id.clone();
        self.submit_legacy_command(command);
        Ok(id)
    }

    /// Send every queued draft in submission order. Returns how many were
    /// sent.
    pub async fn flush_drafts(&self) -> Result<usize, CollabError> {
        let _flush = self.flush_gate.lock().await;
        self.require_active()?;

        let batch: Vec<Command> = self.shared.lock().drafts.clone();
        if batch.is_empty() {
            return Ok(0);
        }

        tracing::debug!(drafts = batch.len(), "flushing drafts");

        let mut sent = 0;
        for command in batch {
            let message = ClientMessage::Submit {
                item: command.to_wire(),
            };
            if let Err(e) = self.shared.transport.send(message).await {
                let e = CollabError::from(e);
                let remaining = self.draft_count();
                tracing::warn!(command_id = %command.id, sent, remaining, error = %e, "flush interrupted");
                self.shared.record_error(&e);
                return Err(e);
            }

            self.shared.lock().drafts.retain(|draft| draft.id != command.id);
            sent += 1;
        }

        tracing::debug!(sent, "drafts flushed");
        Ok(sent)
    }

    /// Wait until every event the server has committed on the session's
    /// partitions has been applied locally. `None` uses the configured
    /// sync timeout.
    pub async fn sync_now(&self, timeout: Option<Duration>) -> Result<u64, CollabError> {
        self.require_active()?;
        let timeout = timeout.unwrap_or_else(|| self.shared.config.sync_timeout());

        let request_id = Uuid::new_v4().to_string();
        let (waiter_tx, waiter_rx) = oneshot::channel();
        let since = {
            let mut state = self.shared.lock();
            state.pending_syncs.insert(request_id.clone(), waiter_tx);
            state.observed_cursor
        };

        let mut cursor_rx = self.shared.cursor.subscribe();
        let wait = async {
            self.shared.send_sync(request_id.clone(), since).await?;
            let head = sync_outcome(Ok(waiter_rx.await), timeout)?;
            cursor_rx
                .wait_for(|cursor| *cursor >= head)
                .await
                .map_err(|_| CollabError::Disconnected)?;
            Ok::<u64, CollabError>(head)
        };

        let result = match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(CollabError::Timeout(timeout)),
        };

        match result {
            Ok(head) => {
                tracing::debug!(head, "sync complete");
                self.shared.persist_cursor(self.cursor_store.as_ref());
                Ok(head)
            }
            Err(e) => {
                self.shared.lock().pending_syncs.remove(&request_id);
                tracing::warn!(request_id = %request_id, error = %e, "sync failed");
                self.shared.record_error(&e);
                Err(e)
            }
        }
    }

    /// Disconnect and release subscriptions. Calling it again is a no-op.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_supervisor().await;

        let status = self.status();
        if status == SessionStatus::Stopped {
            return;
        }

        let policy = self.shared.config.draft_policy;
        if status == SessionStatus::Active && policy == DraftPolicy::FlushOnStop {
            if let Err(e) = self.flush_drafts().await {
                tracing::warn!(error = %e, drafts = self.draft_count(), "flush on stop failed");
            }
        }

        self.shared.lock().status = SessionStatus::Stopping;
        self.shared.persist_cursor(self.cursor_store.as_ref());
        self.shared.release(SessionStatus::Stopped).await;

        if policy == DraftPolicy::Discard {
            let discarded = std::mem::take(&mut self.shared.lock().drafts);
            if !discarded.is_empty() {
                tracing::info!(discarded = discarded.len(), "unflushed drafts discarded");
            }
        }

        tracing::info!(project_id = %self.shared.config.project_id, "session stopped");
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Actor stamped on commands built by `submit_legacy_event`
    pub fn actor(&self) -> &Actor {
        &self.shared.config.actor
    }

    pub fn identity(&self) -> Option<SessionIdentity> {
        self.shared.lock().identity.clone()
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.shared.lock().last_error.clone()
    }

    pub fn clear_last_error(&self) {
        self.shared.lock().last_error = None;
    }

    pub fn rejections(&self) -> Vec<CommandRejection> {
        self.shared.lock().rejections.clone()
    }

    pub fn draft_count(&self) -> usize {
        self.shared.lock().drafts.len()
    }

    /// Queued drafts in submission order
    pub fn drafts(&self) -> Vec<Command> {
        self.shared.lock().drafts.clone()
    }

    pub fn observed_cursor(&self) -> u64 {
        self.shared.observed_cursor()
    }

    /// Every committed event applied from now on
    pub fn subscribe_committed(&self) -> broadcast::Receiver<CommittedEvent> {
        self.shared.committed.subscribe()
    }

    /// Project state as of the observed cursor
    pub fn state(&self) -> Value {
        self.shared.lock().projection.clone()
    }

    /// Tree collection stored at a dot path of the projected state
    pub fn collection(&self, target: &str) -> Option<TreeCollection> {
        let state = self.shared.lock();
        let keys: Vec<&str> = target.split('.').collect();
        match projection::get_path(&state.projection, &keys) {
            Some(value @ Value::Object(_)) => Some(TreeCollection::from_value(value)),
            _ => None,
        }
    }

    fn require_active(&self) -> Result<(), CollabError> {
        match self.status() {
            SessionStatus::Active => Ok(()),
            status => Err(CollabError::NotActive(status)),
        }
    }

    /// Cursor to sync from. A seeded projection resumes from the persisted
    /// cursor; otherwise the session replays from what it applied itself.
    fn resume_cursor(&self) -> Result<u64, CollabError> {
        if !self.seeded {
            let since = self.observed_cursor();
            tracing::debug!(since, "unseeded projection; persisted cursor not adopted");
            return Ok(since);
        }

        let key = cursor_key(&self.shared.config.project_id);
        if let Some(persisted) = self.cursor_store.load(&key)? {
            let mut state = self.shared.lock();
            if persisted > state.observed_cursor {
                state.observed_cursor = persisted;
                self.shared.cursor.send_replace(persisted);
            }
        }
        Ok(self.observed_cursor())
    }

    fn spawn_supervisor(&self) {
        let task = tokio::spawn(supervise(self.shared.clone(), self.cursor_store.clone()));
        let previous = self.supervisor.lock().unwrap_or_else(|e| e.into_inner()).replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn stop_supervisor(&self) {
        let task = self.supervisor.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for CollabSession {
    fn drop(&mut self) {
        if let Some(task) = self.supervisor.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for CollabSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollabSession")
            .field("project_id", &self.shared.config.project_id)
            .field("status", &self.status())
            .field("observed_cursor", &self.observed_cursor())
            .finish()
    }
}
