//! # Sync Server
//!
//! Transport-agnostic core: connections are opened with `connect`, fed
//! `ClientMessage`s through `handle`, and receive `ServerMessage`s on the
//! channel `connect` returned.
//!
//! ## Submit Semantics
//!
//! 1. The command id is looked up first. A known id replays its recorded
//!    outcome (`duplicate` with the cursor, or the original rejection)
//! 2. Otherwise the item is validated, then authorized against every one
//!    of its partitions
//! 3. An accepted item is committed at the next cursor, acknowledged to the
//!    submitter, and pushed as `committed` to every connection subscribed
//!    to one of its partitions
//!
//! All state sits behind one lock, so commits sharing a partition are
//! applied in the order they were received.

use crate::auth::{ConventionTokenVerifier, Identity, TokenVerifier};
use crate::authorization::{AllowAll, PartitionAuthorizer, ProjectGrants};
use crate::log::{CommitLog, Outcome};
use crate::validation::{validate, EventPayloadValidator, LegacyPayloadValidator};
use routevn_protocol::{
    Actor, ClientMessage, CommittedEvent, ServerMessage, SubmitItem, SubmitStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Connection {
    identity: Option<Identity>,
    subscriptions: HashSet<String>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    fn send(&self, message: ServerMessage) {
        // Receiver gone means the socket is closing; nothing to do
        let _ = self.outbound.send(message);
    }
}

#[derive(Default)]
struct ServerState {
    log: CommitLog,
    connections: HashMap<ConnectionId, Connection>,
    next_connection: u64,
}

struct Inner {
    verifier: Box<dyn TokenVerifier>,
    authorizer: Box<dyn PartitionAuthorizer>,
    validator: Box<dyn EventPayloadValidator>,
    state: Mutex<ServerState>,
}

/// Cheap to clone; clones share the same log and connections
#[derive(Clone)]
pub struct SyncServer {
    inner: Arc<Inner>,
}

impl SyncServer {
    pub fn new(
        verifier: impl TokenVerifier + 'static,
        authorizer: impl PartitionAuthorizer + 'static,
        validator: impl EventPayloadValidator + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                verifier: Box::new(verifier),
                authorizer: Box::new(authorizer),
                validator: Box::new(validator),
                state: Mutex::new(ServerState::default()),
            }),
        }
    }

    /// Convention tokens, every partition authorized, legacy validation
    pub fn allow_all() -> Self {
        Self::new(ConventionTokenVerifier, AllowAll, LegacyPayloadValidator)
    }

    pub fn with_grants(grants: ProjectGrants) -> Self {
        Self::new(ConventionTokenVerifier, grants, LegacyPayloadValidator)
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a connection. Messages for it arrive on the returned receiver.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (outbound, inbound) = mpsc::unbounded_channel();
        let mut state = self.lock();

        state.next_connection += 1;
        let id = ConnectionId(state.next_connection);
        state.connections.insert(
            id,
            Connection {
                identity: None,
                subscriptions: HashSet::new(),
                outbound,
            },
        );

        tracing::debug!(connection = %id, connections = state.connections.len(), "connection opened");
        (id, inbound)
    }

    pub fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.lock();
        if state.connections.remove(&connection).is_some() {
            tracing::debug!(connection = %connection, connections = state.connections.len(), "connection closed");
        }
    }

    /// Push `message` to one connection
    pub fn notify(&self, connection: ConnectionId, message: ServerMessage) {
        if let Some(conn) = self.lock().connections.get(&connection) {
            conn.send(message);
        }
    }

    pub fn handle(&self, connection: ConnectionId, message: ClientMessage) {
        let mut state = self.lock();
        let state = &mut *state;

        let Some(conn) = state.connections.get_mut(&connection) else {
            tracing::warn!(connection = %connection, "message for unknown connection");
            return;
        };

        match message {
            ClientMessage::Connect { token } => match self.inner.verifier.verify_token(&token) {
                Ok(identity) => {
                    tracing::info!(connection = %connection, user_id = %identity.user_id, client_id = %identity.client_id, "authenticated");
                    conn.send(ServerMessage::Connected {
                        user_id: identity.user_id.clone(),
                        client_id: identity.client_id.clone(),
                    });
                    conn.identity = Some(identity);
                }
                Err(e) => {
                    tracing::warn!(connection = %connection, error = %e, "authentication failed");
                    conn.identity = None;
                    conn.send(ServerMessage::error(e.code(), e.to_string()));
                }
            },

            ClientMessage::Sync {
                request_id,
                partitions,
                since,
            } => {
                let Some(identity) = &conn.identity else {
                    conn.send(ServerMessage::error("unauthenticated", "connect before sync"));
                    return;
                };
                if !self.inner.authorizer.authorize_partitions(identity, &partitions) {
                    tracing::warn!(connection = %connection, user_id = %identity.user_id, ?partitions, "sync forbidden");
                    conn.send(ServerMessage::error("forbidden", "partitions not authorized"));
                    return;
                }

                conn.subscriptions.extend(partitions.iter().cloned());
                let events = state.log.events_since(since, &partitions);
                let cursor = state.log.cursor_for(&partitions);

                tracing::debug!(connection = %connection, since, cursor, events = events.len(), "sync");
                conn.send(ServerMessage::SyncResponse {
                    request_id,
                    cursor,
                    events,
                });
            }

            ClientMessage::Submit { item } => {
                let Some(identity) = conn.identity.clone() else {
                    conn.send(ServerMessage::error("unauthenticated", "connect before submit"));
                    return;
                };
                self.submit(state, connection, &identity, item);
            }
        }
    }

    fn submit(&self, state: &mut ServerState, connection: ConnectionId, identity: &Identity, item: SubmitItem) {
        let command_id = item.command_id().to_string();
        state.log.note_submission(&command_id);

        let reply = |state: &ServerState, message: ServerMessage| {
            if let Some(conn) = state.connections.get(&connection) {
                conn.send(message);
            }
        };

        if let Some(outcome) = state.log.outcome(&command_id).cloned() {
            tracing::debug!(command_id = %command_id, ?outcome, "duplicate submission");
            let result = match outcome {
                Outcome::Committed { cursor } => submit_result(&command_id, SubmitStatus::Duplicate, None, Some(cursor)),
                Outcome::Rejected { reason, message } => {
                    submit_result(&command_id, SubmitStatus::Rejected, Some((reason, message)), None)
                }
            };
            reply(&*state, result);
            return;
        }

        state.log.note_observation(&command_id);

        if let Err(e) = validate(&item, self.inner.validator.as_ref()) {
            tracing::warn!(command_id = %command_id, error = %e, "submission rejected");
            state.log.reject(&command_id, e.code(), e.message.clone());
            reply(
                &*state,
                submit_result(&command_id, SubmitStatus::Rejected, Some((e.code().to_string(), e.message)), None),
            );
            return;
        }

        if !self.inner.authorizer.authorize_partitions(identity, &item.partitions) {
            tracing::warn!(command_id = %command_id, user_id = %identity.user_id, partitions = ?item.partitions, "submission forbidden");
            let message = "partitions not authorized".to_string();
            state.log.reject(&command_id, "forbidden", message.clone());
            reply(
                &*state,
                submit_result(&command_id, SubmitStatus::Rejected, Some(("forbidden".to_string(), message)), None),
            );
            return;
        }

        let actor = Actor::new(identity.user_id.clone(), identity.client_id.clone());
        let committed = state.log.commit(item, actor);
        tracing::info!(command_id = %command_id, cursor = committed.cursor, partitions = ?committed.partitions, "committed");

        reply(
            &*state,
            submit_result(&command_id, SubmitStatus::Accepted, None, Some(committed.cursor)),
        );
        broadcast(state, &committed);
    }

    pub fn head_cursor(&self) -> u64 {
        self.lock().log.head()
    }

    pub fn committed_events(&self) -> Vec<CommittedEvent> {
        self.lock().log.events().to_vec()
    }

    /// Times `command_id` was submitted, duplicates included
    pub fn submission_count(&self, command_id: &str) -> usize {
        self.lock().log.submission_count(command_id)
    }

    /// Times `command_id` was validated
    pub fn observation_count(&self, command_id: &str) -> usize {
        self.lock().log.observation_count(command_id)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }
}

fn submit_result(
    command_id: &str,
    status: SubmitStatus,
    rejection: Option<(String, String)>,
    cursor: Option<u64>,
) -> ServerMessage {
    let (reason, message) = match rejection {
        Some((reason, message)) => (Some(reason), Some(message)),
        None => (None, None),
    };
    ServerMessage::SubmitResult {
        command_id: command_id.to_string(),
        status,
        reason,
        message,
        cursor,
    }
}

fn broadcast(state: &ServerState, event: &CommittedEvent) {
    for conn in state.connections.values() {
        if conn.identity.is_some() && event.partitions.iter().any(|p| conn.subscriptions.contains(p)) {
            conn.send(ServerMessage::Committed {
                event: event.clone(),
            });
        }
    }
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SyncServer")
            .field("head", &state.log.head())
            .field("connections", &state.connections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_connect_with_bad_token_reports_auth_failed() {
        let server = SyncServer::allow_all();
        let (conn, mut rx) = server.connect();

        server.handle(conn, ClientMessage::Connect { token: "nope".into() });

        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::error("auth_failed", "Malformed token")]
        );
    }

    #[test]
    fn test_sync_requires_authentication() {
        let server = SyncServer::allow_all();
        let (conn, mut rx) = server.connect();

        server.handle(
            conn,
            ClientMessage::Sync {
                request_id: "r1".into(),
                partitions: vec!["project:p1:story".into()],
                since: 0,
            },
        );

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Error { code, .. }] if code == "unauthenticated"
        ));
    }

    #[test]
    fn test_disconnect_forgets_connection() {
        let server = SyncServer::allow_all();
        let (conn, _rx) = server.connect();
        assert_eq!(server.connection_count(), 1);

        server.disconnect(conn);
        server.disconnect(conn);
        assert_eq!(server.connection_count(), 0);
    }
}
