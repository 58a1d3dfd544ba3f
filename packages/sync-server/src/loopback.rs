//! In-process `Transport` to a `SyncServer`, with fault injection for retry
//! and timeout tests.

use crate::server::{ConnectionId, SyncServer};
use async_trait::async_trait;
use routevn_protocol::{
    ClientMessage, ConnectionState, HandlerRegistry, MessageHandler, MessageSubscription,
    ServerMessage, Transport, TransportError,
};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

struct Link {
    connection: ConnectionId,
    pump: JoinHandle<()>,
}

#[derive(Default)]
struct Faults {
    passing_sends: usize,
    failing_sends: usize,
    refused_connects: usize,
    duplicate_sends: bool,
}

pub struct LoopbackTransport {
    label: String,
    server: SyncServer,
    registry: HandlerRegistry,
    link: Mutex<Option<Link>>,
    faults: Mutex<Faults>,
    paused: watch::Sender<bool>,
    state: watch::Sender<ConnectionState>,
}

impl LoopbackTransport {
    pub fn new(server: SyncServer) -> Self {
        Self::with_label("routevn.collab.loopback", server)
    }

    pub fn with_label(label: impl Into<String>, server: SyncServer) -> Self {
        let label = label.into();
        let (paused, _) = watch::channel(false);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            registry: HandlerRegistry::new(&label),
            label,
            server,
            link: Mutex::new(None),
            faults: Mutex::new(Faults::default()),
            paused,
            state,
        }
    }

    /// Fail the next `count` sends before they reach the server
    pub fn fail_sends(&self, count: usize) {
        self.fail_sends_after(0, count);
    }

    /// Let `successes` sends through, then fail the `count` after them
    pub fn fail_sends_after(&self, successes: usize, count: usize) {
        let mut faults = self.faults();
        faults.passing_sends = successes;
        faults.failing_sends = count;
    }

    /// Refuse the next `count` connect attempts, as an unreachable server would
    pub fn refuse_connects(&self, count: usize) {
        self.faults().refused_connects = count;
    }

    /// Sever the link from the server side. Handlers stay attached and the
    /// next `connect` opens a fresh server connection.
    pub fn drop_connection(&self) {
        let Some(link) = self.lock_link().take() else {
            return;
        };
        self.server.disconnect(link.connection);
        link.pump.abort();
        self.state.send_replace(ConnectionState::Disconnected);
        tracing::debug!(label = %self.label, connection = %link.connection, "connection dropped");
    }

    /// Deliver every successful send twice, as a retrying client would
    pub fn duplicate_sends(&self, enabled: bool) {
        self.faults().duplicate_sends = enabled;
    }

    /// Hold server messages until `resume_delivery`
    pub fn pause_delivery(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume_delivery(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_connected(&self) -> bool {
        self.lock_link().is_some()
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut link = self.lock_link();
        if link.is_some() {
            tracing::debug!(label = %self.label, "connect skipped; socket already open");
            return Ok(());
        }

        {
            let mut faults = self.faults();
            if faults.refused_connects > 0 {
                faults.refused_connects -= 1;
                return Err(TransportError::Connect("injected refusal".to_string()));
            }
        }

        let (connection, inbound) = self.server.connect();
        let pump = tokio::spawn(pump(inbound, self.registry.clone(), self.paused.subscribe()));
        *link = Some(Link { connection, pump });
        self.state.send_replace(ConnectionState::Connected);

        tracing::debug!(label = %self.label, connection = %connection, "connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(link) = self.lock_link().take() else {
            return Ok(());
        };

        self.server.disconnect(link.connection);
        link.pump.abort();
        self.state.send_replace(ConnectionState::Disconnected);

        tracing::debug!(label = %self.label, connection = %link.connection, "disconnected");
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        let connection = match self.lock_link().as_ref() {
            Some(link) => link.connection,
            None => return Err(TransportError::NotConnected),
        };

        let duplicate = {
            let mut faults = self.faults();
            if faults.passing_sends > 0 {
                faults.passing_sends -= 1;
            } else if faults.failing_sends > 0 {
                faults.failing_sends -= 1;
                return Err(TransportError::Send("injected failure".to_string()));
            }
            faults.duplicate_sends
        };

        if duplicate {
            self.server.handle(connection, message.clone());
        }
        self.server.handle(connection, message);
        Ok(())
    }

    fn on_message(&self, handler: MessageHandler) -> MessageSubscription {
        self.registry.attach(handler)
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

async fn pump(
    mut inbound: mpsc::UnboundedReceiver<ServerMessage>,
    registry: HandlerRegistry,
    mut paused: watch::Receiver<bool>,
) {
    while let Some(message) = inbound.recv().await {
        let resumed = paused.wait_for(|paused| !*paused).await.is_ok();
        if !resumed {
            return;
        }
        registry.dispatch(&message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn collector(transport: &LoopbackTransport) -> (Arc<Mutex<Vec<ServerMessage>>>, MessageSubscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = transport.on_message(Arc::new(move |message: &ServerMessage| {
            sink.lock().unwrap().push(message.clone());
        }));
        (seen, subscription)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_server() {
        let transport = LoopbackTransport::new(SyncServer::allow_all());
        let (seen, _subscription) = collector(&transport);

        transport.connect().await.unwrap();
        transport.connect().await.unwrap();
        transport
            .send(ClientMessage::Connect {
                token: "user:u1:client:c1".into(),
            })
            .await
            .unwrap();
        settle().await;

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[ServerMessage::Connected {
                user_id: "u1".into(),
                client_id: "c1".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_injected_failures_do_not_reach_server() {
        let transport = LoopbackTransport::new(SyncServer::allow_all());
        let (seen, _subscription) = collector(&transport);
        transport.connect().await.unwrap();
        transport.fail_sends(1);

        let token = ClientMessage::Connect {
            token: "user:u1:client:c1".into(),
        };
        assert!(matches!(transport.send(token.clone()).await, Err(TransportError::Send(_))));
        transport.send(token).await.unwrap();
        settle().await;

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_paused_delivery_is_held() {
        let transport = LoopbackTransport::new(SyncServer::allow_all());
        let (seen, _subscription) = collector(&transport);
        transport.connect().await.unwrap();
        transport.pause_delivery();

        transport
            .send(ClientMessage::Connect {
                token: "user:u1:client:c1".into(),
            })
            .await
            .unwrap();
        settle().await;
        assert!(seen.lock().unwrap().is_empty());

        transport.resume_delivery();
        settle().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_after_disconnect_fails() {
        let transport = LoopbackTransport::new(SyncServer::allow_all());
        transport.connect().await.unwrap();
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();

        let result = transport
            .send(ClientMessage::Connect { token: "t".into() })
            .await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_dropped_connection_is_observable_and_recoverable() {
        let transport = LoopbackTransport::new(SyncServer::allow_all());
        let (seen, _subscription) = collector(&transport);
        let state = transport.connection_state();
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);

        transport.connect().await.unwrap();
        assert_eq!(*state.borrow(), ConnectionState::Connected);

        transport.drop_connection();
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
        assert!(matches!(
            transport.send(ClientMessage::Connect { token: "t".into() }).await,
            Err(TransportError::NotConnected)
        ));

        transport.refuse_connects(1);
        assert!(matches!(transport.connect().await, Err(TransportError::Connect(_))));
        transport.connect().await.unwrap();
        transport
            .send(ClientMessage::Connect {
                token: "user:u1:client:c1".into(),
            })
            .await
            .unwrap();
        settle().await;

        assert_eq!(*state.borrow(), ConnectionState::Connected);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
