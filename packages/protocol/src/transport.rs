//! Bidirectional channel between a session and the sync server.
//!
//! Implementations must deliver messages in send order per connection, and
//! `connect` on an already connected (or connecting) transport is a no-op.

use crate::wire::{ClientMessage, ServerMessage};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Wire-level error code
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::NotConnected | TransportError::Closed => "transport_disconnected",
            TransportError::Connect(_) => "transport_connect_failed",
            TransportError::Send(_) => "transport_send_failed",
            TransportError::Encode(_) => "transport_encode_failed",
        }
    }
}

pub type MessageHandler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError>;

    /// Register `handler` for every inbound message. Dropping the returned
    /// subscription detaches it.
    fn on_message(&self, handler: MessageHandler) -> MessageSubscription;

    /// Follows the link. Turns `Disconnected` on `disconnect` and also when
    /// the peer drops the connection.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}

#[derive(Default)]
struct Handlers {
    next_id: u64,
    entries: Vec<(u64, MessageHandler)>,
}

/// Fan-out of inbound messages to attached handlers, shared by transports
#[derive(Clone)]
pub struct HandlerRegistry {
    label: Arc<str>,
    handlers: Arc<Mutex<Handlers>>,
}

impl HandlerRegistry {
    pub fn new(label: &str) -> Self {
        Self {
            label: Arc::from(label),
            handlers: Arc::new(Mutex::new(Handlers::default())),
        }
    }

    pub fn attach(&self, handler: MessageHandler) -> MessageSubscription {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        let id = handlers.next_id;
        handlers.next_id += 1;
        handlers.entries.push((id, handler));

        tracing::debug!(label = %self.label, handlers = handlers.entries.len(), "message handler attached");

        MessageSubscription {
            id,
            label: self.label.clone(),
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Deliver `message` to every attached handler.
    ///
    /// The handler list is snapshotted first so a handler may attach or
    /// detach without deadlocking.
    pub fn dispatch(&self, message: &ServerMessage) {
        let snapshot: Vec<MessageHandler> = {
            let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers.entries.iter().map(|(_, h)| h.clone()).collect()
        };

        for handler in snapshot {
            handler(message);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a handler attached for as long as it lives
pub struct MessageSubscription {
    id: u64,
    label: Arc<str>,
    handlers: Weak<Mutex<Handlers>>,
}

impl MessageSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        let Some(handlers) = self.handlers.upgrade() else {
            return;
        };
        let mut handlers = handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.entries.retain(|(id, _)| *id != self.id);

        tracing::debug!(label = %self.label, handlers = handlers.entries.len(), "message handler detached");
    }
}

impl std::fmt::Debug for MessageSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSubscription")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> MessageHandler {
        let counter = counter.clone();
        Arc::new(move |_: &ServerMessage| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_dispatch_reaches_attached_handlers() {
        let registry = HandlerRegistry::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        let _a = registry.attach(counting(&counter));
        let _b = registry.attach(counting(&counter));
        registry.dispatch(&ServerMessage::error("x", "y"));

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropping_subscription_detaches() {
        let registry = HandlerRegistry::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        let subscription = registry.attach(counting(&counter));
        subscription.unsubscribe();
        registry.dispatch(&ServerMessage::error("x", "y"));

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_subscription_outliving_registry_is_harmless() {
        let registry = HandlerRegistry::new("test");
        let subscription = registry.attach(Arc::new(|_: &ServerMessage| {}));
        drop(registry);
        drop(subscription);
    }
}
