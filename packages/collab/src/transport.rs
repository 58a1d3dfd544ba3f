//! WebSocket transport to the sync server.
//!
//! One socket per transport. Outbound messages are written in call order;
//! inbound text frames are parsed as `ServerMessage` and fanned out to the
//! attached handlers from a reader task. When the reader ends, because the
//! peer closed or the socket failed, the connection state turns
//! `Disconnected`.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use routevn_protocol::{
    ClientMessage, ConnectionState, HandlerRegistry, MessageHandler, MessageSubscription,
    ServerMessage, Transport, TransportError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Sink = Arc<Mutex<SplitSink<Socket, Message>>>;

struct Connection {
    sink: Sink,
    reader: JoinHandle<()>,
}

/// Reports the end of one socket, unless a newer socket replaced it
#[derive(Clone)]
struct Liveness {
    state: Arc<watch::Sender<ConnectionState>>,
    generation: Arc<AtomicU64>,
}

impl Liveness {
    fn open(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(ConnectionState::Connected);
        generation
    }

    fn close(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn close_if_current(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

pub struct WebSocketTransport {
    label: String,
    url: String,
    registry: HandlerRegistry,
    connection: Mutex<Option<Connection>>,
    liveness: Liveness,
}

impl WebSocketTransport {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        let label = label.into();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            registry: HandlerRegistry::new(&label),
            label,
            url: url.into(),
            connection: Mutex::new(None),
            liveness: Liveness {
                state: Arc::new(state),
                generation: Arc::new(AtomicU64::new(0)),
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| !c.reader.is_finished())
    }

    async fn sink(&self) -> Result<Sink, TransportError> {
        match self.connection.lock().await.as_ref() {
            Some(connection) if !connection.reader.is_finished() => Ok(connection.sink.clone()),
            _ => Err(TransportError::NotConnected),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        // Held across the handshake so concurrent callers wait, then skip
        let mut connection = self.connection.lock().await;
        if connection.as_ref().is_some_and(|c| !c.reader.is_finished()) {
            tracing::debug!(label = %self.label, url = %self.url, "connect skipped; socket already open");
            return Ok(());
        }

        tracing::info!(label = %self.label, url = %self.url, "connect attempt");

        let socket = match connect_async(self.url.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(e) => {
                tracing::error!(label = %self.label, url = %self.url, error = %e, "connect failed");
                return Err(TransportError::Connect(e.to_string()));
            }
        };

        let (sink, stream) = socket.split();
        let generation = self.liveness.open();
        let reader = tokio::spawn(read_loop(
            stream,
            self.registry.clone(),
            self.label.clone(),
            self.url.clone(),
            (self.liveness.clone(), generation),
        ));

        *connection = Some(Connection {
            sink: Arc::new(Mutex::new(sink)),
            reader,
        });

        tracing::info!(label = %self.label, url = %self.url, "connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(connection) = self.connection.lock().await.take() else {
            return Ok(());
        };

        tracing::info!(label = %self.label, url = %self.url, "disconnect requested");

        let result = connection.sink.lock().await.close().await;
        connection.reader.abort();
        self.liveness.close();

        tracing::info!(label = %self.label, url = %self.url, "disconnected");

        match result {
            Ok(()) => Ok(()),
            // Already closed by the peer
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        let text = serde_json::to_string(&message)?;
        let sink = self.sink().await?;

        sink.lock()
            .await
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;

        tracing::debug!(label = %self.label, url = %self.url, kind = message_kind(&message), "message sent");
        Ok(())
    }

    fn on_message(&self, handler: MessageHandler) -> MessageSubscription {
        self.registry.attach(handler)
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.liveness.state.subscribe()
    }
}

async fn read_loop(
    stream: SplitStream<Socket>,
    registry: HandlerRegistry,
    label: String,
    url: String,
    (liveness, generation): (Liveness, u64),
) {
    read_frames(stream, &registry, &label, &url).await;
    liveness.close_if_current(generation);
}

async fn read_frames(mut stream: SplitStream<Socket>, registry: &HandlerRegistry, label: &str, url: &str) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(frame)) => {
                match frame {
                    Some(frame) if frame.code != CloseCode::Normal => {
                        tracing::error!(label = %label, url = %url, code = u16::from(frame.code), reason = %frame.reason.as_str(), "socket closed");
                    }
                    _ => tracing::info!(label = %label, url = %url, "socket closed"),
                }
                return;
            }
            Ok(message) if message.is_text() => {
                let parsed = message
                    .to_text()
                    .map_err(|e| e.to_string())
                    .and_then(|text| serde_json::from_str::<ServerMessage>(text).map_err(|e| e.to_string()));
                match parsed {
                    Ok(message) => {
                        tracing::debug!(label = %label, url = %url, "message received");
                        registry.dispatch(&message);
                    }
                    Err(error) => {
                        tracing::warn!(label = %label, url = %url, error = %error, "message parse failed");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(label = %label, url = %url, error = %e, "socket closed");
                return;
            }
        }
    }

    tracing::info!(label = %label, url = %url, "socket closed");
}

fn message_kind(message: &ClientMessage) -> &'static str {
    match message {
        ClientMessage::Connect { .. } => "connect",
        ClientMessage::Sync { .. } => "sync",
        ClientMessage::Submit { .. } => "submit",
    }
}
