//! WebSocket listener: one `SyncServer` connection per accepted socket,
//! JSON text frames in both directions.

use crate::errors::ServerError;
use crate::server::SyncServer;
use futures::{SinkExt, StreamExt};
use routevn_protocol::{ClientMessage, ServerMessage};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Accept sockets on `listener` until it fails
pub async fn serve(listener: TcpListener, server: SyncServer) -> Result<(), ServerError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let server = server.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_socket(stream, peer, server).await {
                tracing::warn!(peer = %peer, error = %e, "connection failed");
            }
        });
    }
}

async fn handle_socket(stream: TcpStream, peer: SocketAddr, server: SyncServer) -> Result<(), ServerError> {
    let socket = accept_async(stream).await?;
    let (mut sink, mut source) = socket.split();
    let (connection, mut outbound) = server.connect();

    tracing::info!(peer = %peer, connection = %connection, "socket accepted");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode server message");
                    continue;
                }
            };
            if sink.send(Message::text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut result = Ok(());
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(message) if message.is_text() => {
                let parsed = message
                    .to_text()
                    .map_err(|e| e.to_string())
                    .and_then(|text| serde_json::from_str::<ClientMessage>(text).map_err(|e| e.to_string()));
                match parsed {
                    Ok(message) => server.handle(connection, message),
                    Err(error) => {
                        tracing::warn!(connection = %connection, error = %error, "message parse failed");
                        server.notify(connection, ServerMessage::error("invalid_message", error));
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                result = Err(e.into());
                break;
            }
        }
    }

    server.disconnect(connection);
    let _ = writer.await;

    tracing::info!(peer = %peer, connection = %connection, "socket closed");
    result
}
