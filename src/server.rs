//! WebSocket server
//!
//! Accepts editor clients, decodes their JSON messages and hands each
//! connection to its own session relay. Sessions are fully independent:
//! one client's provider failure never touches another's.

use crate::adapter;
use crate::config::RelayConfig;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::relay;
use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Outbound message buffer per client
const CLIENT_CHANNEL_CAPACITY: usize = 100;

/// Bind the listener and serve until the process is stopped
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    let config = Arc::new(config);
    loop {
        let (stream, peer) = listener.accept().await?;
        let config = config.clone();
        tokio::spawn(async move {
            debug!("Client connected from {}", peer);
            if let Err(e) = handle_connection(stream, config).await {
                warn!("Connection from {} ended with error: {}", peer, e);
            }
            debug!("Client {} disconnected", peer);
        });
    }
}

/// Serve one client connection for the lifetime of its session
async fn handle_connection(stream: TcpStream, config: Arc<RelayConfig>) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sink, mut ws_reader) = ws_stream.split();

    let (server_tx, mut server_rx) = mpsc::channel::<ServerMessage>(CLIENT_CHANNEL_CAPACITY);
    let (client_tx, client_rx) = mpsc::channel::<ClientMessage>(CLIENT_CHANNEL_CAPACITY);

    // Writer task: serialize relay output onto the socket
    let writer = tokio::spawn(async move {
        while let Some(message) = server_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if ws_sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize server message: {}", e),
            }
        }
        let _ = ws_sink.close().await;
    });

    let session = tokio::spawn(relay::run_session(client_rx, server_tx, {
        let config = config.clone();
        move |mode, tuning| adapter::spawn(&config, mode, tuning)
    }));

    // Reader loop: decode client messages, drop what does not parse
    while let Some(message) = ws_reader.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    if client_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring unparseable client message: {}", e),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(_) => debug!("Ignoring non-text client frame"),
            Err(e) => {
                debug!("Client socket error: {}", e);
                break;
            }
        }
    }

    // Dropping the sender is how the relay learns the client went away
    drop(client_tx);

    session.await?;
    writer.await?;
    Ok(())
}
