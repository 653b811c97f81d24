use std::{
    net::SocketAddr,
    sync::Arc,
};

use futures_util::{
    SinkExt,
    StreamExt,
};
use log::{
    debug,
    info,
    warn,
};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::{
    server::ClientHub,
    types::ClientMessage,
};
use crate::{
    core::errors::BridgeError,
    sync::SyncService,
};

pub async fn handle_connection(
    stream: tokio::net::TcpStream,
    addr: SocketAddr,
    hub: ClientHub,
    sync: Arc<SyncService>,
) -> Result<(), BridgeError> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| BridgeError::Custom(format!("Error during WebSocket handshake: {}", e)))?;

    info!("[WS] WebSocket connection established with: {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::channel::<String>(32);
    hub.register(tx.clone());

    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::text(msg)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(message)) => {
                let message = message.as_str();
                if message == "PING" {
                    if let Err(e) = tx.send("PONG".to_string()).await {
                        warn!("[WS] Failed to send PONG: {}", e);
                    }
                    continue;
                }

                match serde_json::from_str::<ClientMessage>(message) {
                    Ok(request) => {
                        let ack = sync.sync(request.into_payload());
                        let reply = serde_json::to_string(&ack)?;
                        tx.send(reply).await?;
                    }
                    Err(e) => {
                        debug!("[WS] Ignoring message from {} that is not a request: {}", addr, e);
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("[WS] Client {} disconnected", addr);
                break;
            }
            Err(e) => {
                warn!("[WS] Error from client {}: {}", addr, e);
                break;
            }
            _ => {}
        }
    }

    forward_task.abort();
    drop(tx);

    let remaining = hub.prune();
    info!("[WS] Client {} gone. Total clients remaining: {}", addr, remaining);

    Ok(())
}
