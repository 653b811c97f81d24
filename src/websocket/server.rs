use std::sync::{
    Arc,
    Mutex,
};

use log::{
    error,
    info,
    warn,
};
use tokio::{
    net::TcpListener,
    sync::mpsc,
};

use super::{
    connection::handle_connection,
    types::{
        ConnectedClient,
        ServerMessage,
    },
};
use crate::{
    core::errors::BridgeError,
    notify::Notifier,
    sync::SyncService,
};

/// Every open socket, so notifications reach all connected tabs.
#[derive(Clone, Default)]
pub struct ClientHub {
    clients: Arc<Mutex<Vec<ConnectedClient>>>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tx: mpsc::Sender<String>) {
        if let Ok(mut clients) = self.clients.lock() {
            clients.push(ConnectedClient { tx });
            info!("[WS] Client registered. Total clients: {}", clients.len());
        }
    }

    /// Drops closed senders and returns how many clients are left.
    pub fn prune(&self) -> usize {
        match self.clients.lock() {
            Ok(mut clients) => {
                clients.retain(|c| !c.tx.is_closed());
                clients.len()
            }
            Err(_) => 0,
        }
    }

    pub fn broadcast(&self, text: &str) {
        let Ok(mut clients) = self.clients.lock() else {
            return;
        };
        clients.retain(|c| !c.tx.is_closed());
        for client in clients.iter() {
            if !client.is_valid() {
                warn!("[WS] Dropping message for a client whose queue is full");
                continue;
            }
            if let Err(e) = client.tx.try_send(text.to_string()) {
                warn!("[WS] Failed to queue message: {}", e);
            }
        }
    }
}

impl Notifier for ClientHub {
    fn notify(&self, message: &str) {
        match serde_json::to_string(&ServerMessage::Notification { message }) {
            Ok(text) => self.broadcast(&text),
            Err(e) => error!("[WS] Failed to encode notification: {}", e),
        }
    }
}

pub struct WebSocketServer {
    hub: ClientHub,
    sync: Arc<SyncService>,
}

impl WebSocketServer {
    pub fn new(hub: ClientHub, sync: Arc<SyncService>) -> Self {
        Self { hub, sync }
    }

    pub async fn bind(addr: &str) -> Result<TcpListener, BridgeError> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Custom(format!("Failed to bind to {}: {}", addr, e)))
    }

    /// Accepts connections until the listener fails.
    pub async fn run(&self, listener: TcpListener) -> Result<(), BridgeError> {
        if let Ok(addr) = listener.local_addr() {
            info!("[WS] Listening for the web app on ws://{}", addr);
        }

        loop {
            let (stream, addr) = listener.accept().await?;
            info!("[WS] New connection from: {}", addr);

            let hub = self.hub.clone();
            let sync = self.sync.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, hub, sync).await {
                    error!("[WS] Error handling connection from {}: {}", addr, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{
        SinkExt,
        Stream,
        StreamExt,
    };
    use tempfile::tempdir;
    use tokio_tungstenite::{
        connect_async,
        tungstenite::{
            protocol::Message,
            Error as WsError,
        },
    };

    use super::*;
    use crate::{
        downloads::{
            DownloadQueue,
            DownloadScheduler,
            StateStore,
        },
        settings::BridgeSettings,
        test_utils::FakeAnki,
    };

    async fn start() -> (String, ClientHub, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let anki = Arc::new(FakeAnki::new());
        let hub = ClientHub::new();
        let settings = BridgeSettings::default();
        let downloads = DownloadScheduler::new(
            anki.clone(),
            DownloadQueue::new(StateStore::open(dir.path()).unwrap()),
            Arc::new(hub.clone()),
            settings.downloads.clone(),
        );
        let sync = SyncService::new(anki, downloads, Arc::new(hub.clone()), settings);

        let listener = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = WebSocketServer::new(hub.clone(), sync);
        tokio::spawn(async move {
            let _ = server.run(listener).await;
        });
        (url, hub, dir)
    }

    async fn next_text<S>(ws: &mut S) -> String
    where
        S: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if msg.is_text() {
                return msg.to_text().unwrap().to_string();
            }
        }
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let (url, _hub, _dir) = start().await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

        ws.send(Message::text("PING".to_string())).await.unwrap();

        assert_eq!(next_text(&mut ws).await, "PONG");
    }

    #[tokio::test]
    async fn sync_request_is_acknowledged_and_reported() {
        let (url, _hub, _dir) = start().await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

        let items = r#"[{"id":"a1","sentence":"s","translation":"t"}]"#;
        let request = serde_json::json!({ "type": "sync", "payload": items }).to_string();
        ws.send(Message::text(request)).await.unwrap();

        let replies = [next_text(&mut ws).await, next_text(&mut ws).await];
        assert!(replies.iter().any(|r| r == r#"{"syncing":true}"#));
        let notification = replies.iter().find(|r| r.contains("notification")).unwrap();
        let value: serde_json::Value = serde_json::from_str(notification).unwrap();
        assert!(value["message"].as_str().unwrap().starts_with("1 notes added;"));
    }

    #[tokio::test]
    async fn garbage_is_ignored() {
        let (url, _hub, _dir) = start().await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

        ws.send(Message::text("hello".to_string())).await.unwrap();
        ws.send(Message::text("PING".to_string())).await.unwrap();

        assert_eq!(next_text(&mut ws).await, "PONG");
    }

    #[test]
    fn broadcast_skips_closed_clients() {
        let hub = ClientHub::new();
        let (open_tx, mut open_rx) = mpsc::channel(4);
        let (closed_tx, closed_rx) = mpsc::channel(4);
        drop(closed_rx);
        hub.register(open_tx);
        hub.register(closed_tx);

        hub.notify("hi");

        assert_eq!(hub.prune(), 1);
        assert_eq!(open_rx.try_recv().unwrap(), r#"{"type":"notification","message":"hi"}"#);
    }
}
