use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

struct WsConnection {
    sender: WsSender,
    connected_at: DateTime<Utc>,
}

/// Tracks every open client connection.
///
/// Thread-safe via interior `RwLock`; shared across handlers in an `Arc`.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection and return the receiver feeding its sink.
    pub async fn add(&self, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender: tx,
            connected_at: Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            let open_secs = (Utc::now() - conn.connected_at).num_seconds();
            tracing::debug!(conn_id, open_secs, "Connection removed");
        }
    }

    /// Queue `message` for one connection.
    ///
    /// Returns `false` if the connection is unknown or its sender task has
    /// already stopped.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        match self.connections.read().await.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connection.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
