//! Lazily-opened, reused duplex connection.
//!
//! [`ConnectionManager`] opens its first connection on demand and keeps
//! it across requests. When a send reports [`TransportError::Closed`] the
//! stale connection is dropped, exactly one replacement is opened and the
//! send is retried once on it. Other send failures are returned without
//! reconnecting.

use crate::error::TransportError;
use crate::transport::{Connector, Frame, Transport};

pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    connections_made: u32,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            transport: None,
            connections_made: 0,
        }
    }

    /// Number of connections opened over this manager's lifetime.
    pub fn connections_made(&self) -> u32 {
        self.connections_made
    }

    /// Whether a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Return the held connection, opening one first if there is none.
    pub async fn ensure_connected(&mut self) -> Result<&mut Box<dyn Transport>, TransportError> {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => self.open().await?,
        };
        Ok(self.transport.insert(transport))
    }

    /// Send a text frame, reconnecting once if the connection was lost.
    pub async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        let result = self
            .ensure_connected()
            .await?
            .send_text(text.to_string())
            .await;

        match result {
            Err(TransportError::Closed) => {
                tracing::warn!("WebSocket send failed on a closed connection, reconnecting");
                self.transport = None;
                self.ensure_connected()
                    .await?
                    .send_text(text.to_string())
                    .await
            }
            other => other,
        }
    }

    /// Receive the next frame on the held connection.
    ///
    /// A close frame or a closed transport releases the connection so the
    /// next send opens a fresh one.
    pub async fn receive(&mut self) -> Result<Frame, TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
        let result = transport.receive().await;
        if matches!(result, Ok(Frame::Close) | Err(TransportError::Closed)) {
            self.transport = None;
        }
        result
    }

    async fn open(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        tracing::info!(
            previous_connections = self.connections_made,
            "Starting WebSocket connection"
        );
        let transport = self.connector.connect().await?;
        self.connections_made += 1;
        Ok(transport)
    }
}
