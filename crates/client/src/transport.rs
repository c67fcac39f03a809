//! Duplex transport abstraction and its WebSocket implementation.
//!
//! [`Connector`] opens connections and [`Transport`] is one open
//! connection. The connection manager only sees these traits, so tests can
//! swap in scripted doubles while production uses [`WsConnector`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;

/// One inbound frame, reduced to what the correlator cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// The remote sent a close frame.
    Close,
}

impl Frame {
    /// Short name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Close => "close",
        }
    }
}

/// A live duplex connection.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next data or close frame. Blocks until one arrives.
    async fn receive(&mut self) -> Result<Frame, TransportError>;
}

/// Factory for [`Transport`]s to a fixed endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;
}

/// Opens WebSocket connections to `url`.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// * `url` - WebSocket endpoint, e.g. `wss://api.unfuzzed.org/websocket`.
    pub fn new(url: String) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _response) = connect_async(&self.url).await.map_err(|e| {
            TransportError::Connect(format!("Failed to connect to {}: {e}", self.url))
        })?;

        tracing::info!(url = %self.url, "WebSocket connected");

        Ok(Box::new(WsTransport { stream }))
    }
}

/// [`Transport`] over a tungstenite WebSocket stream.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text)),
                Some(Ok(Message::Binary(data))) => return Ok(Frame::Binary(data)),
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "WebSocket closed by remote");
                    return Ok(Frame::Close);
                }
                // Handled automatically by tungstenite.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(TransportError::Closed),
            }
        }
    }
}

impl From<WsError> for TransportError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Io(_) => {
                TransportError::Closed
            }
            WsError::Protocol(
                ProtocolError::ResetWithoutClosingHandshake | ProtocolError::SendAfterClosing,
            ) => TransportError::Closed,
            other => TransportError::Other(other.to_string()),
        }
    }
}
