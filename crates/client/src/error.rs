use unfuzzed_core::error::CoreError;

/// Failure of the duplex transport itself.
///
/// Only [`TransportError::Closed`] means the connection is gone and worth
/// replacing; the other variants are reported to the caller as-is.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote closed the connection or the socket was lost.
    #[error("Connection closed")]
    Closed,

    /// A new connection could not be established.
    #[error("Connection error: {0}")]
    Connect(String),

    /// Any other transport fault on a live connection.
    #[error("Transport error: {0}")]
    Other(String),
}

/// Errors surfaced by [`UnfuzzedClient`](crate::client::UnfuzzedClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An inbound frame was not a text frame of the expected JSON shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The reply belongs to a different request or image.
    #[error("Got response for {actual} instead of {expected}")]
    Correlation { expected: String, actual: String },

    /// The reply has the wrong message type for its position.
    #[error("Expected websocket message of type {expected}, got {actual}")]
    Kind { expected: String, actual: String },

    /// The remote reported failure; carries its error string verbatim.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Downloading the latent container failed.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// The downloaded container is unreadable or lacks the latent entry.
    #[error("Invalid latent container: {0}")]
    Format(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The age-confirmation gate rejected the request.
    #[error(transparent)]
    Policy(CoreError),
}
