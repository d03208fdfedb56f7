use pair_common::{DecodeError, PeerId};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors that end a connection task or the accept loop.
#[derive(Error, Debug)]
pub enum PairsError {
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another live connection already holds this identifier.
    #[error("peer {0} is already registered")]
    AlreadyRegistered(PeerId),
    /// No live connection holds this identifier.
    #[error("peer {0} is not registered")]
    NotFound(PeerId),
}

/// Failure to write to a connection handle.
#[derive(Error, Debug)]
pub enum SendError {
    /// The connection has already closed.
    #[error("connection is closed")]
    Closed,
    /// The envelope could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    /// The underlying write failed.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// Failure to relay an envelope.
#[derive(Error, Debug)]
pub enum RouteError {
    /// The addressed peer is not registered.
    #[error("unknown recipient {0}")]
    UnknownRecipient(PeerId),
    /// The recipient was resolved but the write to it failed.
    #[error("delivery to {to} failed: {source}")]
    DeliveryFailed {
        /// Recipient the write was addressed to.
        to: PeerId,
        /// Underlying write failure.
        #[source]
        source: SendError,
    },
    /// The envelope's type is not part of the protocol.
    #[error("unknown envelope type {0:?}")]
    UnknownType(String),
    /// The envelope is handled by the session, not relayed.
    #[error("{0} envelopes are not routable")]
    NotRoutable(&'static str),
}

/// Failure while handling a single inbound message.
///
/// None of these end the connection.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The message could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A registration attempt was refused.
    #[error(transparent)]
    Register(#[from] RegistryError),
    /// The envelope could not be relayed.
    #[error(transparent)]
    Route(#[from] RouteError),
}
