// Typed errors for the push path
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint url {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("no supported transport in {0:?}")]
    UnsupportedTransport(Vec<String>),

    #[error("connect timed out after {0} ms")]
    Timeout(u128),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("namespace connect refused: {0}")]
    ConnectRefused(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// An inbound telemetry payload that could not be normalized.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}
