// Push transport trait - the seam between the connection manager and the wire
use crate::domain::connection::DisconnectReason;
use crate::domain::error::TransportError;
use crate::infrastructure::config::EndpointConfig;
use async_trait::async_trait;
use serde_json::Value;

/// One inbound unit from an established session.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event { name: String, payload: Value },
    Closed(DisconnectReason),
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Establish one physical session, including any protocol handshake.
    async fn open(&self, endpoint: &EndpointConfig) -> Result<Box<dyn PushSession>, TransportError>;
}

#[async_trait]
pub trait PushSession: Send {
    /// Next frame in arrival order. Once `Closed` is returned the session
    /// is finished.
    async fn next_frame(&mut self) -> Frame;

    async fn close(&mut self);
}
