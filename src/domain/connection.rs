// Connection domain models
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Telemetry topics carried on the push channel. `Init` seeds state right
/// after (re)connect; both carry the same payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Init,
    Update,
}

impl Topic {
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "telemetry:init" => Some(Topic::Init),
            "telemetry:update" => Some(Topic::Update),
            _ => None,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Topic::Init => "telemetry:init",
            Topic::Update => "telemetry:update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    TransportClose,
    TransportError(String),
    PingTimeout,
    ServerDisconnect,
    ClientDisconnect,
}

impl DisconnectReason {
    /// A server-initiated disconnect is deliberate and is not retried.
    pub fn allows_reconnect(&self) -> bool {
        !matches!(
            self,
            DisconnectReason::ServerDisconnect | DisconnectReason::ClientDisconnect
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::TransportClose => f.write_str("transport close"),
            DisconnectReason::TransportError(e) => write!(f, "transport error: {}", e),
            DisconnectReason::PingTimeout => f.write_str("ping timeout"),
            DisconnectReason::ServerDisconnect => f.write_str("io server disconnect"),
            DisconnectReason::ClientDisconnect => f.write_str("io client disconnect"),
        }
    }
}
