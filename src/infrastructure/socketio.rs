// Socket.IO v4 client over the Engine.IO websocket transport
use crate::application::push_transport::{Frame, PushSession, PushTransport};
use crate::domain::connection::DisconnectReason;
use crate::domain::error::TransportError;
use crate::infrastructure::config::{EndpointConfig, TransportKind};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Namespace connect for the default namespace
const CONNECT: &str = "40";
const DISCONNECT: &str = "41";
const PONG: &str = "3";
const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO open packet payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

impl Handshake {
    /// How long the server may stay silent before the session is dead
    pub fn idle_limit(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    Connect,
    Disconnect,
    Event { name: String, payload: Value },
    ConnectError(String),
    /// Valid but irrelevant to a receive-only client (acks, binary events, upgrades)
    Ignored(char),
}

pub fn decode_packet(text: &str) -> Result<Packet, TransportError> {
    let mut chars = text.chars();
    let engine_type = chars
        .next()
        .ok_or_else(|| TransportError::Protocol("empty packet".to_string()))?;
    let rest = chars.as_str();

    match engine_type {
        '0' => serde_json::from_str(rest)
            .map(Packet::Open)
            .map_err(|e| TransportError::Handshake(e.to_string())),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket_packet(rest),
        '5' => Ok(Packet::Ignored('5')),
        '6' => Ok(Packet::Noop),
        other => Err(TransportError::Protocol(format!("unknown packet type {:?}", other))),
    }
}

fn decode_socket_packet(text: &str) -> Result<Packet, TransportError> {
    let mut chars = text.chars();
    let socket_type = chars
        .next()
        .ok_or_else(|| TransportError::Protocol("empty message packet".to_string()))?;
    let (namespace, body) = split_namespace(chars.as_str());
    if namespace != DEFAULT_NAMESPACE {
        tracing::debug!("Ignoring packet for namespace {}", namespace);
        return Ok(Packet::Ignored(socket_type));
    }
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());

    match socket_type {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(body),
        '4' => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| body.to_string());
            Ok(Packet::ConnectError(message))
        }
        '3' | '5' | '6' => Ok(Packet::Ignored(socket_type)),
        other => Err(TransportError::Protocol(format!("unknown socket packet type {:?}", other))),
    }
}

/// Split an optional `/namespace,` prefix off a socket packet body.
fn split_namespace(body: &str) -> (&str, &str) {
    if !body.starts_with('/') {
        return (DEFAULT_NAMESPACE, body);
    }
    match body.split_once(',') {
        Some((namespace, rest)) => (namespace, rest),
        None => (body, ""),
    }
}

fn decode_event(body: &str) -> Result<Packet, TransportError> {
    let mut args: Vec<Value> = serde_json::from_str(body)
        .map_err(|e| TransportError::Protocol(format!("bad event body: {}", e)))?;
    if args.is_empty() {
        return Err(TransportError::Protocol("event without a name".to_string()));
    }
    let name = match args.remove(0) {
        Value::String(name) => name,
        other => {
            return Err(TransportError::Protocol(format!("event name is not a string: {}", other)));
        }
    };
    let payload = if args.is_empty() { Value::Null } else { args.remove(0) };
    Ok(Packet::Event { name, payload })
}

/// `http://host:5000` becomes `ws://host:5000/socket.io/?EIO=4&transport=websocket`
pub fn websocket_url(base: &str) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError::InvalidEndpoint {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid("cannot switch to a websocket scheme".to_string()))?;
    url.set_path("/socket.io/");
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

#[derive(Debug, Clone, Default)]
pub struct SocketIoTransport;

impl SocketIoTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushTransport for SocketIoTransport {
    async fn open(&self, endpoint: &EndpointConfig) -> Result<Box<dyn PushSession>, TransportError> {
        // Long-polling is not implemented; websocket must be acceptable
        if !endpoint.transports.contains(&TransportKind::WebSocket) {
            return Err(TransportError::UnsupportedTransport(
                endpoint
                    .transports
                    .iter()
                    .map(|t| format!("{:?}", t).to_lowercase())
                    .collect(),
            ));
        }

        let url = websocket_url(&endpoint.url)?;
        tracing::debug!("Opening {}", url);
        let (mut ws, _) = connect_async(url.as_str()).await?;

        let handshake = match read_packet(&mut ws).await? {
            Packet::Open(handshake) => handshake,
            other => {
                return Err(TransportError::Handshake(format!(
                    "expected open packet, got {:?}",
                    other
                )));
            }
        };
        tracing::debug!("Engine.IO session {} opened", handshake.sid);

        ws.send(Message::Text(CONNECT.to_string())).await?;
        loop {
            match read_packet(&mut ws).await? {
                Packet::Connect => break,
                Packet::ConnectError(message) => return Err(TransportError::ConnectRefused(message)),
                Packet::Ping => ws.send(Message::Text(PONG.to_string())).await?,
                Packet::Close => {
                    return Err(TransportError::Handshake("closed during connect".to_string()));
                }
                other => tracing::debug!("Ignoring {:?} before namespace connect", other),
            }
        }

        Ok(Box::new(SocketIoSession {
            ws,
            idle_limit: handshake.idle_limit(),
        }))
    }
}

async fn read_packet(ws: &mut WsStream) -> Result<Packet, TransportError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return decode_packet(&text),
            Some(Ok(Message::Close(_))) | None => {
                return Err(TransportError::Handshake("connection closed".to_string()));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

pub struct SocketIoSession {
    ws: WsStream,
    idle_limit: Duration,
}

#[async_trait]
impl PushSession for SocketIoSession {
    async fn next_frame(&mut self) -> Frame {
        loop {
            let message = match tokio::time::timeout(self.idle_limit, self.ws.next()).await {
                Err(_) => return Frame::Closed(DisconnectReason::PingTimeout),
                Ok(None) | Ok(Some(Ok(Message::Close(_)))) => {
                    return Frame::Closed(DisconnectReason::TransportClose);
                }
                Ok(Some(Err(e))) => return Frame::Closed(DisconnectReason::TransportError(e.to_string())),
                Ok(Some(Ok(Message::Text(text)))) => text,
                Ok(Some(Ok(_))) => continue,
            };

            match decode_packet(&message) {
                Ok(Packet::Ping) => {
                    if let Err(e) = self.ws.send(Message::Text(PONG.to_string())).await {
                        return Frame::Closed(DisconnectReason::TransportError(e.to_string()));
                    }
                }
                Ok(Packet::Event { name, payload }) => return Frame::Event { name, payload },
                Ok(Packet::Disconnect) => return Frame::Closed(DisconnectReason::ServerDisconnect),
                Ok(Packet::Close) => return Frame::Closed(DisconnectReason::TransportClose),
                Ok(other) => tracing::debug!("Ignoring {:?}", other),
                Err(e) => tracing::warn!("Dropping undecodable packet: {}", e),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws.send(Message::Text(DISCONNECT.to_string())).await;
        let _ = self.ws.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    const OPEN: &str = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

    #[test]
    fn test_decode_open_packet() {
        let packet = decode_packet(OPEN).unwrap();
        let Packet::Open(handshake) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(handshake.idle_limit(), Duration::from_millis(45000));
    }

    #[test]
    fn test_decode_control_packets() {
        assert_eq!(decode_packet("2").unwrap(), Packet::Ping);
        assert_eq!(decode_packet("6").unwrap(), Packet::Noop);
        assert_eq!(decode_packet(r#"40{"sid":"abc"}"#).unwrap(), Packet::Connect);
        assert_eq!(decode_packet("41").unwrap(), Packet::Disconnect);
        assert_eq!(
            decode_packet(r#"44{"message":"Not authorized"}"#).unwrap(),
            Packet::ConnectError("Not authorized".to_string())
        );
        assert!(decode_packet("").is_err());
        assert!(decode_packet("9").is_err());
    }

    #[test]
    fn test_decode_events() {
        assert_eq!(
            decode_packet(r#"42["telemetry:update",{"soil_pct":42}]"#).unwrap(),
            Packet::Event {
                name: "telemetry:update".to_string(),
                payload: json!({"soil_pct": 42}),
            }
        );
        assert_eq!(
            decode_packet(r#"427["telemetry:init",{"s_pct":3}]"#).unwrap(),
            Packet::Event {
                name: "telemetry:init".to_string(),
                payload: json!({"s_pct": 3}),
            }
        );
        assert_eq!(
            decode_packet(r#"42["connect_probe"]"#).unwrap(),
            Packet::Event {
                name: "connect_probe".to_string(),
                payload: Value::Null,
            }
        );
        assert!(decode_packet(r#"42[]"#).is_err());
        assert!(decode_packet(r#"42[17,{}]"#).is_err());
        assert!(decode_packet(r#"42{"soil_pct":1}"#).is_err());
    }

    #[test]
    fn test_other_namespaces_are_ignored() {
        assert_eq!(
            decode_packet(r#"42/admin,7["telemetry:init",{"s_pct":3}]"#).unwrap(),
            Packet::Ignored('2')
        );
        assert_eq!(decode_packet("40/admin,").unwrap(), Packet::Ignored('0'));
        assert_eq!(decode_packet("41/admin").unwrap(), Packet::Ignored('1'));
        assert_eq!(
            decode_packet(r#"42/,["telemetry:update",{}]"#).unwrap(),
            Packet::Event {
                name: "telemetry:update".to_string(),
                payload: json!({}),
            }
        );
    }

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("http://localhost:5000").unwrap().as_str(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            websocket_url("https://farm.example/").unwrap().as_str(),
            "wss://farm.example/socket.io/?EIO=4&transport=websocket"
        );
        assert!(websocket_url("ftp://farm.example").is_err());
        assert!(websocket_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_polling_only_is_unsupported() {
        let endpoint = EndpointConfig {
            transports: vec![TransportKind::Polling],
            ..EndpointConfig::new("http://127.0.0.1:1")
        };
        let result = SocketIoTransport::new().open(&endpoint).await;
        assert!(matches!(result, Err(TransportError::UnsupportedTransport(_))));
    }

    async fn expect_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("unexpected server read: {:?}", other),
            }
        }
    }

    /// Run a scripted Socket.IO server for one client and return its base URL.
    async fn spawn_server<F, Fut>(script: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            script(ws).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_session_delivers_events_and_answers_pings() {
        let base = spawn_server(|mut ws| async move {
            ws.send(Message::Text(OPEN.to_string())).await.unwrap();
            assert_eq!(expect_text(&mut ws).await, "40");
            ws.send(Message::Text(r#"40{"sid":"ns-1"}"#.to_string())).await.unwrap();

            ws.send(Message::Text("2".to_string())).await.unwrap();
            assert_eq!(expect_text(&mut ws).await, "3");

            ws.send(Message::Text(r#"42["telemetry:init",{"soil_pct":42,"pump_on":true}]"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Text("41".to_string())).await.unwrap();
            let _ = ws.next().await;
        })
        .await;

        let endpoint = EndpointConfig::new(base);
        let mut session = SocketIoTransport::new().open(&endpoint).await.unwrap();

        assert_eq!(
            session.next_frame().await,
            Frame::Event {
                name: "telemetry:init".to_string(),
                payload: json!({"soil_pct": 42, "pump_on": true}),
            }
        );
        assert_eq!(
            session.next_frame().await,
            Frame::Closed(DisconnectReason::ServerDisconnect)
        );
    }

    #[tokio::test]
    async fn test_namespace_connect_error_is_reported() {
        let base = spawn_server(|mut ws| async move {
            ws.send(Message::Text(OPEN.to_string())).await.unwrap();
            assert_eq!(expect_text(&mut ws).await, "40");
            ws.send(Message::Text(r#"44{"message":"Not authorized"}"#.to_string()))
                .await
                .unwrap();
            let _ = ws.next().await;
        })
        .await;

        let result = SocketIoTransport::new().open(&EndpointConfig::new(base)).await;
        match result {
            Err(TransportError::ConnectRefused(message)) => assert_eq!(message, "Not authorized"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connect should have been refused"),
        }
    }

    #[tokio::test]
    async fn test_server_close_ends_session() {
        let base = spawn_server(|mut ws| async move {
            ws.send(Message::Text(OPEN.to_string())).await.unwrap();
            assert_eq!(expect_text(&mut ws).await, "40");
            ws.send(Message::Text(r#"40{"sid":"ns-2"}"#.to_string())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut session = SocketIoTransport::new()
            .open(&EndpointConfig::new(base))
            .await
            .unwrap();
        assert_eq!(
            session.next_frame().await,
            Frame::Closed(DisconnectReason::TransportClose)
        );
    }

    #[tokio::test]
    async fn test_silent_server_ends_session_with_ping_timeout() {
        const SHORT_OPEN: &str = r#"0{"sid":"quiet","upgrades":[],"pingInterval":50,"pingTimeout":50,"maxPayload":1000000}"#;
        let base = spawn_server(|mut ws| async move {
            ws.send(Message::Text(SHORT_OPEN.to_string())).await.unwrap();
            assert_eq!(expect_text(&mut ws).await, "40");
            ws.send(Message::Text(r#"40{"sid":"ns-3"}"#.to_string())).await.unwrap();
            // Stay silent until the client gives up
            let _ = ws.next().await;
        })
        .await;

        let mut session = SocketIoTransport::new()
            .open(&EndpointConfig::new(base))
            .await
            .unwrap();
        let started = tokio::time::Instant::now();
        let frame = tokio::time::timeout(Duration::from_secs(2), session.next_frame())
            .await
            .expect("session never timed out");

        assert_eq!(frame, Frame::Closed(DisconnectReason::PingTimeout));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
