// Connection manager - One logical push channel per endpoint, with reconnection
use crate::application::push_transport::{Frame, PushSession, PushTransport};
use crate::domain::connection::{ConnectionState, DisconnectReason, Topic};
use crate::domain::error::TransportError;
use crate::infrastructure::config::EndpointConfig;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receives lifecycle and telemetry events, synchronously and in arrival
/// order, from the manager's driver task. Implementations must not block.
pub trait ConnectionObserver: Send + Sync {
    fn on_connected(&self) {}
    fn on_disconnected(&self, _reason: &DisconnectReason) {}
    fn on_message(&self, _topic: Topic, _payload: &Value) {}
}

struct Shared {
    endpoint: EndpointConfig,
    transport: Arc<dyn PushTransport>,
    state: watch::Sender<ConnectionState>,
    observers: Mutex<Vec<(u64, Arc<dyn ConnectionObserver>)>>,
    next_id: AtomicU64,
}

impl Shared {
    fn dispatch(&self, f: impl Fn(&dyn ConnectionObserver)) {
        // Snapshot the list so observers may unsubscribe from inside a callback
        let observers: Vec<Arc<dyn ConnectionObserver>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        for observer in observers {
            f(observer.as_ref());
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

/// Guard for an observer registration. Dropping it unregisters.
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.observers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

struct Driver {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

impl ConnectionManager {
    pub fn new(endpoint: EndpointConfig, transport: Arc<dyn PushTransport>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                endpoint,
                transport,
                state,
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
            driver: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.shared.endpoint
    }

    /// Start the connection driver. A no-op while it is already connecting,
    /// connected or waiting to reconnect.
    pub fn connect(&self) {
        let mut driver = self.driver.lock();
        if let Some(running) = driver.as_ref() {
            if !running.task.is_finished() {
                debug!("Connect to {} ignored, already running", self.shared.endpoint.url);
                return;
            }
        }

        let (stop, stop_rx) = watch::channel(false);
        let shared = self.shared.clone();
        let task = tokio::spawn(async move { run_driver(shared, stop_rx).await });
        *driver = Some(Driver { stop, task });
    }

    /// Close the session and stop reconnecting. Observers see
    /// `io client disconnect` if a session was up.
    pub async fn disconnect(&self) {
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            let _ = driver.stop.send(true);
            if let Err(e) = driver.task.await {
                error!("Connection driver for {} failed: {}", self.shared.endpoint.url, e);
            }
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    pub fn is_running(&self) -> bool {
        self.driver
            .lock()
            .as_ref()
            .is_some_and(|d| !d.task.is_finished())
    }

    pub fn subscribe(&self, observer: Arc<dyn ConnectionObserver>) -> Subscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.observers.lock().push((id, observer));
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.lock().len()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }
}

async fn run_driver(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let endpoint = &shared.endpoint;
    let mut attempts: u32 = 0;

    loop {
        shared.set_state(ConnectionState::Connecting);
        debug!("Connecting to {} (attempt {})", endpoint.url, attempts + 1);

        let opened = tokio::select! {
            _ = stop.changed() => break,
            opened = tokio::time::timeout(endpoint.timeout, shared.transport.open(endpoint)) => {
                opened.unwrap_or_else(|_| Err(TransportError::Timeout(endpoint.timeout.as_millis())))
            }
        };

        match opened {
            Ok(session) => {
                attempts = 0;
                info!("Connected to {}", endpoint.url);
                shared.set_state(ConnectionState::Connected);
                shared.dispatch(|o| o.on_connected());

                let Some(reason) = pump_session(&shared, session, &mut stop).await else {
                    shared.set_state(ConnectionState::Disconnected);
                    shared.dispatch(|o| o.on_disconnected(&DisconnectReason::ClientDisconnect));
                    info!("Disconnected from {} by client", endpoint.url);
                    return;
                };

                shared.set_state(ConnectionState::Disconnected);
                warn!("Disconnected from {}: {}", endpoint.url, reason);
                shared.dispatch(|o| o.on_disconnected(&reason));

                if !reason.allows_reconnect() {
                    info!("Not reconnecting to {} after {}", endpoint.url, reason);
                    return;
                }
            }
            Err(e) => {
                shared.set_state(ConnectionState::Disconnected);
                warn!("Connect error for {}: {}", endpoint.url, e);
            }
        }

        if !endpoint.may_reconnect(attempts) {
            warn!(
                "Giving up on {} after {} reconnection attempts",
                endpoint.url, attempts
            );
            break;
        }
        attempts += 1;
        let delay = endpoint.reconnect_delay(attempts);
        debug!("Reconnecting to {} in {:?}", endpoint.url, delay);

        tokio::select! {
            _ = stop.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}

/// Deliver frames until the session ends. Returns `None` when stopped by
/// the client.
async fn pump_session(
    shared: &Shared,
    mut session: Box<dyn PushSession>,
    stop: &mut watch::Receiver<bool>,
) -> Option<DisconnectReason> {
    loop {
        let frame = tokio::select! {
            _ = stop.changed() => {
                session.close().await;
                return None;
            }
            frame = session.next_frame() => frame,
        };

        match frame {
            Frame::Event { name, payload } => match Topic::from_event_name(&name) {
                Some(topic) => shared.dispatch(|o| o.on_message(topic, &payload)),
                None => debug!("Ignoring event {}", name),
            },
            Frame::Closed(reason) => return Some(reason),
        }
    }
}

/// Owns the one-manager-per-endpoint guarantee. Created at startup and
/// torn down with `shutdown`.
pub struct ConnectionRegistry {
    transport: Arc<dyn PushTransport>,
    connections: Mutex<HashMap<String, Arc<ConnectionManager>>>,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self {
            transport,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Return the manager for this endpoint without starting it, creating it
    /// on first use. Lets observers attach before the first event can arrive.
    /// A differing config for a known endpoint is reported and the first one
    /// is kept.
    pub fn register(&self, endpoint: EndpointConfig) -> Arc<ConnectionManager> {
        let mut connections = self.connections.lock();

        if let Some(existing) = connections.get(&endpoint.url) {
            if existing.endpoint() != &endpoint {
                error!(
                    "Conflicting connection config for {}, reusing the first one",
                    endpoint.url
                );
            }
            return existing.clone();
        }

        let url = endpoint.url.clone();
        let manager = Arc::new(ConnectionManager::new(endpoint, self.transport.clone()));
        connections.insert(url, manager.clone());
        manager
    }

    /// `register` and start the manager's driver if it is not running.
    pub fn connect(&self, endpoint: EndpointConfig) -> Arc<ConnectionManager> {
        let manager = self.register(endpoint);
        manager.connect();
        manager
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    pub async fn shutdown(&self) {
        let managers: Vec<Arc<ConnectionManager>> =
            self.connections.lock().drain().map(|(_, m)| m).collect();
        for manager in managers {
            manager.disconnect().await;
        }
    }
}
