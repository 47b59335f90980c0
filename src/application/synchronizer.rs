// Telemetry synchronizer - Push stream to authoritative snapshot and rolling history
use crate::application::connection_manager::{ConnectionManager, ConnectionObserver, Subscription};
use crate::application::payload::normalize_payload;
use crate::domain::connection::{ConnectionState, DisconnectReason, Topic};
use crate::domain::history::RollingHistoryBuffer;
use crate::domain::telemetry::TelemetrySnapshot;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// What subscribers see. Snapshot and history always come from the same
/// message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryView {
    pub snapshot: TelemetrySnapshot,
    pub history: Vec<u8>,
    pub connected: bool,
    pub messages_received: u64,
}

#[derive(Default)]
struct SyncState {
    snapshot: TelemetrySnapshot,
    history: RollingHistoryBuffer,
    connected: bool,
    messages_received: u64,
}

impl SyncState {
    fn view(&self) -> TelemetryView {
        TelemetryView {
            snapshot: self.snapshot.clone(),
            history: self.history.to_vec(),
            connected: self.connected,
            messages_received: self.messages_received,
        }
    }
}

/// Called once per accepted message and once per connectivity change, in
/// order, after the snapshot and history have both been updated.
/// Implementations must not block.
pub trait TelemetryObserver: Send + Sync {
    fn on_update(&self, view: &TelemetryView);
}

struct SyncCore {
    state: RwLock<SyncState>,
    updates: watch::Sender<TelemetryView>,
    observers: Mutex<Vec<(u64, Arc<dyn TelemetryObserver>)>>,
    next_id: AtomicU64,
}

impl SyncCore {
    fn publish(&self, view: TelemetryView) {
        let observers: Vec<Arc<dyn TelemetryObserver>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        for observer in observers {
            observer.on_update(&view);
        }
        self.updates.send_replace(view);
    }

    fn apply(&self, topic: Topic, payload: &Value) {
        let snapshot = match normalize_payload(payload, Utc::now()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Dropping {} message: {}", topic.event_name(), e);
                return;
            }
        };

        let view = {
            let mut state = self.state.write();
            state.history.push(snapshot.soil_pct);
            state.snapshot = snapshot;
            state.messages_received += 1;
            state.view()
        };
        tracing::debug!(
            "Applied {}: soil {}% ({} samples)",
            topic.event_name(),
            view.snapshot.soil_pct,
            view.history.len()
        );
        self.publish(view);
    }

    fn set_connected(&self, connected: bool) {
        let view = {
            let mut state = self.state.write();
            state.connected = connected;
            state.view()
        };
        self.publish(view);
    }
}

impl ConnectionObserver for SyncCore {
    fn on_connected(&self) {
        self.set_connected(true);
    }

    fn on_disconnected(&self, reason: &DisconnectReason) {
        tracing::info!("Telemetry feed offline: {}", reason);
        self.set_connected(false);
    }

    fn on_message(&self, topic: Topic, payload: &Value) {
        self.apply(topic, payload);
    }
}

/// Observer registration on a synchronizer. Dropping it unregisters.
pub struct TelemetrySubscription {
    id: u64,
    core: Weak<SyncCore>,
}

impl Drop for TelemetrySubscription {
    fn drop(&mut self) {
        if let Some(core) = self.core.upgrade() {
            core.observers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Subscribed to a connection for as long as it lives; dropping it (or
/// calling `detach`) releases the subscription.
pub struct TelemetrySynchronizer {
    core: Arc<SyncCore>,
    _subscription: Subscription,
}

impl TelemetrySynchronizer {
    pub fn attach(connection: &ConnectionManager) -> Self {
        let state = SyncState {
            connected: connection.state() == ConnectionState::Connected,
            ..Default::default()
        };
        let (updates, _) = watch::channel(state.view());
        let core = Arc::new(SyncCore {
            state: RwLock::new(state),
            updates,
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        });
        let subscription = connection.subscribe(core.clone());

        Self {
            core,
            _subscription: subscription,
        }
    }

    pub fn current(&self) -> TelemetryView {
        self.core.state.read().view()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.core.state.read().snapshot.clone()
    }

    pub fn history(&self) -> Vec<u8> {
        self.core.state.read().history.to_vec()
    }

    pub fn is_connected(&self) -> bool {
        self.core.state.read().connected
    }

    /// Deliver every published view to `observer` until the returned guard
    /// is dropped.
    pub fn subscribe(&self, observer: Arc<dyn TelemetryObserver>) -> TelemetrySubscription {
        let id = self.core.next_id.fetch_add(1, Ordering::Relaxed);
        self.core.observers.lock().push((id, observer));
        TelemetrySubscription {
            id,
            core: Arc::downgrade(&self.core),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.observers.lock().len()
    }

    /// Latest view only. Suits a render loop that may skip intermediate
    /// values.
    pub fn watch(&self) -> watch::Receiver<TelemetryView> {
        self.core.updates.subscribe()
    }

    pub fn detach(self) {}
}
