// Main entry point - Dependency wiring and render loop
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use soil_node_telemetry::application::connection_manager::ConnectionRegistry;
use soil_node_telemetry::application::history_loader::HistoryLoader;
use soil_node_telemetry::application::synchronizer::TelemetrySynchronizer;
use soil_node_telemetry::infrastructure::config::load_dashboard_config;
use soil_node_telemetry::infrastructure::http_history_repository::HttpHistoryRepository;
use soil_node_telemetry::infrastructure::socketio::SocketIoTransport;
use soil_node_telemetry::presentation::app_state::AppState;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_dashboard_config()?;
    info!("Starting soil node dashboard against {}", config.backend.url);

    // Push channel (infrastructure + application layers)
    let registry = ConnectionRegistry::new(Arc::new(SocketIoTransport::new()));
    let connection = registry.register(config.endpoint_config());

    // Pull channel
    let repository = Arc::new(HttpHistoryRepository::new(config.backend.url.clone()));
    let history_loader = HistoryLoader::new(repository, config.history.source());

    let state = AppState {
        synchronizer: TelemetrySynchronizer::attach(&connection),
        history_loader,
    };
    // Start only once the synchronizer is attached so `telemetry:init` is not missed
    connection.connect();
    let mut telemetry_updates = state.synchronizer.watch();
    let mut history_updates = state.history_loader.subscribe();
    let history_task = state.history_loader.spawn_load();

    info!("{}", state.render().status_line());
    loop {
        tokio::select! {
            changed = telemetry_updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = history_updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
        info!("{}", state.render().status_line());
    }

    // Release the synchronizer's subscription before the connection goes away
    history_task.abort();
    drop(state);
    registry.shutdown().await;

    Ok(())
}
