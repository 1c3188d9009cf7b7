//! Relay Server - Campaign Pipeline Backend
//!
//! A standalone Rust backend server for the Relay campaign pipeline, providing:
//! - RESTful HTTP API via axum (campaigns, handoffs, traces)
//! - The `/logs` query and management surface
//! - Background log flushing to `<data_root>/logs`
//!
//! This crate can be used standalone or embedded in other applications
//! (e.g., the `relay` CLI).

pub mod api;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use relay_core::telemetry::FlushTask;
use relay_core::{AppState, AppStateInner, RelayConfig};

const DEFAULT_LOG_FILTER: &str = "relay_core=info,relay_server=info,tower_http=info";

/// Configuration for the Relay backend server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Optional YAML file for `RelayConfig`; defaults apply when absent.
    pub config_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3220,
            config_path: None,
        }
    }
}

/// A running server. Dropping the handle stops the log flusher;
/// [`ServerHandle::shutdown`] also waits for its final flush.
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub state: AppState,
    flush_task: FlushTask,
}

impl ServerHandle {
    pub async fn shutdown(self) {
        self.flush_task.shutdown().await;
        tracing::info!("[Server] Log buffer flushed, shutting down");
    }
}

/// Install the fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .try_init();
}

/// Create a shared `AppState` from a loaded configuration.
///
/// This is useful when you need to share the state between the HTTP server
/// and other consumers (e.g. CLI commands running a campaign directly).
pub async fn create_app_state(config: RelayConfig) -> Result<AppState, String> {
    let state = AppStateInner::open(config)
        .await
        .map_err(|e| format!("Failed to initialize state: {}", e))?;
    Ok(Arc::new(state))
}

/// Start the embedded Rust backend server.
pub async fn start_server(config: ServerConfig) -> Result<ServerHandle, String> {
    init_tracing();

    let relay_config = RelayConfig::load(config.config_path.as_deref())
        .map_err(|e| format!("Failed to load configuration: {}", e))?;

    tracing::info!(
        "Starting Relay backend server on {}:{} (data root {})",
        config.host,
        config.port,
        relay_config.data_root.display()
    );

    let state = create_app_state(relay_config).await?;

    start_server_with_state(config, state).await
}

/// Build the full router (API + health) around `state`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server with a pre-built `AppState`.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<ServerHandle, String> {
    let app = build_router(state.clone());

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    let interval = Duration::from_secs(state.config.logging.flush_interval_secs);
    let flush_task = state.telemetry.spawn_flush_task(interval);

    tracing::info!("Relay backend server listening on {}", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        state,
        flush_task,
    })
}

async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "relay-server",
        "version": env!("CARGO_PKG_VERSION"),
        "traces": state.recorder.len().await,
        "bufferedLogs": state.telemetry.logs.len(),
    }))
}
