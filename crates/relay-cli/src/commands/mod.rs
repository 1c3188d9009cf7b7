//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the relay-core domain logic through `AppState`. Commands return the
//! JSON they would print so they can be exercised without a terminal.

pub mod handoffs;
pub mod logs;
pub mod run;
pub mod server;
pub mod traces;

use std::path::Path;

use relay_core::{AppState, RelayConfig};

/// Load the configuration and open a shared `AppState` over its data root.
pub async fn init_state(config_path: Option<&Path>) -> Result<AppState, String> {
    let config = RelayConfig::load(config_path)
        .map_err(|e| format!("Failed to load configuration: {}", e))?;
    relay_server::create_app_state(config).await
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
