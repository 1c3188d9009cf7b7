//! `relay server` — Start the Relay HTTP backend server.

use std::path::PathBuf;

pub async fn run(host: String, port: u16, config_path: Option<PathBuf>) -> Result<(), String> {
    let config = relay_server::ServerConfig {
        host: host.clone(),
        port,
        config_path,
    };

    println!("Starting Relay server on {}:{}...", host, port);

    let handle = relay_server::start_server(config).await?;
    println!("Relay server listening on http://{}", handle.addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    handle.shutdown().await;
    Ok(())
}
