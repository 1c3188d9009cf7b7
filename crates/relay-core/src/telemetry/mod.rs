//! Process-wide observability context.
//!
//! # Architecture
//!
//! - `LogBuffer` — bounded ring of structured log lines, flushed to JSON-lines files
//! - `MetricCounters` — `tool_success_total` / `tool_failure_total` per tool
//! - `Telemetry` — cheap-to-clone handle bundling both, injected into every
//!   component that records logs or metrics
//! - `FlushTask` — background interval flush with a final flush on shutdown
//!
//! Storage: `<data_root>/logs/agent-{datetime}.log`

pub mod log_buffer;
pub mod metrics;

pub use log_buffer::*;
pub use metrics::*;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::LoggingConfig;
use crate::error::RelayError;

#[derive(Clone)]
pub struct Telemetry {
    pub logs: Arc<LogBuffer>,
    pub metrics: Arc<MetricCounters>,
}

impl Telemetry {
    /// Isolated in-memory context.
    pub fn in_memory() -> Result<Self, RelayError> {
        Ok(Self {
            logs: Arc::new(LogBuffer::new(DEFAULT_CAPACITY)),
            metrics: Arc::new(MetricCounters::new()?),
        })
    }

    /// Context whose log buffer flushes under `log_dir`.
    pub fn with_log_dir(config: &LoggingConfig, log_dir: impl AsRef<Path>) -> Result<Self, RelayError> {
        let logs = LogBuffer::with_log_dir(config.capacity, config.export_limit, log_dir);
        logs.set_level(config.level);
        Ok(Self {
            logs: Arc::new(logs),
            metrics: Arc::new(MetricCounters::new()?),
        })
    }

    /// Empty the live log buffer and reset every counter.
    pub fn clear(&self) -> usize {
        let removed = self.logs.clear();
        self.metrics.reset();
        tracing::info!("[Telemetry] Cleared {} log entries and reset metrics", removed);
        removed
    }

    /// Flush the log buffer every `interval` until the returned task is shut down.
    pub fn spawn_flush_task(&self, interval: Duration) -> FlushTask {
        let logs = self.logs.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = logs.flush().await {
                            tracing::warn!("[Telemetry] Periodic flush failed: {}", e);
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
            match logs.flush().await {
                Ok(n) => tracing::info!("[Telemetry] Final flush wrote {} entries", n),
                Err(e) => tracing::warn!("[Telemetry] Final flush failed: {}", e),
            }
        });

        FlushTask {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// Handle to the periodic flush task.
pub struct FlushTask {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FlushTask {
    /// Stop the interval and wait for the final flush to finish.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("[Telemetry] Flush task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for FlushTask {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
