//! Relay Core — transport-agnostic domain logic for the Relay campaign pipeline.
//!
//! This crate contains the specialist pipeline, the handoff protocol, trace
//! recording, the in-process log buffer and the self-correcting retry engine.
//! It has **no HTTP framework dependency** by default, making it suitable for
//! use in:
//!
//! - HTTP servers (via `relay-server`)
//! - CLI tools (via `relay-cli`)
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `RelayError` for use in axum handlers.

pub mod config;
pub mod db;
pub mod error;
pub mod handoff;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod specialists;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod trace;

#[cfg(test)]
pub(crate) mod test_support;

// Convenience re-exports
pub use config::RelayConfig;
pub use db::Database;
pub use error::{FieldError, GenerationError, RelayError};
pub use pipeline::PipelineCoordinator;
pub use state::{AppState, AppStateInner};
pub use telemetry::Telemetry;
pub use trace::TraceRecorder;
