//! Execution traces — one trace per campaign run, one step per tool call.
//!
//! # Architecture
//!
//! - `TraceEntry` — a run: status, context, ordered steps, result or error
//! - `TraceStep` — one tool/stage invocation with timing and outcome
//! - `TraceRecorder` — state machine (`active → completed | failed`), per-trace
//!   locking, metric updates
//! - `TraceWriter` — atomic per-trace JSON persistence
//! - `TraceReader` / `TraceQuery` — reload and filter traces
//!
//! Storage: `<data_root>/traces/trace-{traceId}.json`

mod reader;
mod recorder;
mod types;
mod writer;

pub use reader::*;
pub use recorder::TraceRecorder;
pub use types::*;
pub use writer::*;
