//! TraceReader — load persisted traces and filter trace sets.
//!
//! Storage path: `<data_root>/traces/trace-{traceId}.json`
//!
//! Features:
//! - Reload every persisted trace at startup
//! - Filter by level, time, tool, campaign and status
//! - Newest first, with a result limit

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::types::{TraceEntry, TraceStatus, TraceStep};
use crate::telemetry::LogLevel;

/// Query parameters for filtering traces.
#[derive(Debug, Clone, Default)]
pub struct TraceQuery {
    /// Minimum severity. Failed steps and failed traces count as `error`,
    /// everything else as `info`.
    pub level: Option<LogLevel>,
    /// Only traces active at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only traces with at least one step for this tool; only those steps are kept
    pub tool: Option<String>,
    /// Maximum number of traces to return
    pub limit: Option<usize>,
    pub campaign_id: Option<String>,
    pub status: Option<TraceStatus>,
}

impl TraceQuery {
    fn step_matches(&self, step: &TraceStep) -> bool {
        if let Some(level) = self.level {
            if step_level(step) < level {
                return false;
            }
        }
        if let Some(since) = self.since {
            if step.timestamp < since {
                return false;
            }
        }
        if let Some(tool) = &self.tool {
            if &step.tool != tool {
                return false;
            }
        }
        true
    }

    /// Apply the query to one trace. Returns the trace with only matching
    /// steps, or `None` if the trace does not match.
    pub fn apply(&self, entry: &TraceEntry) -> Option<TraceEntry> {
        if let Some(campaign_id) = &self.campaign_id {
            if entry.campaign_id() != Some(campaign_id.as_str()) {
                return None;
            }
        }
        if let Some(status) = self.status {
            if entry.status != status {
                return None;
            }
        }
        if let Some(since) = self.since {
            if entry.last_activity() < since {
                return None;
            }
        }

        let steps: Vec<TraceStep> = entry
            .steps
            .iter()
            .filter(|s| self.step_matches(s))
            .cloned()
            .collect();

        if self.tool.is_some() && steps.is_empty() {
            return None;
        }
        if let Some(level) = self.level {
            let trace_level = if entry.status == TraceStatus::Failed {
                LogLevel::Error
            } else {
                LogLevel::Info
            };
            if trace_level < level && steps.is_empty() {
                return None;
            }
        }

        let mut matched = entry.clone();
        matched.steps = steps;
        Some(matched)
    }
}

fn step_level(step: &TraceStep) -> LogLevel {
    if step.is_failure() {
        LogLevel::Error
    } else {
        LogLevel::Info
    }
}

/// Filter `entries`, newest first, honouring the limit.
pub fn filter_traces<'a>(
    entries: impl IntoIterator<Item = &'a TraceEntry>,
    query: &TraceQuery,
) -> Vec<TraceEntry> {
    let mut traces: Vec<TraceEntry> = entries.into_iter().filter_map(|e| query.apply(e)).collect();
    traces.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| b.trace_id.cmp(&a.trace_id))
    });
    if let Some(limit) = query.limit {
        traces.truncate(limit);
    }
    traces
}

/// TraceReader loads traces persisted by `TraceWriter`.
#[derive(Clone)]
pub struct TraceReader {
    base_dir: PathBuf,
}

impl TraceReader {
    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Read every `trace-*.json` file. Unreadable files are skipped with a warning.
    pub async fn load_all(&self) -> Result<Vec<TraceEntry>, TraceReadError> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut read_dir = tokio::fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| TraceReadError::Io(format!("Failed to read trace dir: {}", e)))?;

        let mut traces = Vec::new();
        while let Some(item) = read_dir
            .next_entry()
            .await
            .map_err(|e| TraceReadError::Io(e.to_string()))?
        {
            let path = item.path();
            let is_trace = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("trace-") && n.ends_with(".json"))
                .unwrap_or(false);
            if !is_trace {
                continue;
            }

            let content = tokio::fs::read(&path)
                .await
                .map_err(|e| TraceReadError::Io(format!("Failed to read trace file: {}", e)))?;
            match serde_json::from_slice::<TraceEntry>(&content) {
                Ok(entry) => traces.push(entry),
                Err(e) => {
                    tracing::warn!("[TraceReader] Skipping {}: {}", path.display(), e);
                }
            }
        }
        Ok(traces)
    }
}

/// Error type for trace reading operations.
#[derive(Debug, thiserror::Error)]
pub enum TraceReadError {
    #[error("IO error: {0}")]
    Io(String),
}
