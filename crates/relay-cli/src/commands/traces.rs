//! `relay traces` — Query and prune persisted pipeline traces.

use chrono::{DateTime, Duration, Utc};

use relay_core::telemetry::LogLevel;
use relay_core::trace::{TraceQuery, TraceStatus};
use relay_core::AppState;

/// Raw filter flags as given on the command line.
#[derive(Debug, Default, Clone)]
pub struct TraceFilter {
    pub level: Option<String>,
    pub since: Option<String>,
    pub tool: Option<String>,
    pub limit: Option<usize>,
    pub campaign_id: Option<String>,
    pub status: Option<String>,
}

impl TraceFilter {
    fn to_query(&self) -> Result<TraceQuery, String> {
        let level = match self.level.as_deref() {
            None | Some("all") => None,
            Some(s) => Some(LogLevel::from_str(s).ok_or_else(|| format!("Unknown level '{}'", s))?),
        };
        let since = match self.since.as_deref() {
            None => None,
            Some(s) => Some(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|e| format!("Invalid --since '{}': {}", s, e))?
                    .with_timezone(&Utc),
            ),
        };
        let status = match self.status.as_deref() {
            None => None,
            Some(s) => Some(TraceStatus::from_str(s).ok_or_else(|| format!("Unknown status '{}'", s))?),
        };
        Ok(TraceQuery {
            level,
            since,
            tool: self.tool.clone(),
            limit: self.limit,
            campaign_id: self.campaign_id.clone(),
            status,
        })
    }
}

pub async fn query(state: &AppState, filter: &TraceFilter) -> Result<serde_json::Value, String> {
    let traces = state.recorder.query(&filter.to_query()?).await;
    Ok(serde_json::json!({
        "count": traces.len(),
        "traces": traces,
    }))
}

pub async fn get(state: &AppState, trace_id: &str) -> Result<serde_json::Value, String> {
    match state.recorder.get(trace_id).await {
        Some(trace) => Ok(serde_json::json!({ "trace": trace })),
        None => Err(format!("Trace {} not found", trace_id)),
    }
}

/// Remove finished traces older than `older_than_days`.
pub async fn prune(state: &AppState, older_than_days: i64) -> Result<serde_json::Value, String> {
    let cutoff = Utc::now() - Duration::days(older_than_days);
    let removed = state
        .recorder
        .prune(cutoff)
        .await
        .map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "removed": removed,
        "cutoff": cutoff,
    }))
}
