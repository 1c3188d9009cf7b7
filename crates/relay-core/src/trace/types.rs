//! Trace domain types — one entry per campaign run, one step per tool call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Lifecycle of a trace: `active → completed | failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Active,
    Completed,
    Failed,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Topic and workflow metadata captured when a trace starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl TraceContext {
    pub fn for_campaign(campaign_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            campaign_id: Some(campaign_id.into()),
            topic: Some(topic.into()),
            workflow: Some("email-campaign".to_string()),
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    /// Monotonic within one trace, starting at 1
    pub step_id: u64,
    pub tool: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TraceStep {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub trace_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub status: TraceStatus,
    #[serde(default)]
    pub context: TraceContext,
    #[serde(default)]
    pub steps: Vec<TraceStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceEntry {
    pub fn new(trace_id: impl Into<String>, context: TraceContext) -> Self {
        Self {
            trace_id: trace_id.into(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            status: TraceStatus::Active,
            context,
            steps: Vec::new(),
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn campaign_id(&self) -> Option<&str> {
        self.context.campaign_id.as_deref()
    }

    pub fn has_error_steps(&self) -> bool {
        self.steps.iter().any(TraceStep::is_failure)
    }

    /// End time, else the newest step, else the start.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.end_time
            .or_else(|| self.steps.last().map(|s| s.timestamp))
            .unwrap_or(self.start_time)
    }
}

/// A step as reported by a caller, before the recorder numbers it.
#[derive(Debug, Clone, Default)]
pub struct StepRecord {
    pub tool: String,
    pub action: String,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// When the step began; used to compute the duration if none is given
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl StepRecord {
    pub fn new(tool: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub(crate) fn into_step(self, step_id: u64, now: DateTime<Utc>) -> TraceStep {
        let duration_ms = self.duration_ms.unwrap_or_else(|| {
            self.started_at
                .map(|start| elapsed_ms(start, now))
                .unwrap_or(0)
        });
        TraceStep {
            step_id,
            tool: self.tool,
            action: self.action,
            timestamp: now,
            params: self.params,
            result: self.result,
            error: self.error,
            duration_ms,
        }
    }
}

/// How a trace ends. Exactly one of result or error is kept.
#[derive(Debug, Clone)]
pub enum TraceOutcome {
    Completed(Value),
    Failed(String),
}

pub(crate) fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}
