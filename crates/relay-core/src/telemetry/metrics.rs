//! Per-tool success/failure counters with Prometheus text rendering.
//!
//! Each `MetricCounters` owns its own `prometheus::Registry`, so isolated
//! telemetry contexts never share counts.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::RelayError;

pub const TOOL_SUCCESS_TOTAL: &str = "tool_success_total";
pub const TOOL_FAILURE_TOTAL: &str = "tool_failure_total";

const TOOL_LABEL: &str = "tool";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub tool_success_total: BTreeMap<String, u64>,
    pub tool_failure_total: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn success(&self, tool: &str) -> u64 {
        self.tool_success_total.get(tool).copied().unwrap_or(0)
    }

    pub fn failure(&self, tool: &str) -> u64 {
        self.tool_failure_total.get(tool).copied().unwrap_or(0)
    }
}

pub struct MetricCounters {
    registry: Registry,
    success: IntCounterVec,
    failure: IntCounterVec,
}

impl MetricCounters {
    pub fn new() -> Result<Self, RelayError> {
        let registry = Registry::new();
        let success = IntCounterVec::new(
            Opts::new(TOOL_SUCCESS_TOTAL, "Total successful tool invocations"),
            &[TOOL_LABEL],
        )?;
        let failure = IntCounterVec::new(
            Opts::new(TOOL_FAILURE_TOTAL, "Total failed tool invocations"),
            &[TOOL_LABEL],
        )?;
        registry.register(Box::new(success.clone()))?;
        registry.register(Box::new(failure.clone()))?;
        Ok(Self {
            registry,
            success,
            failure,
        })
    }

    pub fn record(&self, tool: &str, success: bool) {
        let counters = if success { &self.success } else { &self.failure };
        counters.with_label_values(&[tool]).inc();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::default();
        for family in self.registry.gather() {
            let target = match family.get_name() {
                TOOL_SUCCESS_TOTAL => &mut snapshot.tool_success_total,
                TOOL_FAILURE_TOTAL => &mut snapshot.tool_failure_total,
                _ => continue,
            };
            for metric in family.get_metric() {
                let tool = metric
                    .get_label()
                    .iter()
                    .find(|pair| pair.get_name() == TOOL_LABEL)
                    .map(|pair| pair.get_value().to_string());
                if let Some(tool) = tool {
                    target.insert(tool, metric.get_counter().get_value() as u64);
                }
            }
        }
        snapshot
    }

    /// Drop every labelled child; counting restarts from zero.
    pub fn reset(&self) {
        self.success.reset();
        self.failure.reset();
    }

    pub fn render_prometheus(&self) -> Result<String, RelayError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| RelayError::Internal(e.to_string()))
    }
}
