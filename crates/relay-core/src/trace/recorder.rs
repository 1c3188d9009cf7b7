//! TraceRecorder — owns every trace and enforces its state machine.
//!
//! Each trace sits behind its own lock, so steps for different traces never
//! contend. The trace file is rewritten while that lock is held, which keeps
//! the on-disk copy in step order.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::reader::{filter_traces, TraceQuery, TraceReader};
use super::types::*;
use super::writer::TraceWriter;
use crate::error::RelayError;
use crate::telemetry::{LogContext, Telemetry};

type Slot = Arc<Mutex<TraceEntry>>;

pub struct TraceRecorder {
    traces: RwLock<HashMap<String, Slot>>,
    writer: Option<TraceWriter>,
    telemetry: Telemetry,
}

impl TraceRecorder {
    /// Recorder with no durable storage (tests, dry runs).
    pub fn in_memory(telemetry: Telemetry) -> Self {
        Self {
            traces: RwLock::new(HashMap::new()),
            writer: None,
            telemetry,
        }
    }

    /// Recorder persisting under `dir`, reloading whatever is already there.
    pub async fn open(dir: impl AsRef<Path>, telemetry: Telemetry) -> Result<Self, RelayError> {
        let dir = dir.as_ref();
        let loaded = TraceReader::with_base_dir(dir)
            .load_all()
            .await
            .map_err(|e| RelayError::Io(e.to_string()))?;

        let count = loaded.len();
        let traces = loaded
            .into_iter()
            .map(|t| (t.trace_id.clone(), Arc::new(Mutex::new(t))))
            .collect();
        tracing::info!("[TraceRecorder] Loaded {} traces from {}", count, dir.display());

        Ok(Self {
            traces: RwLock::new(traces),
            writer: Some(TraceWriter::with_base_dir(dir)),
            telemetry,
        })
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    async fn slot(&self, trace_id: &str) -> Option<Slot> {
        self.traces.read().await.get(trace_id).cloned()
    }

    async fn persist(&self, entry: &TraceEntry) {
        if let Some(writer) = &self.writer {
            writer.write_safe(entry).await;
        }
    }

    pub async fn start_trace(
        &self,
        trace_id: &str,
        context: TraceContext,
    ) -> Result<TraceEntry, RelayError> {
        let entry = TraceEntry::new(trace_id, context);
        let slot = Arc::new(Mutex::new(entry.clone()));
        {
            let mut traces = self.traces.write().await;
            if traces.contains_key(trace_id) {
                return Err(RelayError::DuplicateTrace(trace_id.to_string()));
            }
            traces.insert(trace_id.to_string(), slot.clone());
        }

        let guard = slot.lock().await;
        self.persist(&guard).await;
        drop(guard);

        tracing::info!("[TraceRecorder] Started trace {}", trace_id);
        Ok(entry)
    }

    /// Append a step and return its id.
    ///
    /// Unknown or terminal traces are left untouched: a warning is logged
    /// and `None` is returned.
    pub async fn add_step(&self, trace_id: &str, record: StepRecord) -> Option<u64> {
        let Some(slot) = self.slot(trace_id).await else {
            self.telemetry.logs.warn(
                format!("Step {}/{} dropped: unknown trace {}", record.tool, record.action, trace_id),
                LogContext::tool(record.tool.clone()),
            );
            return None;
        };

        let mut entry = slot.lock().await;
        if entry.is_terminal() {
            self.telemetry.logs.warn(
                format!(
                    "Step {}/{} dropped: trace {} is already {}",
                    record.tool,
                    record.action,
                    trace_id,
                    entry.status.as_str()
                ),
                LogContext::tool(record.tool.clone()),
            );
            return None;
        }

        let step_id = entry.steps.last().map(|s| s.step_id + 1).unwrap_or(1);
        let step = record.into_step(step_id, Utc::now());
        self.telemetry.metrics.record(&step.tool, !step.is_failure());
        entry.steps.push(step);
        self.persist(&entry).await;
        Some(step_id)
    }

    /// Move an active trace to `completed` or `failed`.
    pub async fn end_trace(
        &self,
        trace_id: &str,
        outcome: TraceOutcome,
    ) -> Result<TraceEntry, RelayError> {
        let slot = self
            .slot(trace_id)
            .await
            .ok_or_else(|| RelayError::NotFound(format!("Trace {} not found", trace_id)))?;

        let mut entry = slot.lock().await;
        if entry.is_terminal() {
            return Err(RelayError::Conflict(format!(
                "Trace {} is already {}",
                trace_id,
                entry.status.as_str()
            )));
        }

        let now = Utc::now();
        entry.end_time = Some(now);
        entry.duration_ms = Some(elapsed_ms(entry.start_time, now));
        match outcome {
            TraceOutcome::Completed(result) => {
                entry.status = TraceStatus::Completed;
                entry.result = Some(result);
                entry.error = None;
            }
            TraceOutcome::Failed(error) => {
                entry.status = TraceStatus::Failed;
                entry.error = Some(error);
                entry.result = None;
            }
        }
        self.persist(&entry).await;

        tracing::info!(
            "[TraceRecorder] Trace {} {} after {}ms",
            trace_id,
            entry.status.as_str(),
            entry.duration_ms.unwrap_or(0)
        );
        Ok(entry.clone())
    }

    pub async fn get(&self, trace_id: &str) -> Option<TraceEntry> {
        let slot = self.slot(trace_id).await?;
        let entry = slot.lock().await;
        Some(entry.clone())
    }

    pub async fn is_active(&self, trace_id: &str) -> bool {
        match self.slot(trace_id).await {
            Some(slot) => !slot.lock().await.is_terminal(),
            None => false,
        }
    }

    async fn snapshot(&self) -> Vec<TraceEntry> {
        let slots: Vec<Slot> = self.traces.read().await.values().cloned().collect();
        let mut entries = Vec::with_capacity(slots.len());
        for slot in slots {
            entries.push(slot.lock().await.clone());
        }
        entries
    }

    pub async fn query(&self, query: &TraceQuery) -> Vec<TraceEntry> {
        let entries = self.snapshot().await;
        filter_traces(&entries, query)
    }

    /// Most recently started trace, optionally for one campaign.
    pub async fn latest(&self, campaign_id: Option<&str>) -> Option<TraceEntry> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|t| campaign_id.map_or(true, |id| t.campaign_id() == Some(id)))
            .max_by(|a, b| a.start_time.cmp(&b.start_time))
    }

    pub async fn len(&self) -> usize {
        self.traces.read().await.len()
    }

    /// Delete terminal traces that ended before `older_than`. Active traces stay.
    pub async fn prune(&self, older_than: DateTime<Utc>) -> Result<usize, RelayError> {
        let mut traces = self.traces.write().await;

        let mut expired = Vec::new();
        for (id, slot) in traces.iter() {
            let entry = slot.lock().await;
            if entry.is_terminal() && entry.end_time.map_or(false, |end| end < older_than) {
                expired.push(id.clone());
            }
        }

        for id in &expired {
            traces.remove(id);
            if let Some(writer) = &self.writer {
                writer
                    .remove(id)
                    .await
                    .map_err(|e| RelayError::Io(e.to_string()))?;
            }
        }

        if !expired.is_empty() {
            tracing::info!("[TraceRecorder] Pruned {} traces", expired.len());
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{LogLevel, LogQuery};
    use serde_json::json;

    fn recorder() -> TraceRecorder {
        TraceRecorder::in_memory(Telemetry::in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_start_twice_is_duplicate() {
        let rec = recorder();
        rec.start_trace("t1", TraceContext::default()).await.unwrap();
        let err = rec.start_trace("t1", TraceContext::default()).await.unwrap_err();
        assert!(matches!(err, RelayError::DuplicateTrace(id) if id == "t1"));
    }

    #[tokio::test]
    async fn test_steps_are_numbered_and_counted() {
        let rec = recorder();
        rec.start_trace("t1", TraceContext::default()).await.unwrap();
        assert_eq!(rec.add_step("t1", StepRecord::new("content", "attempt")).await, Some(1));
        assert_eq!(
            rec.add_step("t1", StepRecord::new("content", "attempt").error("bad json"))
                .await,
            Some(2)
        );

        let metrics = rec.telemetry().metrics.snapshot();
        assert_eq!(metrics.success("content"), 1);
        assert_eq!(metrics.failure("content"), 1);
    }

    #[tokio::test]
    async fn test_end_then_add_step_is_rejected_with_warning() {
        let rec = recorder();
        rec.start_trace("t1", TraceContext::default()).await.unwrap();
        let ended = rec.end_trace("t1", TraceOutcome::Completed(json!({"ok": true}))).await.unwrap();
        assert_eq!(ended.status, TraceStatus::Completed);
        assert!(ended.end_time.is_some());
        assert!(ended.duration_ms.is_some());
        assert!(ended.error.is_none());

        assert_eq!(rec.add_step("t1", StepRecord::new("design", "attempt")).await, None);
        let trace = rec.get("t1").await.unwrap();
        assert!(trace.steps.is_empty());
        assert_eq!(trace.status, TraceStatus::Completed);

        let warnings = rec.telemetry().logs.query(&LogQuery {
            level: Some(LogLevel::Warn),
            ..Default::default()
        });
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("already completed"));
    }

    #[tokio::test]
    async fn test_unknown_trace_step_is_a_warning() {
        let rec = recorder();
        assert_eq!(rec.add_step("ghost", StepRecord::new("x", "y")).await, None);
        assert_eq!(rec.telemetry().logs.len(), 1);
    }

    #[tokio::test]
    async fn test_end_twice_conflicts() {
        let rec = recorder();
        rec.start_trace("t1", TraceContext::default()).await.unwrap();
        rec.end_trace("t1", TraceOutcome::Failed("boom".into())).await.unwrap();
        let err = rec
            .end_trace("t1", TraceOutcome::Completed(json!(null)))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Conflict(_)));

        let trace = rec.get("t1").await.unwrap();
        assert_eq!(trace.status, TraceStatus::Failed);
        assert_eq!(trace.error.as_deref(), Some("boom"));
        assert!(trace.result.is_none());
    }

    #[tokio::test]
    async fn test_end_unknown_is_not_found() {
        let err = recorder()
            .end_trace("ghost", TraceOutcome::Failed("x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_traces_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let rec = TraceRecorder::open(dir.path(), Telemetry::in_memory().unwrap()).await.unwrap();
            rec.start_trace("t1", TraceContext::for_campaign("c1", "spring")).await.unwrap();
            rec.add_step("t1", StepRecord::new("handoff", "write")).await;
            rec.end_trace("t1", TraceOutcome::Failed("design exhausted".into()))
                .await
                .unwrap();
        }

        let rec = TraceRecorder::open(dir.path(), Telemetry::in_memory().unwrap()).await.unwrap();
        let trace = rec.get("t1").await.unwrap();
        assert_eq!(trace.status, TraceStatus::Failed);
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(rec.latest(Some("c1")).await.unwrap().trace_id, "t1");
        assert!(rec.latest(Some("c2")).await.is_none());
    }

    #[tokio::test]
    async fn test_prune_removes_only_old_terminal_traces() {
        let dir = tempfile::tempdir().unwrap();
        let rec = TraceRecorder::open(dir.path(), Telemetry::in_memory().unwrap()).await.unwrap();
        rec.start_trace("done", TraceContext::default()).await.unwrap();
        rec.end_trace("done", TraceOutcome::Completed(json!({}))).await.unwrap();
        rec.start_trace("running", TraceContext::default()).await.unwrap();

        let removed = rec.prune(Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(rec.get("done").await.is_none());
        assert!(rec.get("running").await.is_some());
        assert!(!dir.path().join("trace-done.json").exists());
        assert!(dir.path().join("trace-running.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_steps_across_traces_stay_sequential() {
        let rec = Arc::new(recorder());
        let traces = ["t1", "t2", "t3"];
        for id in traces {
            rec.start_trace(id, TraceContext::default()).await.unwrap();
        }

        let mut tasks = Vec::new();
        for id in traces {
            for worker in 0..4 {
                let rec = rec.clone();
                tasks.push(tokio::spawn(async move {
                    for _ in 0..25 {
                        let tool = if worker % 2 == 0 { "content" } else { "design" };
                        assert!(rec.add_step(id, StepRecord::new(tool, "attempt")).await.is_some());
                    }
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        for id in traces {
            let trace = rec.get(id).await.unwrap();
            let ids: Vec<u64> = trace.steps.iter().map(|s| s.step_id).collect();
            assert_eq!(ids, (1..=100).collect::<Vec<u64>>());
        }
        let metrics = rec.telemetry().metrics.snapshot();
        assert_eq!(metrics.success("content") + metrics.success("design"), 300);
    }
}
