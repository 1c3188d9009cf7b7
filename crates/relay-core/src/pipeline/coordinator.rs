//! PipelineCoordinator — sequences the stages of a campaign.
//!
//! For each stage it:
//! 1. Marks the campaign as running at that stage
//! 2. Runs the stage's specialist inside the retry engine
//! 3. Writes the `stage -> next` handoff document
//!
//! Delivery has no successor; its result becomes `delivery.json` and the
//! campaign completes. A stage that exhausts its retries ends the trace as
//! failed and leaves the last written handoff as the durable record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::RelayError;
use crate::handoff::{
    CampaignContext, Deliverable, DeliveryOutput, HandoffData, HandoffDocument, HandoffInfo,
    HandoffStore, QualityMetadata, StageOutput, ValidationStatus, WorkflowStatus,
    HANDOFF_SCHEMA_VERSION,
};
use crate::models::campaign::{Campaign, CampaignBrief, CampaignStatus};
use crate::models::stage::{completion_percentage, Stage};
use crate::retry::{RetryEngine, RetryPolicy, RetryTask};
use crate::specialists::{Specialist, SpecialistSet, StageInput, StageResult};
use crate::store::{CampaignProgress, CampaignStore};
use crate::telemetry::LogContext;
use crate::trace::{TraceContext, TraceOutcome, TraceRecorder};

pub const DELIVERY_REPORT_FILE: &str = "delivery.json";

/// Written next to the handoffs once delivery succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub campaign_id: String,
    pub trace_id: String,
    pub output: DeliveryOutput,
    pub deliverables: Vec<Deliverable>,
    pub summary: String,
    pub quality_score: f64,
    pub completed_at: DateTime<Utc>,
}

/// What a successful run did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub campaign_id: String,
    pub trace_id: String,
    pub stages_run: Vec<Stage>,
    pub handoff_ids: Vec<String>,
    pub delivery: DeliveryReport,
}

pub struct PipelineCoordinator {
    campaigns: Arc<CampaignStore>,
    handoffs: Arc<HandoffStore>,
    recorder: Arc<TraceRecorder>,
    engine: RetryEngine,
    specialists: SpecialistSet,
    policy: RetryPolicy,
    running: Mutex<HashSet<String>>,
}

/// Marks a campaign as in flight until dropped.
struct RunGuard<'a> {
    running: &'a Mutex<HashSet<String>>,
    campaign_id: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.campaign_id);
    }
}

impl PipelineCoordinator {
    pub fn new(
        campaigns: Arc<CampaignStore>,
        handoffs: Arc<HandoffStore>,
        recorder: Arc<TraceRecorder>,
        specialists: SpecialistSet,
        policy: RetryPolicy,
    ) -> Self {
        let engine = RetryEngine::new(recorder.clone(), recorder.telemetry().clone());
        Self {
            campaigns,
            handoffs,
            recorder,
            engine,
            specialists,
            policy,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Validate a brief and register a pending campaign for it.
    pub async fn create_campaign(&self, brief: CampaignBrief) -> Result<Campaign, RelayError> {
        brief.validate()?;
        let id = uuid::Uuid::new_v4().to_string();
        let root = self.handoffs.campaign_dir(&id);
        let campaign = Campaign::new(id, brief, root);
        self.campaigns.create(&campaign).await?;
        tracing::info!(
            "[Pipeline] Registered campaign {} ({})",
            campaign.id,
            campaign.brief.name
        );
        Ok(campaign)
    }

    /// Run a pending campaign from the first stage.
    pub async fn run(&self, campaign_id: &str) -> Result<PipelineReport, RelayError> {
        // Status is only read while the guard is held.
        let _guard = self.claim(campaign_id)?;
        let campaign = self.campaigns.require(campaign_id).await?;
        if campaign.status != CampaignStatus::Pending {
            return Err(RelayError::Conflict(format!(
                "Campaign {} is {}; only pending campaigns can be run",
                campaign_id,
                campaign.status.as_str()
            )));
        }
        self.execute(campaign, Stage::first(), None).await
    }

    /// Continue a campaign from the stage its latest handoff points at.
    pub async fn resume(&self, campaign_id: &str) -> Result<PipelineReport, RelayError> {
        let _guard = self.claim(campaign_id)?;
        let campaign = self.campaigns.require(campaign_id).await?;
        if campaign.status == CampaignStatus::Completed {
            return Err(RelayError::Conflict(format!(
                "Campaign {} is already completed",
                campaign_id
            )));
        }

        let latest = self.handoffs.latest(campaign_id).await?;
        let start = latest
            .as_ref()
            .map(|doc| doc.handoff_info.to_stage)
            .unwrap_or_else(Stage::first);
        tracing::info!("[Pipeline] Resuming campaign {} at {}", campaign_id, start);
        self.execute(campaign, start, latest).await
    }

    fn claim(&self, campaign_id: &str) -> Result<RunGuard<'_>, RelayError> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(campaign_id.to_string()) {
            return Err(RelayError::Conflict(format!(
                "Campaign {} is already running",
                campaign_id
            )));
        }
        Ok(RunGuard {
            running: &self.running,
            campaign_id: campaign_id.to_string(),
        })
    }

    async fn execute(
        &self,
        campaign: Campaign,
        start: Stage,
        mut previous: Option<HandoffDocument>,
    ) -> Result<PipelineReport, RelayError> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        self.recorder
            .start_trace(
                &trace_id,
                TraceContext::for_campaign(&campaign.id, &campaign.brief.topic),
            )
            .await?;

        let mut stages_run = Vec::new();
        let mut handoff_ids = Vec::new();

        for &stage in start.remaining() {
            let done = previous
                .as_ref()
                .map(|d| d.workflow_status.completed_stages.len())
                .unwrap_or(0);
            let progress = CampaignProgress {
                status: CampaignStatus::Running,
                current_stage: Some(stage),
                completion_percentage: completion_percentage(done),
                last_error: None,
                latest_trace_id: Some(trace_id.clone()),
            };
            if let Err(e) = self.campaigns.update_progress(&campaign.id, progress).await {
                return Err(self.fail(&campaign, stage, done, &trace_id, e).await);
            }

            let started = Instant::now();
            let result = match self.run_stage(&campaign, stage, &previous, &trace_id).await {
                Ok(result) => result,
                Err(e) => return Err(self.fail(&campaign, stage, done, &trace_id, e).await),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;
            stages_run.push(stage);

            self.recorder.telemetry().logs.info(
                format!("{} finished for campaign {} in {}ms", stage, campaign.id, elapsed_ms),
                LogContext::tool(stage.as_str()),
            );

            let Some(next) = stage.next() else {
                let delivery = match self.deliver(&campaign, &trace_id, result).await {
                    Ok(report) => report,
                    Err(e) => return Err(self.fail(&campaign, stage, done, &trace_id, e).await),
                };
                return self
                    .complete(&campaign, trace_id, done, stages_run, handoff_ids, delivery)
                    .await;
            };

            let doc = build_document(&campaign, stage, next, &trace_id, previous.as_ref(), result, elapsed_ms);
            if let Err(e) = self.handoffs.write(&doc).await {
                return Err(self.fail(&campaign, stage, done, &trace_id, e).await);
            }
            handoff_ids.push(doc.handoff_info.handoff_id.clone());
            previous = Some(doc);
        }

        // `start.remaining()` always ends with delivery.
        Err(RelayError::Internal(format!(
            "pipeline for {} ended without delivery",
            campaign.id
        )))
    }

    async fn run_stage(
        &self,
        campaign: &Campaign,
        stage: Stage,
        previous: &Option<HandoffDocument>,
        trace_id: &str,
    ) -> Result<StageResult, RelayError> {
        let specialist: &dyn Specialist = &**self.specialists.get(stage);
        let input = StageInput {
            campaign: campaign.clone(),
            previous: previous.clone(),
            trace_id: trace_id.to_string(),
        };
        let input = &input;
        let task = RetryTask {
            specialist: stage.as_str(),
            description: specialist.task_description(),
            trace_id: Some(trace_id),
        };

        let success = self
            .engine
            .run(task, &self.policy, move |ctx| specialist.attempt(input, ctx))
            .await?;
        if success.attempts > 1 {
            tracing::info!(
                "[Pipeline] {} succeeded for {} after {} attempts",
                stage,
                campaign.id,
                success.attempts
            );
        }
        Ok(success.value)
    }

    async fn deliver(
        &self,
        campaign: &Campaign,
        trace_id: &str,
        result: StageResult,
    ) -> Result<DeliveryReport, RelayError> {
        let output = match result.output {
            StageOutput::Delivery(output) => output,
            other => {
                return Err(RelayError::Internal(format!(
                    "delivery produced {} output",
                    other.stage()
                )))
            }
        };
        let report = DeliveryReport {
            campaign_id: campaign.id.clone(),
            trace_id: trace_id.to_string(),
            output,
            deliverables: result.deliverables,
            summary: result.summary,
            quality_score: result.data_quality_score,
            completed_at: Utc::now(),
        };

        let dir = self.handoffs.campaign_dir(&campaign.id);
        tokio::fs::create_dir_all(&dir).await?;
        let path: PathBuf = dir.join(DELIVERY_REPORT_FILE);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&report)?).await?;
        tracing::info!("[Pipeline] Delivery report written to {}", path.display());
        Ok(report)
    }

    async fn complete(
        &self,
        campaign: &Campaign,
        trace_id: String,
        done: usize,
        stages_run: Vec<Stage>,
        handoff_ids: Vec<String>,
        delivery: DeliveryReport,
    ) -> Result<PipelineReport, RelayError> {
        let progress = CampaignProgress {
            status: CampaignStatus::Completed,
            current_stage: Some(Stage::Delivery),
            completion_percentage: 100.0,
            last_error: None,
            latest_trace_id: Some(trace_id.clone()),
        };
        if let Err(e) = self.campaigns.update_progress(&campaign.id, progress).await {
            return Err(self.fail(campaign, Stage::Delivery, done, &trace_id, e).await);
        }

        // Only fails when the trace is missing or already terminal.
        self.recorder
            .end_trace(
                &trace_id,
                TraceOutcome::Completed(serde_json::json!({
                    "campaignId": campaign.id,
                    "handoffIds": handoff_ids,
                    "templatePath": delivery.output.template_path,
                })),
            )
            .await?;

        tracing::info!("[Pipeline] Campaign {} completed", campaign.id);
        Ok(PipelineReport {
            campaign_id: campaign.id.clone(),
            trace_id,
            stages_run,
            handoff_ids,
            delivery,
        })
    }

    /// Record a terminal stage failure and hand the error back.
    async fn fail(
        &self,
        campaign: &Campaign,
        stage: Stage,
        done: usize,
        trace_id: &str,
        error: RelayError,
    ) -> RelayError {
        let message = error.to_string();
        tracing::error!("[Pipeline] Campaign {} failed at {}: {}", campaign.id, stage, message);
        self.recorder.telemetry().logs.error(
            format!("Campaign {} stopped at {}", campaign.id, stage),
            LogContext::tool(stage.as_str()).with_error(message.clone()),
        );

        if let Err(e) = self
            .recorder
            .end_trace(trace_id, TraceOutcome::Failed(message.clone()))
            .await
        {
            tracing::warn!("[Pipeline] Could not close trace {}: {}", trace_id, e);
        }
        if let Err(e) = self
            .campaigns
            .update_progress(
                &campaign.id,
                CampaignProgress {
                    status: CampaignStatus::Failed,
                    current_stage: Some(stage),
                    completion_percentage: completion_percentage(done),
                    last_error: Some(message),
                    latest_trace_id: Some(trace_id.to_string()),
                },
            )
            .await
        {
            tracing::warn!("[Pipeline] Could not mark {} as failed: {}", campaign.id, e);
        }
        error
    }
}

fn build_document(
    campaign: &Campaign,
    from: Stage,
    to: Stage,
    trace_id: &str,
    previous: Option<&HandoffDocument>,
    result: StageResult,
    elapsed_ms: u64,
) -> HandoffDocument {
    let mut completed_stages = previous
        .map(|d| d.workflow_status.completed_stages.clone())
        .unwrap_or_default();
    completed_stages.push(from);

    let mut stage_outputs = previous.map(|d| d.stage_outputs.clone()).unwrap_or_default();
    stage_outputs.insert(result.output);
    let completeness = stage_outputs.stages().len() as f64 / completed_stages.len() as f64;

    HandoffDocument {
        handoff_info: HandoffInfo {
            from_stage: from,
            to_stage: to,
            handoff_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            campaign_id: campaign.id.clone(),
            trace_id: trace_id.to_string(),
            schema_version: HANDOFF_SCHEMA_VERSION.to_string(),
            execution_time_ms: elapsed_ms,
        },
        campaign_context: CampaignContext::from_campaign(campaign),
        stage_outputs,
        workflow_status: WorkflowStatus {
            completion_percentage: completion_percentage(completed_stages.len()),
            completed_stages,
            current_stage: to,
            next_stage: to.next(),
        },
        deliverables: result.deliverables,
        handoff_data: HandoffData {
            summary: result.summary,
            context_for_next: result.context_for_next,
            recommendations: result.recommendations,
            priority_items: result.priority_items,
            potential_issues: result.potential_issues,
            success_criteria: result.success_criteria,
        },
        quality_metadata: QualityMetadata {
            data_quality_score: result.data_quality_score.clamp(0.0, 1.0),
            completeness_score: completeness.clamp(0.0, 1.0),
            validation_status: if result.warning_count > 0 {
                ValidationStatus::Warnings
            } else {
                ValidationStatus::Passed
            },
            error_count: 0,
            warning_count: result.warning_count,
            processing_time_ms: elapsed_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::GenerationError;
    use crate::handoff::{DataCollectionOutput, QualityOutput};
    use crate::retry::{AttemptContext, AttemptOutcome};
    use crate::telemetry::Telemetry;
    use crate::test_support::{sample_brief, sample_content, sample_design};
    use crate::trace::TraceStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    /// Succeeds after `failures` failed attempts.
    struct Stub {
        stage: Stage,
        failures: AtomicU32,
    }

    impl Stub {
        fn ok(stage: Stage) -> Arc<dyn Specialist> {
            Self::failing(stage, 0)
        }

        fn failing(stage: Stage, failures: u32) -> Arc<dyn Specialist> {
            Arc::new(Self {
                stage,
                failures: AtomicU32::new(failures),
            })
        }
    }

    #[async_trait]
    impl Specialist for Stub {
        fn stage(&self) -> Stage {
            self.stage
        }

        fn task_description(&self) -> &str {
            "stub task"
        }

        async fn attempt(&self, input: &StageInput, _ctx: AttemptContext) -> AttemptOutcome<StageResult> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return AttemptOutcome::failure(GenerationError::InvalidOutput(format!(
                    "{} not ready",
                    self.stage
                )));
            }
            let output = match self.stage {
                Stage::DataCollection => StageOutput::DataCollection(DataCollectionOutput {
                    destinations: input.campaign.brief.destinations.clone(),
                    audience_insights: vec![],
                    pricing: None,
                    sources: vec!["brief".into()],
                }),
                Stage::Content => StageOutput::Content(sample_content()),
                Stage::Design => StageOutput::Design(sample_design()),
                Stage::Quality => StageOutput::Quality(QualityOutput {
                    score: 1.0,
                    passed: true,
                    checks: vec![],
                }),
                Stage::Delivery => StageOutput::Delivery(DeliveryOutput {
                    template_path: "deliverables/email.html".into(),
                    manifest_path: "deliverables/manifest.json".into(),
                    format: "html".into(),
                    size_bytes: 10,
                    delivered_at: Utc::now(),
                }),
            };
            AttemptOutcome::Success(StageResult::new(output, format!("{} done", self.stage)))
        }
    }

    /// Delivery that removes the campaign registry before reporting success.
    struct DropsRegistry {
        db: Database,
    }

    #[async_trait]
    impl Specialist for DropsRegistry {
        fn stage(&self) -> Stage {
            Stage::Delivery
        }

        fn task_description(&self) -> &str {
            "deliver, then lose the registry"
        }

        async fn attempt(&self, input: &StageInput, ctx: AttemptContext) -> AttemptOutcome<StageResult> {
            self.db
                .with_conn(|conn| conn.execute_batch("DROP TABLE campaigns"))
                .unwrap();
            Stub { stage: Stage::Delivery, failures: AtomicU32::new(0) }
                .attempt(input, ctx)
                .await
        }
    }

    /// Design that parks until released.
    struct Gate {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Specialist for Gate {
        fn stage(&self) -> Stage {
            Stage::Design
        }

        fn task_description(&self) -> &str {
            "wait for release"
        }

        async fn attempt(&self, input: &StageInput, ctx: AttemptContext) -> AttemptOutcome<StageResult> {
            self.entered.notify_one();
            self.release.notified().await;
            Stub { stage: Stage::Design, failures: AtomicU32::new(0) }
                .attempt(input, ctx)
                .await
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        db: Database,
        campaigns: Arc<CampaignStore>,
        handoffs: Arc<HandoffStore>,
        recorder: Arc<TraceRecorder>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(TraceRecorder::in_memory(Telemetry::in_memory().unwrap()));
        let db = Database::open_in_memory().unwrap();
        Fixture {
            campaigns: Arc::new(CampaignStore::new(db.clone())),
            db,
            handoffs: Arc::new(HandoffStore::new(dir.path().join("campaigns"), recorder.clone())),
            recorder,
            _dir: dir,
        }
    }

    fn coordinator(f: &Fixture, specialists: Vec<Arc<dyn Specialist>>) -> PipelineCoordinator {
        PipelineCoordinator::new(
            f.campaigns.clone(),
            f.handoffs.clone(),
            f.recorder.clone(),
            SpecialistSet::new(specialists).unwrap(),
            RetryPolicy::default(),
        )
    }

    fn all_ok() -> Vec<Arc<dyn Specialist>> {
        Stage::ALL.iter().map(|s| Stub::ok(*s)).collect()
    }

    fn with_design(design: Arc<dyn Specialist>) -> Vec<Arc<dyn Specialist>> {
        vec![
            Stub::ok(Stage::DataCollection),
            Stub::ok(Stage::Content),
            design,
            Stub::ok(Stage::Quality),
            Stub::ok(Stage::Delivery),
        ]
    }

    #[tokio::test]
    async fn test_create_campaign_rejects_invalid_brief() {
        let f = fixture();
        let pipeline = coordinator(&f, all_ok());
        let err = pipeline.create_campaign(CampaignBrief::default()).await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
        assert!(f.campaigns.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_run_completes_campaign() {
        let f = fixture();
        let pipeline = coordinator(&f, all_ok());
        let campaign = pipeline.create_campaign(sample_brief()).await.unwrap();

        let report = pipeline.run(&campaign.id).await.unwrap();
        assert_eq!(report.stages_run, Stage::ALL.to_vec());
        assert_eq!(report.handoff_ids.len(), 4);

        let docs = f.handoffs.list(&campaign.id).await.unwrap();
        let last = docs.last().unwrap();
        assert_eq!(last.handoff_info.from_stage, Stage::Quality);
        assert_eq!(last.workflow_status.current_stage, Stage::Delivery);
        assert_eq!(last.workflow_status.completion_percentage, 80.0);
        assert!(last.stage_outputs.contains(Stage::Content));

        let stored = f.campaigns.require(&campaign.id).await.unwrap();
        assert_eq!(stored.status, CampaignStatus::Completed);
        assert_eq!(stored.completion_percentage, 100.0);
        assert!(f
            .handoffs
            .campaign_dir(&campaign.id)
            .join(DELIVERY_REPORT_FILE)
            .exists());

        let trace = f.recorder.get(&report.trace_id).await.unwrap();
        assert_eq!(trace.status, TraceStatus::Completed);
    }

    #[tokio::test]
    async fn test_exhausted_stage_fails_campaign_and_keeps_prior_handoffs() {
        let f = fixture();
        let pipeline = coordinator(&f, with_design(Stub::failing(Stage::Design, u32::MAX)));
        let campaign = pipeline.create_campaign(sample_brief()).await.unwrap();

        let err = pipeline.run(&campaign.id).await.unwrap_err();
        assert!(matches!(err, RelayError::RetryExhausted { attempts: 5, .. }));

        let docs = f.handoffs.list(&campaign.id).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].workflow_status.current_stage, Stage::Design);

        let stored = f.campaigns.require(&campaign.id).await.unwrap();
        assert_eq!(stored.status, CampaignStatus::Failed);
        assert_eq!(stored.current_stage, Some(Stage::Design));
        assert_eq!(stored.completion_percentage, 40.0);
        assert!(stored.last_error.unwrap().contains("design not ready"));

        let trace = f.recorder.latest(Some(&campaign.id)).await.unwrap();
        assert_eq!(trace.status, TraceStatus::Failed);
        assert!(trace.error.is_some());
    }

    #[tokio::test]
    async fn test_resume_continues_from_latest_handoff() {
        let f = fixture();
        // Fails the first run's five attempts, then succeeds.
        let pipeline = coordinator(&f, with_design(Stub::failing(Stage::Design, 5)));
        let campaign = pipeline.create_campaign(sample_brief()).await.unwrap();
        assert!(pipeline.run(&campaign.id).await.is_err());

        let report = pipeline.resume(&campaign.id).await.unwrap();
        assert_eq!(report.stages_run, Stage::Design.remaining().to_vec());
        assert_eq!(f.handoffs.list(&campaign.id).await.unwrap().len(), 4);

        let stored = f.campaigns.require(&campaign.id).await.unwrap();
        assert_eq!(stored.status, CampaignStatus::Completed);
        assert_eq!(stored.latest_trace_id.as_deref(), Some(report.trace_id.as_str()));
    }

    #[tokio::test]
    async fn test_completed_campaign_cannot_be_rerun_or_resumed() {
        let f = fixture();
        let pipeline = coordinator(&f, all_ok());
        let campaign = pipeline.create_campaign(sample_brief()).await.unwrap();
        pipeline.run(&campaign.id).await.unwrap();

        assert!(matches!(pipeline.run(&campaign.id).await, Err(RelayError::Conflict(_))));
        assert!(matches!(pipeline.resume(&campaign.id).await, Err(RelayError::Conflict(_))));
        assert!(matches!(pipeline.run("missing").await, Err(RelayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_completion_still_closes_trace() {
        let f = fixture();
        let mut specialists = all_ok();
        specialists[Stage::Delivery.index()] = Arc::new(DropsRegistry { db: f.db.clone() });
        let pipeline = coordinator(&f, specialists);
        let campaign = pipeline.create_campaign(sample_brief()).await.unwrap();

        let err = pipeline.run(&campaign.id).await.unwrap_err();
        assert!(matches!(err, RelayError::Database(_)));

        let trace = f.recorder.latest(Some(&campaign.id)).await.unwrap();
        assert_eq!(trace.status, TraceStatus::Failed);
        assert!(trace.error.unwrap().contains("campaigns"));
    }

    #[tokio::test]
    async fn test_campaign_in_flight_cannot_be_started_twice() {
        let f = fixture();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let gate: Arc<dyn Specialist> = Arc::new(Gate {
            entered: entered.clone(),
            release: release.clone(),
        });
        let pipeline = Arc::new(coordinator(&f, with_design(gate)));
        let campaign = pipeline.create_campaign(sample_brief()).await.unwrap();

        let first = {
            let pipeline = pipeline.clone();
            let id = campaign.id.clone();
            tokio::spawn(async move { pipeline.run(&id).await })
        };
        entered.notified().await;

        assert!(matches!(pipeline.resume(&campaign.id).await, Err(RelayError::Conflict(_))));
        assert!(matches!(pipeline.run(&campaign.id).await, Err(RelayError::Conflict(_))));

        release.notify_one();
        first.await.unwrap().unwrap();

        // Settled: the fresh status now decides.
        assert!(matches!(pipeline.resume(&campaign.id).await, Err(RelayError::Conflict(_))));
        assert_eq!(f.handoffs.list(&campaign.id).await.unwrap().len(), 4);
    }
}
