//! Specialists — one per pipeline stage.
//!
//! A specialist turns the campaign plus the previous handoff into its own
//! stage output. The coordinator runs `attempt` inside the retry engine, so a
//! specialist reports every problem as an `AttemptOutcome::Failure` and
//! never substitutes a default for something it failed to produce.

pub mod collaborators;
pub mod content;
pub mod data_collection;
pub mod delivery;
pub mod design;
pub mod http;
pub mod quality;

pub use collaborators::*;
pub use content::ContentSpecialist;
pub use data_collection::DataCollectionSpecialist;
pub use delivery::DeliverySpecialist;
pub use design::DesignSpecialist;
pub use quality::QualitySpecialist;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::error::{GenerationError, RelayError};
use crate::handoff::{Deliverable, HandoffDocument, StageOutput, StageOutputs};
use crate::models::campaign::Campaign;
use crate::models::stage::Stage;
use crate::retry::{AttemptContext, AttemptOutcome};
use crate::trace::TraceRecorder;

/// Everything a stage may read.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub campaign: Campaign,
    /// Document produced by the previous stage; `None` for the first stage
    pub previous: Option<HandoffDocument>,
    pub trace_id: String,
}

impl StageInput {
    /// Outputs accumulated by earlier stages.
    pub fn outputs(&self) -> StageOutputs {
        self.previous
            .as_ref()
            .map(|d| d.stage_outputs.clone())
            .unwrap_or_default()
    }

    /// Fail with a non-retryable error when an upstream output is missing.
    pub fn require<T>(&self, stage: Stage, pick: impl FnOnce(&StageOutputs) -> Option<T>) -> Result<T, GenerationError> {
        let outputs = self.previous.as_ref().map(|d| &d.stage_outputs);
        outputs.and_then(pick).ok_or_else(|| {
            GenerationError::InvalidOutput(format!("no {} output in the incoming handoff", stage))
        })
    }
}

/// A stage's validated result, before it becomes a handoff document.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub output: StageOutput,
    pub summary: String,
    pub deliverables: Vec<Deliverable>,
    pub context_for_next: HashMap<String, String>,
    pub recommendations: Vec<String>,
    pub priority_items: Vec<String>,
    pub potential_issues: Vec<String>,
    pub success_criteria: Vec<String>,
    /// 0.0..=1.0
    pub data_quality_score: f64,
    pub warning_count: u32,
}

impl StageResult {
    pub fn new(output: StageOutput, summary: impl Into<String>) -> Self {
        Self {
            output,
            summary: summary.into(),
            deliverables: Vec::new(),
            context_for_next: HashMap::new(),
            recommendations: Vec::new(),
            priority_items: Vec::new(),
            potential_issues: Vec::new(),
            success_criteria: Vec::new(),
            data_quality_score: 1.0,
            warning_count: 0,
        }
    }
}

#[async_trait]
pub trait Specialist: Send + Sync {
    fn stage(&self) -> Stage;

    /// Short description used in retry errors and trace steps.
    fn task_description(&self) -> &str;

    async fn attempt(&self, input: &StageInput, ctx: AttemptContext) -> AttemptOutcome<StageResult>;
}

/// One specialist per stage, in pipeline order.
#[derive(Clone)]
pub struct SpecialistSet {
    specialists: Vec<Arc<dyn Specialist>>,
}

impl SpecialistSet {
    /// Build a set; every stage must be covered exactly once.
    pub fn new(mut specialists: Vec<Arc<dyn Specialist>>) -> Result<Self, RelayError> {
        specialists.sort_by_key(|s| s.stage());
        let stages: Vec<Stage> = specialists.iter().map(|s| s.stage()).collect();
        if stages != Stage::ALL {
            return Err(RelayError::Configuration(format!(
                "specialists must cover every stage once, got {:?}",
                stages
            )));
        }
        Ok(Self { specialists })
    }

    /// Wire the standard specialists to the given collaborators.
    pub fn standard(
        content: Arc<dyn ContentGenerator>,
        assets: Arc<dyn AssetLookup>,
        pricing: Option<Arc<dyn PriceLookup>>,
        recorder: Arc<TraceRecorder>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            specialists: vec![
                Arc::new(DataCollectionSpecialist::new(pricing, recorder)),
                Arc::new(ContentSpecialist::new(content)),
                Arc::new(DesignSpecialist::new(assets)),
                Arc::new(QualitySpecialist::new(config.quality.min_score)),
                Arc::new(DeliverySpecialist::new()),
            ],
        }
    }

    /// Standard specialists backed by the HTTP collaborators in `config`.
    pub fn from_config(config: &RelayConfig, recorder: Arc<TraceRecorder>) -> Result<Self, RelayError> {
        let collaborators = &config.collaborators;
        let content: Arc<dyn ContentGenerator> =
            Arc::new(http::AnthropicContentGenerator::from_config(&collaborators.content)?);
        let assets: Arc<dyn AssetLookup> = Arc::new(http::HttpAssetLookup::from_config(&collaborators.assets)?);
        let pricing: Option<Arc<dyn PriceLookup>> = match &collaborators.pricing {
            Some(endpoint) => Some(Arc::new(http::HttpPriceLookup::from_config(endpoint)?)),
            None => None,
        };
        Ok(Self::standard(content, assets, pricing, recorder, config))
    }

    pub fn get(&self, stage: Stage) -> &Arc<dyn Specialist> {
        &self.specialists[stage.index()]
    }
}
