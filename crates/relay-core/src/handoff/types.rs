//! Handoff document types.
//!
//! Version: 1.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::campaign::Campaign;
use crate::models::stage::Stage;

/// Current handoff schema version.
pub const HANDOFF_SCHEMA_VERSION: &str = "1.0";

/// Versions this build can read and validate.
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &["1.0"];

/// Top-level sections every document must carry.
pub const REQUIRED_SECTIONS: &[&str] = &[
    "handoff_info",
    "campaign_context",
    "stage_outputs",
    "workflow_status",
    "deliverables",
    "handoff_data",
    "quality_metadata",
];

/// Immutable snapshot transferring validated state from one stage to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffDocument {
    pub handoff_info: HandoffInfo,
    pub campaign_context: CampaignContext,
    pub stage_outputs: StageOutputs,
    pub workflow_status: WorkflowStatus,
    pub deliverables: Vec<Deliverable>,
    pub handoff_data: HandoffData,
    pub quality_metadata: QualityMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffInfo {
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub handoff_id: String,
    pub created_at: DateTime<Utc>,
    pub campaign_id: String,
    pub trace_id: String,
    pub schema_version: String,
    pub execution_time_ms: u64,
}

/// Campaign metadata denormalized so downstream stages never re-fetch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignContext {
    pub campaign_id: String,
    pub name: String,
    pub brand: String,
    pub audience: String,
    pub campaign_type: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub destinations: Vec<String>,
    #[serde(default)]
    pub key_messages: Vec<String>,
    pub root_path: String,
    pub created_at: DateTime<Utc>,
}

impl CampaignContext {
    pub fn from_campaign(campaign: &Campaign) -> Self {
        let brief = &campaign.brief;
        Self {
            campaign_id: campaign.id.clone(),
            name: brief.name.clone(),
            brand: brief.brand.clone(),
            audience: brief.audience.clone(),
            campaign_type: brief.campaign_type.clone(),
            topic: brief.topic.clone(),
            tone: brief.tone.clone(),
            origin: brief.origin.clone(),
            destinations: brief.destinations.clone(),
            key_messages: brief.key_messages.clone(),
            root_path: campaign.root_path.to_string_lossy().to_string(),
            created_at: campaign.created_at,
        }
    }
}

/// Per-stage results, keyed by stage name. Each slot has its own schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutputs {
    #[serde(rename = "data-collection", default, skip_serializing_if = "Option::is_none")]
    pub data_collection: Option<DataCollectionOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design: Option<DesignOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryOutput>,
}

impl StageOutputs {
    /// Store `output` in the slot belonging to its stage.
    pub fn insert(&mut self, output: StageOutput) {
        match output {
            StageOutput::DataCollection(o) => self.data_collection = Some(o),
            StageOutput::Content(o) => self.content = Some(o),
            StageOutput::Design(o) => self.design = Some(o),
            StageOutput::Quality(o) => self.quality = Some(o),
            StageOutput::Delivery(o) => self.delivery = Some(o),
        }
    }

    pub fn contains(&self, stage: Stage) -> bool {
        match stage {
            Stage::DataCollection => self.data_collection.is_some(),
            Stage::Content => self.content.is_some(),
            Stage::Design => self.design.is_some(),
            Stage::Quality => self.quality.is_some(),
            Stage::Delivery => self.delivery.is_some(),
        }
    }

    pub fn stages(&self) -> Vec<Stage> {
        Stage::ALL.into_iter().filter(|s| self.contains(*s)).collect()
    }
}

/// A single stage's result, tagged by the stage that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "output", rename_all = "kebab-case")]
pub enum StageOutput {
    DataCollection(DataCollectionOutput),
    Content(ContentOutput),
    Design(DesignOutput),
    Quality(QualityOutput),
    Delivery(DeliveryOutput),
}

impl StageOutput {
    pub fn stage(&self) -> Stage {
        match self {
            Self::DataCollection(_) => Stage::DataCollection,
            Self::Content(_) => Stage::Content,
            Self::Design(_) => Stage::Design,
            Self::Quality(_) => Stage::Quality,
            Self::Delivery(_) => Stage::Delivery,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataCollectionOutput {
    pub destinations: Vec<String>,
    pub audience_insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PriceSummary>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub origin: String,
    pub destination: String,
    pub currency: String,
    pub lowest_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_price: Option<f64>,
    pub retrieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentOutput {
    pub subject: String,
    pub preheader: String,
    pub headline: String,
    pub sections: Vec<ContentSection>,
    pub call_to_action: String,
    #[serde(default)]
    pub tone: String,
}

impl ContentOutput {
    pub fn word_count(&self) -> usize {
        self.sections
            .iter()
            .map(|s| s.body.split_whitespace().count())
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSection {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignOutput {
    pub layout: String,
    pub color_palette: Vec<String>,
    pub assets: Vec<AssetDescriptor>,
    #[serde(default)]
    pub search_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityOutput {
    /// Fraction of checks passed, 0.0..=1.0
    pub score: f64,
    pub passed: bool,
    pub checks: Vec<QualityCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutput {
    pub template_path: String,
    pub manifest_path: String,
    pub format: String,
    pub size_bytes: u64,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub completed_stages: Vec<Stage>,
    pub current_stage: Stage,
    pub next_stage: Option<Stage>,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliverable {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: u64,
    pub is_primary: bool,
}

/// Free-form guidance for the next stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandoffData {
    pub summary: String,
    #[serde(default)]
    pub context_for_next: HashMap<String, String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub priority_items: Vec<String>,
    #[serde(default)]
    pub potential_issues: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Passed,
    Warnings,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetadata {
    /// 0.0..=1.0
    pub data_quality_score: f64,
    /// 0.0..=1.0
    pub completeness_score: f64,
    pub validation_status: ValidationStatus,
    pub error_count: u32,
    pub warning_count: u32,
    pub processing_time_ms: u64,
}

/// Identifies which document to read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffSelector {
    Id(String),
    Stages { from: Stage, to: Stage },
}

/// Result of a successful write.
#[derive(Debug, Clone, Serialize)]
pub struct HandoffReceipt {
    pub handoff_id: String,
    pub path: std::path::PathBuf,
    pub archive_path: std::path::PathBuf,
}
