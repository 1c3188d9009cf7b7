//! Shared fixtures for unit tests.

use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::handoff::types::*;
use crate::models::campaign::{Campaign, CampaignBrief};
use crate::models::stage::{completion_percentage, Stage};

pub(crate) fn sample_brief() -> CampaignBrief {
    CampaignBrief {
        name: "Spring Escapes".into(),
        brand: "Northwind Travel".into(),
        audience: "frequent flyers".into(),
        campaign_type: "promotional".into(),
        topic: "spring city breaks".into(),
        tone: Some("warm".into()),
        origin: Some("LHR".into()),
        destinations: vec!["Lisbon".into(), "Porto".into()],
        key_messages: vec!["Fares from £89".into()],
        metadata: HashMap::new(),
    }
}

pub(crate) fn sample_campaign(id: &str, root: impl Into<PathBuf>) -> Campaign {
    Campaign::new(id.to_string(), sample_brief(), root.into())
}

/// A valid document moving `campaign_id` from `from` to its successor.
pub(crate) fn sample_document(campaign_id: &str, from: Stage, trace_id: &str) -> HandoffDocument {
    let to = from.next().unwrap_or(Stage::Delivery);
    let campaign = sample_campaign(campaign_id, format!("/tmp/campaigns/{}", campaign_id));
    let completed: Vec<Stage> = Stage::ALL[..=from.index()].to_vec();

    let mut stage_outputs = StageOutputs::default();
    for stage in &completed {
        match stage {
            Stage::DataCollection => stage_outputs.insert(StageOutput::DataCollection(
                DataCollectionOutput {
                    destinations: vec!["Lisbon".into(), "Porto".into()],
                    audience_insights: vec!["frequent flyers".into()],
                    pricing: None,
                    sources: vec!["brief".into()],
                },
            )),
            Stage::Content => stage_outputs.insert(StageOutput::Content(sample_content())),
            Stage::Design => stage_outputs.insert(StageOutput::Design(sample_design())),
            Stage::Quality => stage_outputs.insert(StageOutput::Quality(QualityOutput {
                score: 1.0,
                passed: true,
                checks: Vec::new(),
            })),
            Stage::Delivery => {}
        }
    }

    HandoffDocument {
        handoff_info: HandoffInfo {
            from_stage: from,
            to_stage: to,
            handoff_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            campaign_id: campaign_id.to_string(),
            trace_id: trace_id.to_string(),
            schema_version: HANDOFF_SCHEMA_VERSION.to_string(),
            execution_time_ms: 12,
        },
        campaign_context: CampaignContext::from_campaign(&campaign),
        stage_outputs,
        workflow_status: WorkflowStatus {
            current_stage: to,
            next_stage: to.next(),
            completion_percentage: completion_percentage(completed.len()),
            completed_stages: completed,
        },
        deliverables: Vec::new(),
        handoff_data: HandoffData {
            summary: format!("{} finished", from),
            ..Default::default()
        },
        quality_metadata: QualityMetadata {
            data_quality_score: 0.9,
            completeness_score: 1.0,
            validation_status: ValidationStatus::Passed,
            error_count: 0,
            warning_count: 0,
            processing_time_ms: 12,
        },
    }
}

pub(crate) fn sample_content() -> ContentOutput {
    ContentOutput {
        subject: "Spring city breaks from £89".into(),
        preheader: "Lisbon and Porto are calling".into(),
        headline: "Your spring escape starts here".into(),
        sections: vec![ContentSection {
            heading: "Lisbon".into(),
            body: "Trams, tiles and sunset viewpoints. Fly from London Heathrow \
                   this spring and spend long evenings above the river."
                .into(),
        }],
        call_to_action: "Book your break".into(),
        tone: "warm".into(),
    }
}

pub(crate) fn sample_design() -> DesignOutput {
    DesignOutput {
        layout: "hero-two-column".into(),
        color_palette: vec!["#0b3954".into(), "#ffffff".into()],
        assets: vec![AssetDescriptor {
            id: "a1".into(),
            url: "https://assets.example.com/lisbon.jpg".into(),
            alt_text: "Tram climbing a Lisbon street".into(),
            width: Some(1200),
            height: Some(600),
            attribution: None,
        }],
        search_tags: vec!["lisbon".into()],
    }
}
