//! Design: selects imagery and a layout for the drafted copy.

use async_trait::async_trait;
use std::sync::Arc;

use super::{AssetLookup, AssetQuery, Specialist, StageInput, StageResult};
use crate::error::GenerationError;
use crate::handoff::{ContentOutput, DesignOutput, StageOutput};
use crate::models::campaign::CampaignBrief;
use crate::models::stage::Stage;
use crate::retry::{AttemptContext, AttemptFailure, AttemptOutcome};

const ASSET_LIMIT: usize = 6;

const DEFAULT_PALETTE: [&str; 4] = ["#0b3954", "#087e8b", "#f5f5f5", "#ff5a5f"];

pub struct DesignSpecialist {
    assets: Arc<dyn AssetLookup>,
}

impl DesignSpecialist {
    pub fn new(assets: Arc<dyn AssetLookup>) -> Self {
        Self { assets }
    }
}

/// Search tags, most specific first. Retries drop the narrowest tags.
fn search_tags(brief: &CampaignBrief, content: &ContentOutput, attempt: u32) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push = |tag: &str| {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    };
    for section in &content.sections {
        push(&section.heading);
    }
    for destination in &brief.destinations {
        push(destination);
    }
    for word in brief.topic.split_whitespace().filter(|w| w.len() > 3) {
        push(word);
    }
    push(&brief.campaign_type);

    let drop = (attempt.saturating_sub(1) as usize).min(tags.len().saturating_sub(1));
    tags.split_off(drop)
}

fn layout_for(campaign_type: &str, sections: usize) -> &'static str {
    match campaign_type {
        "promotional" | "sale" if sections > 1 => "hero-grid",
        "promotional" | "sale" => "hero-two-column",
        "newsletter" => "stacked-articles",
        _ => "single-column",
    }
}

#[async_trait]
impl Specialist for DesignSpecialist {
    fn stage(&self) -> Stage {
        Stage::Design
    }

    fn task_description(&self) -> &str {
        "select imagery and layout"
    }

    async fn attempt(&self, input: &StageInput, ctx: AttemptContext) -> AttemptOutcome<StageResult> {
        let content = match input.require(Stage::Content, |o| o.content.clone()) {
            Ok(content) => content,
            Err(e) => return AttemptOutcome::Failure(AttemptFailure::new(e).fatal()),
        };
        let brief = &input.campaign.brief;

        let query = AssetQuery {
            tags: search_tags(brief, &content, ctx.attempt),
            limit: ASSET_LIMIT,
            feedback: ctx.feedback.as_ref().map(|f| f.message.clone()),
        };

        let assets = match self.assets.search(&query).await {
            Ok(assets) => assets,
            Err(e) => return AttemptOutcome::failure(e),
        };

        if assets.is_empty() {
            return AttemptOutcome::failure(GenerationError::InvalidOutput(format!(
                "no assets matched tags [{}]",
                query.tags.join(", ")
            )));
        }
        let missing_alt: Vec<&str> = assets
            .iter()
            .filter(|a| a.alt_text.trim().is_empty())
            .map(|a| a.id.as_str())
            .collect();
        if !missing_alt.is_empty() {
            let message = format!("assets without alt text: {}", missing_alt.join(", "));
            let partial = serde_json::to_string(&assets).unwrap_or_default();
            return AttemptOutcome::Failure(
                AttemptFailure::new(GenerationError::InvalidOutput(message)).with_partial(partial),
            );
        }

        let layout = layout_for(&brief.campaign_type, content.sections.len());
        let design = DesignOutput {
            layout: layout.to_string(),
            color_palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            assets,
            search_tags: query.tags.clone(),
        };

        let mut result = StageResult::new(
            StageOutput::Design(design.clone()),
            format!("Selected {} asset(s) for a {} layout", design.assets.len(), layout),
        );
        result
            .context_for_next
            .insert("layout".to_string(), layout.to_string());
        result
            .success_criteria
            .push("Quality score meets the configured minimum".to_string());
        AttemptOutcome::Success(result)
    }
}
