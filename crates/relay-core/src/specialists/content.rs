//! Content: asks the language model for a typed email draft.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};

use super::{ContentGenerator, ContentRequest, Specialist, StageInput, StageResult};
use crate::error::GenerationError;
use crate::handoff::{ContentOutput, ContentSection, DataCollectionOutput, StageOutput};
use crate::models::campaign::CampaignBrief;
use crate::models::stage::Stage;
use crate::retry::{AttemptContext, AttemptFailure, AttemptOutcome};

const SYSTEM_PROMPT: &str = "You write marketing email copy. Reply with a single JSON object \
with the keys subject, preheader, headline, sections (array of {heading, body}) and \
call_to_action. Do not add any other text.";

pub const MAX_SUBJECT_CHARS: usize = 90;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("valid fenced json regex")
});

/// Shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct Draft {
    subject: String,
    preheader: String,
    headline: String,
    sections: Vec<ContentSection>,
    call_to_action: String,
}

pub struct ContentSpecialist {
    generator: Arc<dyn ContentGenerator>,
}

impl ContentSpecialist {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

fn build_prompt(brief: &CampaignBrief, data: &DataCollectionOutput) -> String {
    let mut prompt = format!(
        "Brand: {}\nCampaign: {}\nType: {}\nTopic: {}\nAudience: {}\n",
        brief.brand, brief.name, brief.campaign_type, brief.topic, brief.audience
    );
    if let Some(tone) = &brief.tone {
        prompt.push_str(&format!("Tone: {}\n", tone));
    }
    if !data.destinations.is_empty() {
        prompt.push_str(&format!("Destinations: {}\n", data.destinations.join(", ")));
    }
    if let Some(price) = &data.pricing {
        prompt.push_str(&format!(
            "Lowest fare: {} {:.0} from {} to {}\n",
            price.currency, price.lowest_price, price.origin, price.destination
        ));
    }
    for insight in &data.audience_insights {
        prompt.push_str(&format!("- {}\n", insight));
    }
    prompt
}

/// Pull the JSON object out of a reply, tolerating a fenced code block.
fn extract_json(reply: &str) -> &str {
    if let Some(caps) = FENCED_JSON.captures(reply) {
        if let Some(m) = caps.get(1) {
            return m.as_str();
        }
    }
    match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if end > start => &reply[start..=end],
        _ => reply.trim(),
    }
}

fn parse_draft(reply: &str, tone: &str) -> Result<ContentOutput, GenerationError> {
    let draft: Draft = serde_json::from_str(extract_json(reply))
        .map_err(|e| GenerationError::InvalidOutput(format!("reply is not a valid draft: {}", e)))?;

    let mut problems = Vec::new();
    for (field, value) in [
        ("subject", &draft.subject),
        ("preheader", &draft.preheader),
        ("headline", &draft.headline),
        ("call_to_action", &draft.call_to_action),
    ] {
        if value.trim().is_empty() {
            problems.push(format!("{} is empty", field));
        }
    }
    if draft.subject.chars().count() > MAX_SUBJECT_CHARS {
        problems.push(format!("subject exceeds {} characters", MAX_SUBJECT_CHARS));
    }
    if draft.sections.is_empty() {
        problems.push("sections is empty".to_string());
    }
    if draft.sections.iter().any(|s| s.body.trim().is_empty()) {
        problems.push("a section has an empty body".to_string());
    }
    if !problems.is_empty() {
        return Err(GenerationError::InvalidOutput(problems.join("; ")));
    }

    Ok(ContentOutput {
        subject: draft.subject.trim().to_string(),
        preheader: draft.preheader.trim().to_string(),
        headline: draft.headline.trim().to_string(),
        sections: draft.sections,
        call_to_action: draft.call_to_action.trim().to_string(),
        tone: tone.to_string(),
    })
}

#[async_trait]
impl Specialist for ContentSpecialist {
    fn stage(&self) -> Stage {
        Stage::Content
    }

    fn task_description(&self) -> &str {
        "write email copy"
    }

    async fn attempt(&self, input: &StageInput, ctx: AttemptContext) -> AttemptOutcome<StageResult> {
        let data = match input.require(Stage::DataCollection, |o| o.data_collection.clone()) {
            Ok(data) => data,
            Err(e) => return AttemptOutcome::Failure(AttemptFailure::new(e).fatal()),
        };
        let brief = &input.campaign.brief;

        let request = ContentRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(brief, &data),
            feedback: ctx.feedback.as_ref().map(|f| f.as_prompt()),
        };

        let reply = match self.generator.generate(&request).await {
            Ok(reply) => reply,
            Err(e) => return AttemptOutcome::failure(e),
        };

        let tone = brief.tone.clone().unwrap_or_else(|| "neutral".to_string());
        match parse_draft(&reply, &tone) {
            Ok(content) => {
                let mut result = StageResult::new(
                    StageOutput::Content(content.clone()),
                    format!("Drafted '{}' ({} words)", content.subject, content.word_count()),
                );
                result
                    .context_for_next
                    .insert("headline".to_string(), content.headline.clone());
                result.recommendations.push(format!(
                    "Choose imagery for: {}",
                    data.destinations.join(", ")
                ));
                result
                    .success_criteria
                    .push("Every asset carries alt text".to_string());
                AttemptOutcome::Success(result)
            }
            Err(e) => AttemptOutcome::Failure(AttemptFailure::new(e).with_partial(reply)),
        }
    }
}
