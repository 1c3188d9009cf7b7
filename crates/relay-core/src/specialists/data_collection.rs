//! Data collection: normalizes the brief and enriches it with prices.
//!
//! Pricing is optional. A failed lookup is logged, traced as a failed
//! `get_prices` step and leaves `pricing` empty; it never fails the stage.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{PriceLookup, Specialist, StageInput, StageResult};
use crate::error::GenerationError;
use crate::handoff::{DataCollectionOutput, PriceSummary, StageOutput};
use crate::models::stage::Stage;
use crate::retry::{AttemptContext, AttemptFailure, AttemptOutcome};
use crate::telemetry::LogContext;
use crate::trace::{StepRecord, TraceRecorder};

pub const PRICE_TOOL: &str = "get_prices";

pub struct DataCollectionSpecialist {
    pricing: Option<Arc<dyn PriceLookup>>,
    recorder: Arc<TraceRecorder>,
}

impl DataCollectionSpecialist {
    pub fn new(pricing: Option<Arc<dyn PriceLookup>>, recorder: Arc<TraceRecorder>) -> Self {
        Self { pricing, recorder }
    }

    /// Cheapest price across destinations; failures are recorded and skipped.
    async fn collect_pricing(
        &self,
        trace_id: &str,
        origin: &str,
        destinations: &[String],
    ) -> (Option<PriceSummary>, u32) {
        let Some(pricing) = &self.pricing else {
            return (None, 0);
        };

        let mut best: Option<PriceSummary> = None;
        let mut failures = 0;
        for destination in destinations {
            let started = Utc::now();
            let step = StepRecord::new(PRICE_TOOL, "lookup")
                .started_at(started)
                .params(serde_json::json!({ "origin": origin, "destination": destination }));

            match pricing.lowest_price(origin, destination).await {
                Ok(price) => {
                    self.recorder
                        .add_step(
                            trace_id,
                            step.result(serde_json::json!({
                                "lowestPrice": price.lowest_price,
                                "currency": price.currency,
                            })),
                        )
                        .await;
                    if best.as_ref().map_or(true, |b| price.lowest_price < b.lowest_price) {
                        best = Some(price);
                    }
                }
                Err(e) => {
                    failures += 1;
                    self.recorder.add_step(trace_id, step.error(e.to_string())).await;
                    self.recorder.telemetry().logs.warn(
                        format!("Price lookup {} -> {} failed; continuing without it", origin, destination),
                        LogContext::tool(PRICE_TOOL).with_error(e.to_string()),
                    );
                }
            }
        }
        (best, failures)
    }
}

#[async_trait]
impl Specialist for DataCollectionSpecialist {
    fn stage(&self) -> Stage {
        Stage::DataCollection
    }

    fn task_description(&self) -> &str {
        "collect campaign data"
    }

    async fn attempt(&self, input: &StageInput, _ctx: AttemptContext) -> AttemptOutcome<StageResult> {
        let brief = &input.campaign.brief;
        if brief.topic.trim().is_empty() || brief.audience.trim().is_empty() {
            return AttemptOutcome::Failure(
                AttemptFailure::new(GenerationError::InvalidOutput(
                    "brief has no topic or audience".to_string(),
                ))
                .fatal(),
            );
        }

        let destinations: Vec<String> = brief
            .destinations
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        let mut insights = vec![
            format!("Audience: {}", brief.audience),
            format!("Campaign type: {}", brief.campaign_type),
        ];
        if let Some(tone) = &brief.tone {
            insights.push(format!("Preferred tone: {}", tone));
        }
        insights.extend(brief.key_messages.iter().map(|m| format!("Key message: {}", m)));

        let (pricing, failures) = match &brief.origin {
            Some(origin) if !destinations.is_empty() => {
                self.collect_pricing(&input.trace_id, origin, &destinations).await
            }
            _ => (None, 0),
        };

        let mut sources = vec!["brief".to_string()];
        if pricing.is_some() {
            sources.push(PRICE_TOOL.to_string());
        }

        let mut result = StageResult::new(
            StageOutput::DataCollection(DataCollectionOutput {
                destinations: destinations.clone(),
                audience_insights: insights,
                pricing: pricing.clone(),
                sources,
            }),
            format!(
                "Collected data for {} destination(s){}",
                destinations.len(),
                if pricing.is_some() { " with pricing" } else { "" }
            ),
        );

        if let Some(price) = &pricing {
            result.context_for_next.insert(
                "lowest_price".to_string(),
                format!("{} {:.0} to {}", price.currency, price.lowest_price, price.destination),
            );
            result
                .priority_items
                .push(format!("Lead with the {} fare", price.destination));
        }
        if failures > 0 {
            result.warning_count = failures;
            result.data_quality_score = 0.8;
            result
                .potential_issues
                .push(format!("{} price lookup(s) failed", failures));
        }
        if destinations.is_empty() {
            result
                .potential_issues
                .push("No destinations in the brief".to_string());
        }
        result.recommendations = brief.key_messages.clone();
        result
            .success_criteria
            .push("Copy speaks to the stated audience".to_string());
        AttemptOutcome::Success(result)
    }
}
