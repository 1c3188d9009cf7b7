//! Quality: deterministic checks over the drafted copy and design.

use async_trait::async_trait;

use super::{Specialist, StageInput, StageResult};
use crate::error::GenerationError;
use crate::handoff::{ContentOutput, DesignOutput, QualityCheck, QualityOutput, StageOutput};
use crate::models::campaign::CampaignBrief;
use crate::models::stage::Stage;
use crate::retry::{AttemptContext, AttemptFailure, AttemptOutcome};

use super::content::MAX_SUBJECT_CHARS;

pub const MIN_BODY_WORDS: usize = 15;

pub struct QualitySpecialist {
    min_score: f64,
}

impl QualitySpecialist {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }
}

fn check(name: &str, passed: bool, detail: impl Into<String>) -> QualityCheck {
    QualityCheck {
        name: name.to_string(),
        passed,
        detail: detail.into(),
    }
}

pub fn run_checks(brief: &CampaignBrief, content: &ContentOutput, design: &DesignOutput) -> Vec<QualityCheck> {
    let subject_len = content.subject.chars().count();
    let words = content.word_count();
    let missing_alt = design
        .assets
        .iter()
        .filter(|a| a.alt_text.trim().is_empty())
        .count();

    let copy = format!(
        "{} {} {} {}",
        content.subject,
        content.preheader,
        content.headline,
        content
            .sections
            .iter()
            .map(|s| s.body.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    )
    .to_lowercase();
    let uncovered: Vec<&str> = brief
        .key_messages
        .iter()
        .filter(|m| !copy.contains(&m.to_lowercase()))
        .map(|m| m.as_str())
        .collect();

    vec![
        check(
            "subject_length",
            (1..=MAX_SUBJECT_CHARS).contains(&subject_len),
            format!("{} characters (max {})", subject_len, MAX_SUBJECT_CHARS),
        ),
        check(
            "preheader_present",
            !content.preheader.trim().is_empty(),
            "preheader text shown in inbox previews",
        ),
        check(
            "call_to_action_present",
            !content.call_to_action.trim().is_empty(),
            format!("'{}'", content.call_to_action),
        ),
        check(
            "body_length",
            words >= MIN_BODY_WORDS,
            format!("{} words (min {})", words, MIN_BODY_WORDS),
        ),
        check(
            "asset_alt_text",
            !design.assets.is_empty() && missing_alt == 0,
            format!("{} of {} assets missing alt text", missing_alt, design.assets.len()),
        ),
        check(
            "key_messages_covered",
            uncovered.is_empty(),
            if uncovered.is_empty() {
                "all key messages appear in the copy".to_string()
            } else {
                format!("missing: {}", uncovered.join("; "))
            },
        ),
    ]
}

#[async_trait]
impl Specialist for QualitySpecialist {
    fn stage(&self) -> Stage {
        Stage::Quality
    }

    fn task_description(&self) -> &str {
        "review copy and design"
    }

    async fn attempt(&self, input: &StageInput, _ctx: AttemptContext) -> AttemptOutcome<StageResult> {
        let upstream = input
            .require(Stage::Content, |o| o.content.clone())
            .and_then(|c| input.require(Stage::Design, |o| o.design.clone()).map(|d| (c, d)));
        let (content, design) = match upstream {
            Ok(pair) => pair,
            Err(e) => return AttemptOutcome::Failure(AttemptFailure::new(e).fatal()),
        };

        let checks = run_checks(&input.campaign.brief, &content, &design);
        let passed = checks.iter().filter(|c| c.passed).count();
        let score = passed as f64 / checks.len() as f64;
        let failing: Vec<&QualityCheck> = checks.iter().filter(|c| !c.passed).collect();

        if score < self.min_score {
            let message = format!(
                "quality score {:.2} below {:.2}; failing checks: {}",
                score,
                self.min_score,
                failing
                    .iter()
                    .map(|c| format!("{} ({})", c.name, c.detail))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let partial = serde_json::to_string(&checks).unwrap_or_default();
            return AttemptOutcome::Failure(
                AttemptFailure::new(GenerationError::InvalidOutput(message)).with_partial(partial),
            );
        }

        let mut result = StageResult::new(
            StageOutput::Quality(QualityOutput {
                score,
                passed: true,
                checks: checks.clone(),
            }),
            format!("Passed {}/{} checks", passed, checks.len()),
        );
        result.data_quality_score = score;
        result.warning_count = failing.len() as u32;
        result.potential_issues = failing
            .iter()
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect();
        AttemptOutcome::Success(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_brief, sample_campaign, sample_content, sample_design, sample_document};

    fn input() -> StageInput {
        StageInput {
            campaign: sample_campaign("c1", "/tmp/c1"),
            previous: Some(sample_document("c1", Stage::Design, "t1")),
            trace_id: "t1".into(),
        }
    }

    #[test]
    fn test_checks_on_sample() {
        let checks = run_checks(&sample_brief(), &sample_content(), &sample_design());
        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect();
        // "Fares from £89" is not quoted verbatim in the sample copy.
        assert_eq!(failed, vec!["key_messages_covered"]);
    }

    #[tokio::test]
    async fn test_passes_above_min_score_and_reports_issues() {
        let specialist = QualitySpecialist::new(0.7);
        let AttemptOutcome::Success(result) = specialist.attempt(&input(), AttemptContext::first(5)).await else {
            panic!("expected success");
        };
        assert_eq!(result.warning_count, 1);
        assert!(result.data_quality_score > 0.8);
    }

    #[tokio::test]
    async fn test_fails_below_min_score() {
        let specialist = QualitySpecialist::new(1.0);
        let AttemptOutcome::Failure(failure) = specialist.attempt(&input(), AttemptContext::first(5)).await else {
            panic!("expected failure");
        };
        assert!(failure.error.to_string().contains("key_messages_covered"));
        assert!(failure.partial_output.is_some());
    }
}
