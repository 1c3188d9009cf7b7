//! Delivery: assembles the HTML email and its manifest.
//!
//! Files land in `<campaign root>/deliverables/`:
//!
//! - `email.html` — the template (primary deliverable)
//! - `manifest.json` — subject, preheader, assets and checks

use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;

use super::{Specialist, StageInput, StageResult};
use crate::error::GenerationError;
use crate::handoff::{
    ContentOutput, Deliverable, DeliveryOutput, DesignOutput, QualityOutput, StageOutput,
};
use crate::models::stage::Stage;
use crate::retry::{AttemptContext, AttemptFailure, AttemptOutcome};

pub const TEMPLATE_FILE: &str = "email.html";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Default)]
pub struct DeliverySpecialist;

impl DeliverySpecialist {
    pub fn new() -> Self {
        Self
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_html(content: &ContentOutput, design: &DesignOutput) -> String {
    let primary = design.color_palette.first().map(String::as_str).unwrap_or("#000000");
    let background = design.color_palette.get(2).map(String::as_str).unwrap_or("#ffffff");

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_html(&content.subject)));
    html.push_str("</head>\n");
    html.push_str(&format!(
        "<body style=\"margin:0;background:{};\" data-layout=\"{}\">\n",
        escape_html(background),
        escape_html(&design.layout)
    ));
    html.push_str(&format!(
        "<div style=\"display:none;\">{}</div>\n",
        escape_html(&content.preheader)
    ));
    if let Some(hero) = design.assets.first() {
        html.push_str(&format!(
            "<img src=\"{}\" alt=\"{}\" width=\"{}\">\n",
            escape_html(&hero.url),
            escape_html(&hero.alt_text),
            hero.width.unwrap_or(600)
        ));
    }
    html.push_str(&format!(
        "<h1 style=\"color:{};\">{}</h1>\n",
        escape_html(primary),
        escape_html(&content.headline)
    ));
    for (i, section) in content.sections.iter().enumerate() {
        html.push_str(&format!("<h2>{}</h2>\n", escape_html(&section.heading)));
        html.push_str(&format!("<p>{}</p>\n", escape_html(&section.body)));
        if let Some(asset) = design.assets.get(i + 1) {
            html.push_str(&format!(
                "<img src=\"{}\" alt=\"{}\">\n",
                escape_html(&asset.url),
                escape_html(&asset.alt_text)
            ));
        }
    }
    html.push_str(&format!(
        "<a href=\"{{{{cta_url}}}}\" style=\"background:{};color:#ffffff;padding:12px 24px;\">{}</a>\n",
        escape_html(primary),
        escape_html(&content.call_to_action)
    ));
    html.push_str("</body>\n</html>\n");
    html
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<u64, GenerationError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| GenerationError::Unavailable(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(bytes.len() as u64)
}

#[async_trait]
impl Specialist for DeliverySpecialist {
    fn stage(&self) -> Stage {
        Stage::Delivery
    }

    fn task_description(&self) -> &str {
        "assemble email template"
    }

    async fn attempt(&self, input: &StageInput, _ctx: AttemptContext) -> AttemptOutcome<StageResult> {
        let upstream = (
            input.require(Stage::Content, |o| o.content.clone()),
            input.require(Stage::Design, |o| o.design.clone()),
            input.require(Stage::Quality, |o| o.quality.clone()),
        );
        let (content, design, quality): (ContentOutput, DesignOutput, QualityOutput) = match upstream {
            (Ok(c), Ok(d), Ok(q)) => (c, d, q),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                return AttemptOutcome::Failure(AttemptFailure::new(e).fatal())
            }
        };

        let dir = input.campaign.root_path.join("deliverables");
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            return AttemptOutcome::failure(GenerationError::Unavailable(format!(
                "cannot create {}: {}",
                dir.display(),
                e
            )));
        }

        let html = render_html(&content, &design);
        let template_path = dir.join(TEMPLATE_FILE);
        let template_size = match write_file(&template_path, html.as_bytes()).await {
            Ok(size) => size,
            Err(e) => return AttemptOutcome::failure(e),
        };

        let manifest = serde_json::json!({
            "campaignId": input.campaign.id,
            "subject": content.subject,
            "preheader": content.preheader,
            "layout": design.layout,
            "assets": design.assets,
            "qualityScore": quality.score,
            "checks": quality.checks,
            "generatedAt": Utc::now(),
        });
        let manifest_bytes = serde_json::to_vec_pretty(&manifest).unwrap_or_default();
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_size = match write_file(&manifest_path, &manifest_bytes).await {
            Ok(size) => size,
            Err(e) => return AttemptOutcome::failure(e),
        };

        let output = DeliveryOutput {
            template_path: template_path.to_string_lossy().to_string(),
            manifest_path: manifest_path.to_string_lossy().to_string(),
            format: "html".to_string(),
            size_bytes: template_size,
            delivered_at: Utc::now(),
        };

        let mut result = StageResult::new(
            StageOutput::Delivery(output),
            format!("Email template ready ({} bytes)", template_size),
        );
        result.deliverables = vec![
            Deliverable {
                name: TEMPLATE_FILE.to_string(),
                path: format!("deliverables/{}", TEMPLATE_FILE),
                kind: "text/html".to_string(),
                size: template_size,
                is_primary: true,
            },
            Deliverable {
                name: MANIFEST_FILE.to_string(),
                path: format!("deliverables/{}", MANIFEST_FILE),
                kind: "application/json".to_string(),
                size: manifest_size,
                is_primary: false,
            },
        ];
        result.data_quality_score = quality.score;
        AttemptOutcome::Success(result)
    }
}
