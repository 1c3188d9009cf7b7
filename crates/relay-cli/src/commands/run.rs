//! `relay run` / `relay resume` — drive a campaign through the pipeline in-process.

use std::path::Path;

use relay_core::models::CampaignBrief;
use relay_core::pipeline::PipelineReport;
use relay_core::{AppState, RelayError};

/// Register the brief stored at `brief_path` and run it to completion.
pub async fn run(state: &AppState, brief_path: &Path) -> Result<serde_json::Value, String> {
    let raw = tokio::fs::read_to_string(brief_path)
        .await
        .map_err(|e| format!("Failed to read brief '{}': {}", brief_path.display(), e))?;
    let brief: CampaignBrief = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid brief '{}': {}", brief_path.display(), e))?;

    let campaign = state
        .pipeline
        .create_campaign(brief)
        .await
        .map_err(|e| e.to_string())?;
    println!("Campaign {} registered, running pipeline...", campaign.id);

    let outcome = state.pipeline.run(&campaign.id).await;
    finish(state, &campaign.id, outcome).await
}

/// Continue a failed or interrupted campaign from its latest handoff.
pub async fn resume(state: &AppState, campaign_id: &str) -> Result<serde_json::Value, String> {
    let outcome = state.pipeline.resume(campaign_id).await;
    finish(state, campaign_id, outcome).await
}

async fn finish(
    state: &AppState,
    campaign_id: &str,
    outcome: Result<PipelineReport, RelayError>,
) -> Result<serde_json::Value, String> {
    // One-shot process: persist what the buffer holds before reporting.
    if let Err(e) = state.telemetry.logs.flush().await {
        tracing::warn!("[Run] Failed to flush logs: {}", e);
    }

    let report = outcome.map_err(|e| format!("Campaign {} stopped: {}", campaign_id, e))?;
    let campaign = state
        .campaign_store
        .require(campaign_id)
        .await
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "campaign": campaign,
        "report": report,
    }))
}
