//! `relay handoffs` — Inspect the handoff documents of a campaign.

use relay_core::handoff::HandoffSelector;
use relay_core::models::Stage;
use relay_core::AppState;

pub async fn list(state: &AppState, campaign_id: &str) -> Result<serde_json::Value, String> {
    let handoffs = state
        .handoff_store
        .list(campaign_id)
        .await
        .map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "campaignId": campaign_id,
        "count": handoffs.len(),
        "handoffs": handoffs,
    }))
}

/// Read one handoff by id, or by `from`/`to` stage names.
pub async fn get(
    state: &AppState,
    campaign_id: &str,
    handoff_id: Option<&str>,
    stages: Option<(&str, &str)>,
) -> Result<serde_json::Value, String> {
    let selector = match (handoff_id, stages) {
        (Some(id), _) => HandoffSelector::Id(id.to_string()),
        (None, Some((from, to))) => HandoffSelector::Stages {
            from: parse_stage(from)?,
            to: parse_stage(to)?,
        },
        (None, None) => return Err("Either --id or both --from and --to are required".to_string()),
    };
    let handoff = state
        .handoff_store
        .read(campaign_id, &selector)
        .await
        .map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "handoff": handoff }))
}

fn parse_stage(raw: &str) -> Result<Stage, String> {
    Stage::from_str(raw).ok_or_else(|| format!("Unknown stage '{}'", raw))
}
