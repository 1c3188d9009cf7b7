use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use relay_core::handoff::HandoffSelector;
use relay_core::models::{CampaignBrief, CampaignStatus};
use relay_core::pipeline::PipelineCoordinator;
use relay_core::{AppState, RelayError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_campaigns).post(create_campaign))
        .route("/{id}", get(get_campaign))
        .route("/{id}/resume", post(resume_campaign))
        .route("/{id}/handoffs", get(list_handoffs))
        .route("/{id}/handoffs/{handoff_id}", get(get_handoff))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    status: Option<String>,
}

async fn list_campaigns(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let campaigns = match params.status.as_deref() {
        Some(raw) => {
            let status = CampaignStatus::from_str(raw).ok_or_else(|| {
                RelayError::validation(
                    "status",
                    format!("'{}' is not one of pending, running, completed, failed", raw),
                )
            })?;
            state.campaign_store.list_by_status(status).await?
        }
        None => state.campaign_store.list().await?,
    };
    Ok(Json(serde_json::json!({ "campaigns": campaigns })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    /// Start the pipeline right away (default true)
    autostart: Option<bool>,
}

/// POST /api/campaigns — register a brief and run the pipeline in the background.
async fn create_campaign(
    State(state): State<AppState>,
    Query(params): Query<CreateParams>,
    body: Result<Json<CampaignBrief>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), RelayError> {
    let Json(brief) = body.map_err(|e| RelayError::validation("body", e.body_text()))?;
    let campaign = state.pipeline.create_campaign(brief).await?;

    let started = params.autostart.unwrap_or(true);
    if started {
        spawn_pipeline(state.pipeline.clone(), campaign.id.clone(), false);
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "campaign": campaign, "started": started })),
    ))
}

/// GET /api/campaigns/{id} — campaign row plus its latest trace and handoff.
async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let campaign = state.campaign_store.require(&id).await?;
    let latest_trace = state.recorder.latest(Some(&id)).await;
    let latest_handoff = state.handoff_store.latest(&id).await?;

    Ok(Json(serde_json::json!({
        "campaign": campaign,
        "latestTrace": latest_trace.map(|t| serde_json::json!({
            "traceId": t.trace_id,
            "status": t.status,
            "error": t.error,
            "startTime": t.start_time,
            "endTime": t.end_time,
            "steps": t.steps.len(),
        })),
        "latestHandoff": latest_handoff.map(|d| serde_json::json!({
            "handoffId": d.handoff_info.handoff_id,
            "fromStage": d.handoff_info.from_stage,
            "toStage": d.handoff_info.to_stage,
            "workflowStatus": d.workflow_status,
        })),
    })))
}

/// POST /api/campaigns/{id}/resume
async fn resume_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), RelayError> {
    let campaign = state.campaign_store.require(&id).await?;
    if campaign.status == CampaignStatus::Completed {
        return Err(RelayError::Conflict(format!("Campaign {} is already completed", id)));
    }
    spawn_pipeline(state.pipeline.clone(), id.clone(), true);
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "campaignId": id, "resumed": true })),
    ))
}

async fn list_handoffs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, RelayError> {
    state.campaign_store.require(&id).await?;
    let handoffs = state.handoff_store.list(&id).await?;
    Ok(Json(serde_json::json!({
        "count": handoffs.len(),
        "handoffs": handoffs,
    })))
}

async fn get_handoff(
    State(state): State<AppState>,
    Path((id, handoff_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let handoff = state
        .handoff_store
        .read(&id, &HandoffSelector::Id(handoff_id))
        .await?;
    Ok(Json(serde_json::json!({ "handoff": handoff })))
}

fn spawn_pipeline(pipeline: Arc<PipelineCoordinator>, campaign_id: String, resume: bool) {
    tokio::spawn(async move {
        let outcome = if resume {
            pipeline.resume(&campaign_id).await
        } else {
            pipeline.run(&campaign_id).await
        };
        match outcome {
            Ok(report) => tracing::info!(
                "[Campaigns] {} delivered {}",
                campaign_id,
                report.delivery.output.template_path
            ),
            Err(e) => tracing::warn!("[Campaigns] {} stopped: {}", campaign_id, e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::api_router;
    use crate::api::test_support::{body_json, brief_json, test_state};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_validates_brief() {
        let (_dir, state) = test_state();
        let app = api_router().with_state(state);

        let response = app
            .oneshot(post_json("/api/campaigns", serde_json::json!({
                "name": "", "brand": "b", "audience": "a", "campaignType": "promotional", "topic": ""
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response.into_body()).await;
        let fields: Vec<&str> = body["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["name", "topic"]);
    }

    #[tokio::test]
    async fn test_campaign_lifecycle_over_http() {
        let (_dir, state) = test_state();
        let app = api_router().with_state(state.clone());

        let response = app
            .clone()
            .oneshot(post_json("/api/campaigns?autostart=false", brief_json()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response.into_body()).await;
        let id = body["campaign"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["campaign"]["status"], "pending");

        state.pipeline.run(&id).await.unwrap();

        let body = body_json(
            app.clone()
                .oneshot(get(&format!("/api/campaigns/{}", id)))
                .await
                .unwrap()
                .into_body(),
        )
        .await;
        assert_eq!(body["campaign"]["status"], "completed");
        assert_eq!(body["latestTrace"]["status"], "completed");
        assert_eq!(body["latestHandoff"]["toStage"], "delivery");

        let body = body_json(
            app.clone()
                .oneshot(get(&format!("/api/campaigns/{}/handoffs", id)))
                .await
                .unwrap()
                .into_body(),
        )
        .await;
        assert_eq!(body["count"], 4);
        let first_id = body["handoffs"][0]["handoff_info"]["handoff_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(get(&format!("/api/campaigns/{}/handoffs/{}", id, first_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["handoff"]["handoff_info"]["from_stage"], "data-collection");

        let response = app
            .oneshot(post_json(&format!("/api/campaigns/{}/resume", id), serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_not_found() {
        let (_dir, state) = test_state();
        let app = api_router().with_state(state);
        let response = app.oneshot(get("/api/campaigns/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_status_filter() {
        let (_dir, state) = test_state();
        let app = api_router().with_state(state);

        let response = app
            .clone()
            .oneshot(get("/api/campaigns?status=bogus"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["details"][0]["field"], "status");

        let response = app.oneshot(get("/api/campaigns?status=pending")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
