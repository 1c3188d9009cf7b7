use axum::{
    extract::{Path, Query as QueryParams, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use relay_core::trace::{TraceQuery, TraceStatus};
use relay_core::{AppState, RelayError};

use super::{parse_level, parse_since};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(query_traces))
        .route("/{id}", get(get_trace_by_id))
}

/// Query parameters for trace API endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceQueryParams {
    level: Option<String>,
    since: Option<String>,
    tool: Option<String>,
    limit: Option<usize>,
    campaign_id: Option<String>,
    status: Option<String>,
}

impl TraceQueryParams {
    fn to_trace_query(&self) -> Result<TraceQuery, RelayError> {
        let status = match self.status.as_deref() {
            None | Some("") => None,
            Some(s) => Some(TraceStatus::from_str(s).ok_or_else(|| {
                RelayError::validation("status", format!("'{}' is not one of active|completed|failed", s))
            })?),
        };
        Ok(TraceQuery {
            level: parse_level(self.level.as_deref())?,
            since: parse_since(self.since.as_deref())?,
            tool: self.tool.clone().filter(|t| !t.is_empty()),
            limit: self.limit,
            campaign_id: self.campaign_id.clone(),
            status,
        })
    }
}

/// GET /api/traces — Query traces with optional filters.
///
/// Query parameters:
/// - level: Minimum severity of kept steps (failed steps count as error)
/// - since: RFC 3339; only steps at or after it
/// - tool: Only traces with steps for this tool, trimmed to those steps
/// - limit: Max number of traces, newest first
/// - campaignId / status
async fn query_traces(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<TraceQueryParams>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let query = params.to_trace_query()?;
    let traces = state.recorder.query(&query).await;
    Ok(Json(serde_json::json!({
        "traces": traces,
        "count": traces.len()
    })))
}

/// GET /api/traces/{id} — Get a single trace by ID.
async fn get_trace_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, RelayError> {
    match state.recorder.get(&id).await {
        Some(trace) => Ok(Json(serde_json::json!({ "trace": trace }))),
        None => Err(RelayError::NotFound(format!("Trace {} not found", id))),
    }
}

#[cfg(test)]
mod tests {
    use crate::api::api_router;
    use crate::api::test_support::{body_json, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use relay_core::trace::{StepRecord, TraceContext, TraceOutcome};
    use tower::ServiceExt;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_query_by_campaign_and_tool() {
        let (_dir, state) = test_state();
        let recorder = &state.recorder;
        recorder
            .start_trace("t1", TraceContext::for_campaign("c1", "spring"))
            .await
            .unwrap();
        recorder.add_step("t1", StepRecord::new("content", "generate")).await;
        recorder
            .add_step("t1", StepRecord::new("design", "generate").error("no assets"))
            .await;
        recorder
            .end_trace("t1", TraceOutcome::Failed("design gave up".into()))
            .await
            .unwrap();
        recorder
            .start_trace("t2", TraceContext::for_campaign("c2", "autumn"))
            .await
            .unwrap();

        let app = api_router().with_state(state.clone());
        let body = body_json(
            app.clone()
                .oneshot(get("/api/traces?campaignId=c1&tool=design"))
                .await
                .unwrap()
                .into_body(),
        )
        .await;
        assert_eq!(body["count"], 1);
        let trace = &body["traces"][0];
        assert_eq!(trace["traceId"], "t1");
        assert_eq!(trace["status"], "failed");
        assert_eq!(trace["error"], "design gave up");
        assert_eq!(trace["steps"].as_array().unwrap().len(), 1);

        let response = app.clone().oneshot(get("/api/traces/t2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/api/traces/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_status_filter() {
        let (_dir, state) = test_state();
        let app = api_router().with_state(state);
        let response = app.oneshot(get("/api/traces?status=paused")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
