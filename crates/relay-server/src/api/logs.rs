use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use relay_core::telemetry::{render_entries, ExportFormat, LogQuery};
use relay_core::trace::TraceQuery;
use relay_core::{AppState, RelayError};

use super::{parse_level, parse_since};

const DEFAULT_LIMIT: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(query_logs).post(manage_logs))
}

#[derive(Debug, Default, Deserialize)]
struct LogsParams {
    level: Option<String>,
    limit: Option<usize>,
    since: Option<String>,
    tool: Option<String>,
    format: Option<String>,
}

/// GET /logs — Live log entries, tool metrics and matching traces.
///
/// Query parameters:
/// - level: all|debug|info|warn|error (exact match on log entries)
/// - limit: Max entries (clamped to the buffer capacity)
/// - since: RFC 3339 timestamp, inclusive
/// - tool: Exact tool name
/// - format: json (default) | text | prometheus
async fn query_logs(
    State(state): State<AppState>,
    Query(params): Query<LogsParams>,
) -> Result<Response, RelayError> {
    let level = parse_level(params.level.as_deref())?;
    let since = parse_since(params.since.as_deref())?;
    let tool = params.tool.filter(|t| !t.is_empty());
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

    let logs = &state.telemetry.logs;
    let query = LogQuery {
        level,
        limit: Some(limit),
        since,
        tool: tool.clone(),
    };

    match params.format.as_deref().unwrap_or("json") {
        "json" => {}
        "text" => {
            let text = render_entries(&logs.query(&query), ExportFormat::Text)?;
            return Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response());
        }
        "prometheus" => {
            let body = state.telemetry.metrics.render_prometheus()?;
            return Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response());
        }
        other => {
            return Err(RelayError::validation(
                "format",
                format!("'{}' is not one of json|text|prometheus", other),
            ))
        }
    }

    let entries = logs.query(&query);
    let traces = state
        .recorder
        .query(&TraceQuery {
            level,
            since,
            tool: tool.clone(),
            limit: Some(limit),
            ..Default::default()
        })
        .await;

    Ok(Json(serde_json::json!({
        "success": true,
        "timestamp": Utc::now(),
        "filters": {
            "level": level.map(|l| l.as_str()).unwrap_or("all"),
            "limit": limit.min(logs.capacity()),
            "since": since,
            "tool": tool,
        },
        "data": {
            "logs": entries,
            "metrics": state.telemetry.metrics.snapshot(),
            "traces": traces,
            "summary": logs.summary(),
        }
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
struct LogsAction {
    action: String,
    level: Option<String>,
    format: Option<String>,
}

/// POST /logs — `{action: "clear" | "set_level" | "export", level?, format?}`
async fn manage_logs(
    State(state): State<AppState>,
    body: Result<Json<LogsAction>, JsonRejection>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let Json(body) = body.map_err(|e| RelayError::validation("body", e.body_text()))?;
    let logs = &state.telemetry.logs;

    match body.action.as_str() {
        "clear" => {
            let cleared = state.telemetry.clear();
            tracing::info!("[Logs] Cleared {} buffered entries and reset metrics", cleared);
            Ok(Json(serde_json::json!({
                "success": true,
                "action": "clear",
                "cleared": cleared,
                "timestamp": Utc::now(),
            })))
        }
        "set_level" => {
            let level = parse_level(body.level.as_deref())?
                .ok_or_else(|| RelayError::validation("level", "a concrete level is required"))?;
            let previous = logs.level();
            logs.set_level(level);
            tracing::info!("[Logs] Minimum level {} -> {}", previous, level);
            Ok(Json(serde_json::json!({
                "success": true,
                "action": "set_level",
                "level": level,
                "previous": previous,
            })))
        }
        "export" => {
            let raw = body.format.as_deref().unwrap_or("json");
            let format = ExportFormat::from_str(raw).ok_or_else(|| {
                RelayError::validation("format", format!("'{}' is not one of json|text", raw))
            })?;
            let entries = logs.export().await?;
            let data = match format {
                ExportFormat::Json => serde_json::to_value(&entries)?,
                ExportFormat::Text => serde_json::Value::String(render_entries(&entries, format)?),
            };
            Ok(Json(serde_json::json!({
                "success": true,
                "action": "export",
                "format": format,
                "count": entries.len(),
                "data": data,
            })))
        }
        other => Err(RelayError::validation(
            "action",
            format!("'{}' is not one of clear|set_level|export", other),
        )),
    }
}
