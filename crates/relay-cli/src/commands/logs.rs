//! `relay logs` — Export persisted log entries.

use relay_core::telemetry::{render_entries, ExportFormat};
use relay_core::AppState;

/// Render the most recent persisted entries as `json` or `text`.
pub async fn export(state: &AppState, format: &str) -> Result<String, String> {
    let format = ExportFormat::from_str(format)
        .ok_or_else(|| format!("Unknown format '{}', expected json|text", format))?;
    let entries = state.telemetry.logs.export().await.map_err(|e| e.to_string())?;
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(&entries).map_err(|e| e.to_string()),
        ExportFormat::Text => render_entries(&entries, format).map_err(|e| e.to_string()),
    }
}
