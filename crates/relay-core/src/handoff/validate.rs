//! Schema checks for handoff documents.
//!
//! Validation runs in two passes. The structural pass works on raw JSON and
//! reports every missing top-level section. The semantic pass works on the
//! typed document and checks stage adjacency, version, ids and score ranges.

use serde_json::Value;

use super::types::{HandoffDocument, REQUIRED_SECTIONS, SUPPORTED_SCHEMA_VERSIONS};
use crate::error::{FieldError, RelayError};
use crate::models::stage::Stage;

/// Report every required top-level section that is absent or null.
pub fn check_sections(value: &Value) -> Vec<FieldError> {
    let Some(obj) = value.as_object() else {
        return vec![FieldError::new("document", "must be a JSON object")];
    };
    REQUIRED_SECTIONS
        .iter()
        .filter(|section| obj.get(**section).map_or(true, Value::is_null))
        .map(|section| FieldError::missing(*section))
        .collect()
}

/// Parse a raw document, failing with every structural problem found.
pub fn parse_document(value: Value) -> Result<HandoffDocument, RelayError> {
    let missing = check_sections(&value);
    if !missing.is_empty() {
        return Err(RelayError::Validation(missing));
    }
    serde_json::from_value(value)
        .map_err(|e| RelayError::Validation(vec![FieldError::new("document", e.to_string())]))
}

/// Semantic checks on a typed document.
pub fn check_document(doc: &HandoffDocument) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let info = &doc.handoff_info;

    if !Stage::is_adjacent(info.from_stage, info.to_stage) {
        errors.push(FieldError::new(
            "handoff_info.to_stage",
            format!(
                "'{}' does not directly follow '{}'",
                info.to_stage, info.from_stage
            ),
        ));
    }
    if !SUPPORTED_SCHEMA_VERSIONS.contains(&info.schema_version.as_str()) {
        errors.push(FieldError::new(
            "handoff_info.schema_version",
            format!("unsupported version '{}'", info.schema_version),
        ));
    }
    if info.handoff_id.trim().is_empty() {
        errors.push(FieldError::missing("handoff_info.handoff_id"));
    } else if !is_safe_id(&info.handoff_id) {
        errors.push(FieldError::new(
            "handoff_info.handoff_id",
            "may only contain letters, digits, '-' and '_'",
        ));
    }
    if info.campaign_id.trim().is_empty() {
        errors.push(FieldError::missing("handoff_info.campaign_id"));
    } else if !is_safe_id(&info.campaign_id) {
        errors.push(FieldError::new(
            "handoff_info.campaign_id",
            "may only contain letters, digits, '-' and '_'",
        ));
    }
    if info.trace_id.trim().is_empty() {
        errors.push(FieldError::missing("handoff_info.trace_id"));
    }
    if doc.campaign_context.campaign_id != info.campaign_id {
        errors.push(FieldError::new(
            "campaign_context.campaign_id",
            "does not match handoff_info.campaign_id",
        ));
    }
    if !doc.stage_outputs.contains(info.from_stage) {
        errors.push(FieldError::new(
            format!("stage_outputs.{}", info.from_stage),
            "producing stage has no output",
        ));
    }

    let status = &doc.workflow_status;
    if !(0.0..=100.0).contains(&status.completion_percentage) {
        errors.push(FieldError::new(
            "workflow_status.completion_percentage",
            "must be between 0 and 100",
        ));
    }
    if !status.completed_stages.windows(2).all(|w| w[0] < w[1]) {
        errors.push(FieldError::new(
            "workflow_status.completed_stages",
            "must be in pipeline order without repeats",
        ));
    }

    for (i, d) in doc.deliverables.iter().enumerate() {
        if d.name.trim().is_empty() {
            errors.push(FieldError::missing(format!("deliverables[{}].name", i)));
        }
        if d.path.trim().is_empty() {
            errors.push(FieldError::missing(format!("deliverables[{}].path", i)));
        }
    }

    let quality = &doc.quality_metadata;
    for (field, score) in [
        ("quality_metadata.data_quality_score", quality.data_quality_score),
        ("quality_metadata.completeness_score", quality.completeness_score),
    ] {
        if !(0.0..=1.0).contains(&score) {
            errors.push(FieldError::new(field, "must be between 0.0 and 1.0"));
        }
    }

    errors
}

/// Ids become file names, so they are restricted to a safe alphabet.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_document;

    #[test]
    fn test_missing_sections_are_all_reported() {
        let doc = sample_document("c1", Stage::DataCollection, "t1");
        let mut value = serde_json::to_value(&doc).unwrap();
        let obj = value.as_object_mut().unwrap();
        obj.remove("deliverables");
        obj.remove("quality_metadata");
        obj.insert("handoff_data".into(), Value::Null);

        let err = parse_document(value).unwrap_err();
        let fields: Vec<&str> = err.field_errors().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["deliverables", "handoff_data", "quality_metadata"]);
    }

    #[test]
    fn test_non_object_document() {
        let errors = check_sections(&serde_json::json!([1, 2]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "document");
    }

    #[test]
    fn test_valid_document_passes() {
        let doc = sample_document("c1", Stage::DataCollection, "t1");
        assert!(check_document(&doc).is_empty());
    }

    #[test]
    fn test_non_adjacent_stages_rejected() {
        let mut doc = sample_document("c1", Stage::DataCollection, "t1");
        doc.handoff_info.to_stage = Stage::Quality;
        let errors = check_document(&doc);
        assert!(errors.iter().any(|e| e.field == "handoff_info.to_stage"));
    }

    #[test]
    fn test_scores_and_version_checked_together() {
        let mut doc = sample_document("c1", Stage::DataCollection, "t1");
        doc.handoff_info.schema_version = "0.3".into();
        doc.quality_metadata.completeness_score = 1.5;
        doc.workflow_status.completion_percentage = 120.0;
        let fields: Vec<String> = check_document(&doc).into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"handoff_info.schema_version".to_string()));
        assert!(fields.contains(&"quality_metadata.completeness_score".to_string()));
        assert!(fields.contains(&"workflow_status.completion_percentage".to_string()));
    }

    #[test]
    fn test_campaign_id_must_be_path_safe() {
        let mut doc = sample_document("c1", Stage::DataCollection, "t1");
        doc.handoff_info.campaign_id = "../escape".into();
        doc.campaign_context.campaign_id = "../escape".into();
        let errors = check_document(&doc);
        assert!(errors.iter().any(|e| e.field == "handoff_info.campaign_id"));
    }

    #[test]
    fn test_producing_stage_must_have_output() {
        let mut doc = sample_document("c1", Stage::Content, "t1");
        doc.stage_outputs.content = None;
        let errors = check_document(&doc);
        assert!(errors.iter().any(|e| e.field == "stage_outputs.content"));
    }
}
