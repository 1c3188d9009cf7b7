//! Core error type for the Relay pipeline.
//!
//! `RelayError` is used throughout the core domain (stores, recorder,
//! retry engine, coordinator). When the `axum` feature is enabled, it also
//! implements `IntoResponse` so it can be used directly as an axum handler
//! error type.

use serde::{Deserialize, Serialize};

/// A single invalid or missing field reported by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "is required")
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Trace {0} already exists")]
    DuplicateTrace(String),

    #[error("{specialist} failed '{task}' after {attempts} attempt(s): {last_error}")]
    RetryExhausted {
        specialist: String,
        task: String,
        attempts: u32,
        #[source]
        last_error: GenerationError,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Field-level details for validation failures, empty otherwise.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(fields) => fields,
            _ => &[],
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<prometheus::Error> for RelayError {
    fn from(e: prometheus::Error) -> Self {
        Self::Internal(format!("metrics: {}", e))
    }
}

/// Failure of a single call to an external collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Credentials rejected: {0}")]
    Unauthorized(String),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// Rejected credentials will not improve with feedback; everything else may.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unauthorized(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::Unauthorized(format!("HTTP {}: {}", status, body)),
            _ => Self::Upstream { status, body },
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            RelayError::Validation(_) | RelayError::Configuration(_) => StatusCode::BAD_REQUEST,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::DuplicateTrace(_) | RelayError::Conflict(_) => StatusCode::CONFLICT,
            RelayError::RetryExhausted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RelayError::Io(_)
            | RelayError::Serialization(_)
            | RelayError::Database(_)
            | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });
        if let RelayError::Validation(fields) = &self {
            body["details"] = serde_json::to_value(fields).unwrap_or_default();
        }
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_field() {
        let err = RelayError::Validation(vec![
            FieldError::missing("handoff_info"),
            FieldError::missing("deliverables"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("handoff_info: is required"));
        assert!(msg.contains("deliverables: is required"));
        assert_eq!(err.field_errors().len(), 2);
    }

    #[test]
    fn retry_exhausted_names_specialist_task_and_attempts() {
        let err = RelayError::RetryExhausted {
            specialist: "design".into(),
            task: "select hero imagery".into(),
            attempts: 5,
            last_error: GenerationError::InvalidOutput("no assets".into()),
        };
        assert_eq!(
            err.to_string(),
            "design failed 'select hero imagery' after 5 attempt(s): Invalid output: no assets"
        );
        assert!(err.field_errors().is_empty());

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Invalid output: no assets");
    }

    #[test]
    fn generation_error_classification() {
        assert!(!GenerationError::from_status(401, "bad key").is_retryable());
        assert!(!GenerationError::from_status(403, "forbidden").is_retryable());
        assert!(GenerationError::from_status(429, "slow down").is_retryable());
        assert!(GenerationError::Timeout(100).is_retryable());
        assert_eq!(
            GenerationError::from_status(500, "oops").to_string(),
            "Upstream returned 500: oops"
        );
    }
}
