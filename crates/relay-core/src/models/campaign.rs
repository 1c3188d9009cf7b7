use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{FieldError, RelayError};
use crate::models::stage::Stage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The single brief a campaign is generated from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignBrief {
    pub name: String,
    pub brand: String,
    pub audience: String,
    pub campaign_type: String,
    pub topic: String,
    #[serde(default)]
    pub tone: Option<String>,
    /// Departure point for price enrichment
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destinations: Vec<String>,
    #[serde(default)]
    pub key_messages: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CampaignBrief {
    /// Checks every required field and reports all problems at once.
    pub fn validate(&self) -> Result<(), RelayError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("name", &self.name),
            ("brand", &self.brand),
            ("audience", &self.audience),
            ("campaignType", &self.campaign_type),
            ("topic", &self.topic),
        ] {
            if value.trim().is_empty() {
                errors.push(FieldError::missing(field));
            }
        }
        if self.destinations.iter().any(|d| d.trim().is_empty()) {
            errors.push(FieldError::new("destinations", "must not contain empty entries"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RelayError::Validation(errors))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub brief: CampaignBrief,
    /// Filesystem root holding handoffs and deliverables
    pub root_path: PathBuf,
    pub status: CampaignStatus,
    pub current_stage: Option<Stage>,
    pub completion_percentage: f64,
    pub last_error: Option<String>,
    pub latest_trace_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(id: String, brief: CampaignBrief, root_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            brief,
            root_path,
            status: CampaignStatus::Pending,
            current_stage: None,
            completion_percentage: 0.0,
            last_error: None,
            latest_trace_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, CampaignStatus::Completed | CampaignStatus::Failed)
    }
}
