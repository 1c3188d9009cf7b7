use chrono::Utc;
use rusqlite::OptionalExtension;
use std::path::PathBuf;

use crate::db::Database;
use crate::error::RelayError;
use crate::models::campaign::{Campaign, CampaignBrief, CampaignStatus};
use crate::models::stage::Stage;

/// Progress fields written by the coordinator after each stage transition.
#[derive(Debug, Clone)]
pub struct CampaignProgress {
    pub status: CampaignStatus,
    pub current_stage: Option<Stage>,
    pub completion_percentage: f64,
    pub last_error: Option<String>,
    pub latest_trace_id: Option<String>,
}

pub struct CampaignStore {
    db: Database,
}

impl CampaignStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new campaign. Campaigns are never overwritten or deleted here.
    pub async fn create(&self, campaign: &Campaign) -> Result<(), RelayError> {
        let c = campaign.clone();
        let brief_json = serde_json::to_string(&c.brief)?;
        let id = c.id.clone();
        let inserted = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO campaigns (id, name, brand, audience, campaign_type, brief,
                     root_path, status, current_stage, completion_percentage, last_error,
                     latest_trace_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    rusqlite::params![
                        c.id,
                        c.brief.name,
                        c.brief.brand,
                        c.brief.audience,
                        c.brief.campaign_type,
                        brief_json,
                        c.root_path.to_string_lossy().to_string(),
                        c.status.as_str(),
                        c.current_stage.map(|s| s.as_str()),
                        c.completion_percentage,
                        c.last_error,
                        c.latest_trace_id,
                        c.created_at.timestamp_millis(),
                        c.updated_at.timestamp_millis(),
                    ],
                )
            })
            .await?;

        if inserted == 0 {
            return Err(RelayError::Conflict(format!("Campaign {} already exists", id)));
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Campaign>, RelayError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SELECT_CAMPAIGN))?;
                stmt.query_row(rusqlite::params![id], |row| Ok(row_to_campaign(row)))
                    .optional()
            })
            .await
    }

    /// Like `get`, but a missing campaign is a `NotFound` error.
    pub async fn require(&self, id: &str) -> Result<Campaign, RelayError> {
        self.get(id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("Campaign {} not found", id)))
    }

    pub async fn list(&self) -> Result<Vec<Campaign>, RelayError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("{} ORDER BY created_at DESC", SELECT_CAMPAIGN))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_campaign(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>, RelayError> {
        let status_str = status.as_str().to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE status = ?1 ORDER BY created_at DESC",
                    SELECT_CAMPAIGN
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![status_str], |row| Ok(row_to_campaign(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn update_progress(
        &self,
        id: &str,
        progress: CampaignProgress,
    ) -> Result<(), RelayError> {
        let id_owned = id.to_string();
        let now = Utc::now().timestamp_millis();
        let updated = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE campaigns SET status = ?1, current_stage = ?2, completion_percentage = ?3,
                     last_error = ?4, latest_trace_id = COALESCE(?5, latest_trace_id), updated_at = ?6
                     WHERE id = ?7",
                    rusqlite::params![
                        progress.status.as_str(),
                        progress.current_stage.map(|s| s.as_str()),
                        progress.completion_percentage,
                        progress.last_error,
                        progress.latest_trace_id,
                        now,
                        id_owned,
                    ],
                )
            })
            .await?;

        if updated == 0 {
            return Err(RelayError::NotFound(format!("Campaign {} not found", id)));
        }
        Ok(())
    }
}

const SELECT_CAMPAIGN: &str = "SELECT id, brief, root_path, status, current_stage, completion_percentage,
     last_error, latest_trace_id, created_at, updated_at FROM campaigns";

use rusqlite::Row;

/// Column order: id(0), brief(1), root_path(2), status(3), current_stage(4),
///               completion_percentage(5), last_error(6), latest_trace_id(7),
///               created_at(8), updated_at(9)
fn row_to_campaign(row: &Row<'_>) -> Campaign {
    let brief_str: String = row.get(1).unwrap_or_default();
    let brief: CampaignBrief = serde_json::from_str(&brief_str).unwrap_or_else(|e| {
        tracing::warn!("[CampaignStore] Unreadable brief column: {}", e);
        CampaignBrief::default()
    });
    let created_ms: i64 = row.get(8).unwrap_or(0);
    let updated_ms: i64 = row.get(9).unwrap_or(0);
    let status_str: String = row.get(3).unwrap_or_default();
    // Unknown values must not look runnable.
    let status = CampaignStatus::from_str(&status_str).unwrap_or_else(|| {
        tracing::warn!("[CampaignStore] Unknown status '{}', treating as failed", status_str);
        CampaignStatus::Failed
    });

    Campaign {
        id: row.get(0).unwrap_or_default(),
        brief,
        root_path: PathBuf::from(row.get::<_, String>(2).unwrap_or_default()),
        status,
        current_stage: row
            .get::<_, Option<String>>(4)
            .unwrap_or(None)
            .and_then(|s| Stage::from_str(&s)),
        completion_percentage: row.get(5).unwrap_or(0.0),
        last_error: row.get(6).unwrap_or(None),
        latest_trace_id: row.get(7).unwrap_or(None),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms)
            .unwrap_or_else(|| Utc::now()),
        updated_at: chrono::DateTime::from_timestamp_millis(updated_ms)
            .unwrap_or_else(|| Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_brief;

    fn store() -> CampaignStore {
        CampaignStore::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = store();
        let campaign = Campaign::new("c1".into(), sample_brief(), PathBuf::from("/data/c1"));
        store.create(&campaign).await.unwrap();

        let loaded = store.get("c1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "c1");
        assert_eq!(loaded.brief, campaign.brief);
        assert_eq!(loaded.root_path, PathBuf::from("/data/c1"));
        assert_eq!(loaded.status, CampaignStatus::Pending);
        assert!(loaded.current_stage.is_none());
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let store = store();
        let campaign = Campaign::new("c1".into(), sample_brief(), PathBuf::from("/data/c1"));
        store.create(&campaign).await.unwrap();
        let err = store.create(&campaign).await.unwrap_err();
        assert!(matches!(err, RelayError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_require_missing_is_not_found() {
        let err = store().require("nope").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_progress_keeps_trace_id_when_absent() {
        let store = store();
        let campaign = Campaign::new("c1".into(), sample_brief(), PathBuf::from("/data/c1"));
        store.create(&campaign).await.unwrap();

        store
            .update_progress(
                "c1",
                CampaignProgress {
                    status: CampaignStatus::Running,
                    current_stage: Some(Stage::Content),
                    completion_percentage: 20.0,
                    last_error: None,
                    latest_trace_id: Some("t1".into()),
                },
            )
            .await
            .unwrap();
        store
            .update_progress(
                "c1",
                CampaignProgress {
                    status: CampaignStatus::Failed,
                    current_stage: Some(Stage::Design),
                    completion_percentage: 40.0,
                    last_error: Some("boom".into()),
                    latest_trace_id: None,
                },
            )
            .await
            .unwrap();

        let loaded = store.require("c1").await.unwrap();
        assert_eq!(loaded.status, CampaignStatus::Failed);
        assert_eq!(loaded.current_stage, Some(Stage::Design));
        assert_eq!(loaded.completion_percentage, 40.0);
        assert_eq!(loaded.last_error.as_deref(), Some("boom"));
        assert_eq!(loaded.latest_trace_id.as_deref(), Some("t1"));

        let failed = store.list_by_status(CampaignStatus::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_campaign_is_not_found() {
        let err = store()
            .update_progress(
                "ghost",
                CampaignProgress {
                    status: CampaignStatus::Running,
                    current_stage: None,
                    completion_percentage: 0.0,
                    last_error: None,
                    latest_trace_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_stored_status_reads_as_failed() {
        let store = store();
        let campaign = Campaign::new("c1".into(), sample_brief(), PathBuf::from("/data/c1"));
        store.create(&campaign).await.unwrap();
        store
            .db
            .with_conn(|conn| conn.execute("UPDATE campaigns SET status = 'paused' WHERE id = 'c1'", []))
            .unwrap();

        let loaded = store.require("c1").await.unwrap();
        assert_eq!(loaded.status, CampaignStatus::Failed);
        assert!(store.list_by_status(CampaignStatus::Pending).await.unwrap().is_empty());
    }
}
