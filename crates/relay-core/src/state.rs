//! Shared application state for the axum server and the CLI.

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::db::Database;
use crate::error::RelayError;
use crate::handoff::HandoffStore;
use crate::pipeline::PipelineCoordinator;
use crate::specialists::SpecialistSet;
use crate::store::CampaignStore;
use crate::telemetry::Telemetry;
use crate::trace::TraceRecorder;

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub config: RelayConfig,
    pub db: Database,
    pub telemetry: Telemetry,
    pub recorder: Arc<TraceRecorder>,
    pub campaign_store: Arc<CampaignStore>,
    pub handoff_store: Arc<HandoffStore>,
    pub pipeline: Arc<PipelineCoordinator>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Open everything under `config.data_root` with the HTTP collaborators.
    pub async fn open(config: RelayConfig) -> Result<Self, RelayError> {
        let db = Database::open(config.db_path())?;
        let telemetry = Telemetry::with_log_dir(&config.logging, config.logs_dir())?;
        let recorder = Arc::new(TraceRecorder::open(config.traces_dir(), telemetry.clone()).await?);
        let specialists = SpecialistSet::from_config(&config, recorder.clone())?;
        Ok(Self::with_specialists(config, db, telemetry, recorder, specialists))
    }

    /// Assemble state from already opened parts.
    pub fn with_specialists(
        config: RelayConfig,
        db: Database,
        telemetry: Telemetry,
        recorder: Arc<TraceRecorder>,
        specialists: SpecialistSet,
    ) -> Self {
        let campaign_store = Arc::new(CampaignStore::new(db.clone()));
        let handoff_store = Arc::new(HandoffStore::new(config.campaigns_dir(), recorder.clone()));
        let pipeline = Arc::new(PipelineCoordinator::new(
            campaign_store.clone(),
            handoff_store.clone(),
            recorder.clone(),
            specialists,
            config.retry.policy(),
        ));
        Self {
            config,
            db,
            telemetry,
            recorder,
            campaign_store,
            handoff_store,
            pipeline,
        }
    }
}
