pub mod campaigns;
pub mod logs;
pub mod traces;

use axum::Router;
use chrono::{DateTime, Utc};

use relay_core::telemetry::LogLevel;
use relay_core::{AppState, RelayError};

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/logs", logs::router())
        .nest("/api/campaigns", campaigns::router())
        .nest("/api/traces", traces::router())
}

/// `level` query parameter; absent or `all` means no level filter.
pub(crate) fn parse_level(raw: Option<&str>) -> Result<Option<LogLevel>, RelayError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => LogLevel::from_str(s).map(Some).ok_or_else(|| {
            RelayError::validation("level", format!("'{}' is not one of all|debug|info|warn|error", s))
        }),
    }
}

/// `since` query parameter as RFC 3339.
pub(crate) fn parse_since(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, RelayError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| RelayError::validation("since", format!("'{}' is not RFC 3339: {}", s, e))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::sync::Arc;

    use relay_core::handoff::{AssetDescriptor, PriceSummary};
    use relay_core::specialists::{
        AssetLookup, AssetQuery, ContentGenerator, ContentRequest, PriceLookup, SpecialistSet,
    };
    use relay_core::{AppState, AppStateInner, Database, GenerationError, RelayConfig, Telemetry, TraceRecorder};

    pub(crate) const DRAFT: &str = r#"{"subject": "Spring city breaks from £89",
 "preheader": "Lisbon and Porto for less", "headline": "Your spring escape",
 "sections": [{"heading": "Lisbon", "body": "Trams, tiles and sunset viewpoints. Fares from £89 this spring for frequent flyers who want long evenings by the river."}],
 "call_to_action": "Book now"}"#;

    struct Writer;

    #[async_trait]
    impl ContentGenerator for Writer {
        async fn generate(&self, _request: &ContentRequest) -> Result<String, GenerationError> {
            Ok(DRAFT.to_string())
        }
    }

    struct Catalog;

    #[async_trait]
    impl AssetLookup for Catalog {
        async fn search(&self, _query: &AssetQuery) -> Result<Vec<AssetDescriptor>, GenerationError> {
            Ok(vec![AssetDescriptor {
                id: "lisbon".into(),
                url: "https://assets.example.com/lisbon.jpg".into(),
                alt_text: "Lisbon at dusk".into(),
                width: None,
                height: None,
                attribution: None,
            }])
        }
    }

    struct Closed;

    #[async_trait]
    impl PriceLookup for Closed {
        async fn lowest_price(&self, _origin: &str, _destination: &str) -> Result<PriceSummary, GenerationError> {
            Err(GenerationError::Unavailable("pricing offline".into()))
        }
    }

    /// State over a temp data root with scripted collaborators.
    pub(crate) fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig {
            data_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let telemetry = Telemetry::in_memory().unwrap();
        let recorder = Arc::new(TraceRecorder::in_memory(telemetry.clone()));
        let specialists = SpecialistSet::standard(
            Arc::new(Writer),
            Arc::new(Catalog),
            Some(Arc::new(Closed)),
            recorder.clone(),
            &config,
        );
        let state = AppStateInner::with_specialists(
            config,
            Database::open_in_memory().unwrap(),
            telemetry,
            recorder,
            specialists,
        );
        (dir, Arc::new(state))
    }

    pub(crate) fn brief_json() -> serde_json::Value {
        serde_json::json!({
            "name": "Spring Escapes",
            "brand": "Northwind Travel",
            "audience": "frequent flyers",
            "campaignType": "promotional",
            "topic": "spring city breaks",
            "origin": "LHR",
            "destinations": ["Lisbon"],
            "keyMessages": ["Fares from £89"]
        })
    }

    pub(crate) async fn body_json(body: axum::body::Body) -> serde_json::Value {
        use http_body_util::BodyExt;
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}
