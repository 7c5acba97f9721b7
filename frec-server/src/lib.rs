//! frec-server library interface
//!
//! Session ingestion, evaluation sets and prompt issuance for field speech
//! recording. Exposed as a library so integration tests can drive the
//! components and the router directly.

pub mod api;
pub mod error;
pub mod evaluation;
pub mod identity;
pub mod ingest;
pub mod links;
pub mod recording_store;
pub mod sessions;
pub mod tokens;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use frec_common::config::ServiceConfig;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::evaluation::EvaluationCatalog;
use crate::ingest::SessionIngestor;
use crate::links::PublicBaseLinks;
use crate::recording_store::RecordingStore;
use crate::tokens::TokenCatalog;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub store: Arc<RecordingStore>,
    pub ingestor: SessionIngestor,
    pub tokens: Arc<TokenCatalog>,
    pub catalog: EvaluationCatalog,
    /// Path prefix session recordings are served under
    pub public_base: String,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, root_folder: impl Into<PathBuf>, config: &ServiceConfig) -> Self {
        let store = Arc::new(RecordingStore::new(root_folder));
        let links = PublicBaseLinks::new(config.public_recordings_base.clone());
        let public_base = links.base().to_string();

        Self {
            ingestor: SessionIngestor::new(db.clone(), store.clone()),
            tokens: Arc::new(TokenCatalog::new(db.clone())),
            catalog: EvaluationCatalog::new(
                db.clone(),
                Arc::new(links),
                config.placeholder_recording(),
            ),
            db,
            store,
            public_base,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(api::submit_routes())
        .merge(api::token_routes())
        .merge(api::session_routes())
        .merge(api::evaluation_routes())
        .merge(api::health_routes());

    // A base that is not a local path (e.g. an external URL) is served elsewhere
    if !state.public_base.starts_with('/') {
        warn!(
            base = %state.public_base,
            "Public recordings base is not a local path, recordings are not served"
        );
    } else {
        router = router.merge(api::recording_routes(&state.public_base));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
