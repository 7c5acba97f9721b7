//! Session recordings endpoint

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::sessions::{self, RecordingInfo};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordingsQuery {
    pub count: Option<u32>,
}

/// GET /sessions/:session_id/recordings?count=
pub async fn get_session_recordings(
    State(state): State<AppState>,
    session_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<RecordingsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<RecordingInfo>>> {
    let (Path(session_id), Query(query)) = (session_id?, query?);
    if !sessions::session_exists(&state.db, session_id).await? {
        warn!(session_id, "No session with supplied id");
        return Err(ApiError::NotFound(format!(
            "No session with supplied id: {}",
            session_id
        )));
    }

    let infos =
        sessions::recordings_info(&state.db, &state.store, session_id, query.count).await?;
    Ok(Json(infos))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new().route(
        "/sessions/:session_id/recordings",
        get(get_session_recordings),
    )
}
