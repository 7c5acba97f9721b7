//! Committed recordings under the public base
//!
//! Only `session_<id>/<file>` is reachable. The database, the lost
//! quarantine and staging share the recordings root but are never served.

use axum::{
    extract::{rejection::PathRejection, Path, Request, State},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::recording_store::slug;
use crate::AppState;

/// GET {base}/:session_dir/:file
pub async fn serve_recording(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    request: Request,
) -> ApiResult<Response> {
    let Path((session_dir, file)) = path?;

    let (Some(session_id), true) = (parse_session_dir(&session_dir), is_recording_file(&file))
    else {
        debug!(%session_dir, %file, "Refused to serve path outside session directories");
        return Err(ApiError::NotFound(format!("{}/{}", session_dir, file)));
    };

    let path = state.store.session_dir(session_id).join(&file);
    let response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.into_response())
}

/// `session_<digits>` to the session id
fn parse_session_dir(dir: &str) -> Option<i64> {
    let digits = dir.strip_prefix("session_")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// A name the store could have written: already a slug, audio or transcript
fn is_recording_file(name: &str) -> bool {
    slug(name) == name && (name.ends_with(".wav") || name.ends_with(".txt"))
}

/// Build recording routes under `base`
pub fn recording_routes(base: &str) -> Router<AppState> {
    let route = format!("{}/:session_dir/:file", base.trim_end_matches('/'));
    Router::new().route(&route, get(serve_recording))
}
