//! Session submission endpoint
//!
//! POST /submit/session takes a multipart body: the part named `json` holds
//! the session envelope, every part carrying a filename is one recording.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::ingest::{IngestReceipt, UploadedRecording};
use crate::AppState;

/// Name of the multipart part holding the session envelope
pub const ENVELOPE_PART: &str = "json";

/// Upper bound for one submission body
const MAX_SUBMISSION_BYTES: usize = 512 * 1024 * 1024;

/// POST /submit/session
pub async fn submit_session(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<IngestReceipt>> {
    let mut multipart = multipart?;
    let mut envelope: Option<String> = None;
    let mut recordings = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, "Malformed multipart submission");
        ApiError::BadRequest(format!("Malformed multipart body: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);

        if name == ENVELOPE_PART {
            envelope = Some(field.text().await.map_err(|e| {
                warn!(error = %e, "Failed reading session envelope");
                ApiError::BadRequest(format!("Failed reading session data: {}", e))
            })?);
            continue;
        }

        let Some(filename) = filename else {
            debug!(part = %name, "Ignoring multipart part without filename");
            continue;
        };
        let audio = field.bytes().await.map_err(|e| {
            warn!(filename = %filename, error = %e, "Failed reading uploaded recording");
            ApiError::BadRequest(format!("Failed reading recording {}: {}", filename, e))
        })?;
        debug!(filename = %filename, bytes = audio.len(), "Received recording");
        recordings.push(UploadedRecording {
            filename,
            audio: audio.to_vec(),
        });
    }

    // A missing envelope still goes through ingestion so uploaded audio is kept
    let raw = envelope.unwrap_or_else(|| {
        warn!("Submission carries no session envelope");
        String::new()
    });

    let receipt = state.ingestor.ingest(&raw, recordings).await?;
    Ok(Json(receipt))
}

/// Build submission routes
pub fn submit_routes() -> Router<AppState> {
    Router::new()
        .route("/submit/session", post(submit_session))
        .layer(DefaultBodyLimit::max(MAX_SUBMISSION_BYTES))
}
