//! Read-side queries over committed sessions and their recordings

use frec_common::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::error;

use crate::recording_store::RecordingStore;

/// Recording info entry for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    pub rec_id: i64,
    /// Absolute path of the audio file
    pub rec_path: String,
    pub token: String,
    pub token_id: i64,
}

/// Recordings of `session_id` in ascending recording id order.
///
/// With `count`, only the first `count` recordings are returned.
pub async fn recordings_info(
    db: &SqlitePool,
    store: &RecordingStore,
    session_id: i64,
    count: Option<u32>,
) -> Result<Vec<RecordingInfo>> {
    let limit = count.map(i64::from).unwrap_or(-1);
    let rows = sqlx::query(
        r#"
        SELECT recording.id, recording.filename, token.inputToken, token.id AS tokenId
        FROM recording
        JOIN token ON recording.tokenId = token.id
        WHERE recording.sessionId = ?
        ORDER BY recording.id ASC
        LIMIT ?
        "#,
    )
    .bind(session_id)
    .bind(limit)
    .fetch_all(db)
    .await
    .map_err(|e| {
        error!(session_id, error = %e, "Error getting info for session recordings");
        Error::Database(e)
    })?;

    let session_dir = store.session_dir(session_id);
    let session_dir = std::path::absolute(&session_dir).unwrap_or(session_dir);

    let mut infos = Vec::with_capacity(rows.len());
    for row in rows {
        let filename: String = row.try_get("filename")?;
        infos.push(RecordingInfo {
            rec_id: row.try_get("id")?,
            rec_path: session_dir.join(&filename).display().to_string(),
            token: row.try_get("inputToken")?,
            token_id: row.try_get("tokenId")?,
        });
    }
    Ok(infos)
}

/// Whether a session row with `session_id` exists
pub async fn session_exists(db: &SqlitePool, session_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM session WHERE id = ?")
        .bind(session_id)
        .fetch_optional(db)
        .await
        .map_err(|e| {
            error!(session_id, error = %e, "Error checking for session existence");
            Error::Database(e)
        })?;
    Ok(found.is_some())
}
