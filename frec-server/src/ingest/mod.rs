//! Session ingestion
//!
//! One submission runs ParseRequest → ResolveIdentities → PersistRecordings →
//! UpsertSession → Commit | Quarantine.
//!
//! Every upload is staged on disk first, so no write lock is held during
//! file I/O. The session upsert and every recording insert then share one
//! transaction, opened only when no error accumulated so far. Audio is never
//! rolled back: after the decision the whole batch moves either into its
//! session directory or into the lost quarantine.

mod counter;
mod envelope;

pub use counter::RecordingCounter;
pub use envelope::{parse_envelope, RecordingMeta, SessionData, UploadedRecording};

use std::collections::HashSet;
use std::sync::Arc;

use frec_common::db::models::{insert_row, NewRecording, NewSession};
use frec_common::{Error, Result};
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, error, info, warn};

use crate::identity::{ClientId, IdentityResolver};
use crate::recording_store::{Placement, RecordingStore, Staging};

/// Acknowledgement for a committed submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub session_id: i64,
    pub device_id: i64,
    pub speaker_id: i64,
    /// Recordings delivered by this speaker so far, -1 if counting failed
    pub recs_delivered: i64,
}

/// Identities resolved for one submission
#[derive(Debug, Clone, Copy)]
struct Identities {
    speaker_id: i64,
    instructor_id: i64,
    device_id: i64,
}

/// Keeps the first error of a submission; later ones are only logged
#[derive(Debug, Default)]
struct ErrorLog {
    first: Option<Error>,
}

impl ErrorLog {
    fn record(&mut self, e: Error) {
        if self.first.is_none() {
            self.first = Some(e);
        } else {
            debug!(error = %e, "Additional submission error");
        }
    }

    fn is_clean(&self) -> bool {
        self.first.is_none()
    }
}

/// Orchestrates one session submission
#[derive(Clone)]
pub struct SessionIngestor {
    db: SqlitePool,
    identities: IdentityResolver,
    store: Arc<RecordingStore>,
    counter: RecordingCounter,
}

impl SessionIngestor {
    pub fn new(db: SqlitePool, store: Arc<RecordingStore>) -> Self {
        Self {
            identities: IdentityResolver::new(db.clone()),
            counter: RecordingCounter::new(db.clone()),
            db,
            store,
        }
    }

    /// Ingest one submission.
    ///
    /// Every uploaded recording ends up on disk, whatever the outcome. On
    /// error, the first error encountered is returned and the recordings are
    /// under the lost quarantine.
    pub async fn ingest(
        &self,
        raw_json: &str,
        recordings: Vec<UploadedRecording>,
    ) -> Result<IngestReceipt> {
        if recordings.is_empty() {
            warn!("No recordings received, aborting");
            return Err(Error::InvalidInput("No recordings received".to_string()));
        }

        let mut errors = ErrorLog::default();

        // ParseRequest
        let data = match parse_envelope(raw_json) {
            Ok(data) => Some(data),
            Err(e) => {
                errors.record(e);
                None
            }
        };
        let speaker_name = data.as_ref().and_then(SessionData::speaker_name);

        // ResolveIdentities
        let identities = match &data {
            Some(data) => match self.resolve_identities(data).await {
                Ok(ids) => Some(ids),
                Err(e) => {
                    errors.record(e);
                    None
                }
            },
            None => None,
        };

        // PersistRecordings: every upload is staged before the write transaction opens
        let mut staging = self.store.open_staging().await?;
        let mut token_ids = Vec::with_capacity(recordings.len());
        for upload in &recordings {
            let meta = data
                .as_ref()
                .and_then(|d| d.recordings_info.get(&upload.filename));

            let token = match meta {
                Some(meta) => self.resolve_token(meta).await,
                None if data.is_some() => Err(Error::InvalidInput(format!(
                    "Missing recording info in session data: {}",
                    upload.filename
                ))),
                None => Err(Error::InvalidInput(
                    "No recording info, session data unreadable".to_string(),
                )),
            };
            let (token_id, prompt) = match token {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(filename = %upload.filename, error = %e, "Recording token not resolved");
                    errors.record(e);
                    (None, meta.and_then(|m| m.token_text.clone()))
                }
            };

            match staging
                .stage(
                    speaker_name.as_deref(),
                    &upload.filename,
                    &upload.audio,
                    prompt.as_deref(),
                )
                .await
            {
                Ok(_) => token_ids.push(token_id),
                Err(e) => errors.record(e),
            }
        }

        // UpsertSession, recording rows, then Commit
        let mut session_id: Option<i64> = None;
        if let (true, Some(data), Some(ids)) = (errors.is_clean(), &data, identities) {
            match self.write_metadata(data, ids, &mut staging, &token_ids).await {
                Ok(id) => session_id = Some(id),
                Err(e) => errors.record(e),
            }
        }

        match errors.first {
            None => {
                let (Some(session_id), Some(ids)) = (session_id, identities) else {
                    return Err(Error::Internal("Submission committed without a session".to_string()));
                };
                self.place(staging, Placement::Session(session_id)).await?;

                let recs_delivered = self
                    .delivered_count(speaker_name.as_deref().unwrap_or_default(), ids)
                    .await;
                info!(
                    session_id,
                    speaker_id = ids.speaker_id,
                    device_id = ids.device_id,
                    recordings = recordings.len(),
                    "Session submission committed"
                );
                Ok(IngestReceipt {
                    session_id,
                    device_id: ids.device_id,
                    speaker_id: ids.speaker_id,
                    recs_delivered,
                })
            }
            Some(e) => {
                warn!(error = %e, "There was an error, not committing submission metadata");
                // A session inserted by the rolled-back transaction does not exist
                let committed = match (&data, identities) {
                    (Some(data), Some(ids)) => self.committed_session(data, ids).await,
                    _ => None,
                };
                self.place(staging, Placement::Lost(committed)).await?;
                Err(e)
            }
        }
    }

    /// Session upsert and recording rows, committed together or not at all.
    ///
    /// Staged names already used by the session are suffixed before any row
    /// is written, so each row names the file placed on disk.
    async fn write_metadata(
        &self,
        data: &SessionData,
        ids: Identities,
        staging: &mut Staging,
        token_ids: &[Option<i64>],
    ) -> Result<i64> {
        let mut tx = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Could not begin session transaction");
            Error::Database(e)
        })?;

        match insert_metadata(&mut tx, &self.store, data, ids, staging, token_ids).await {
            Ok(session_id) => {
                tx.commit().await.map_err(|e| {
                    error!(error = %e, "Error committing submission");
                    Error::Database(e)
                })?;
                Ok(session_id)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    error!(error = %rollback, "Error rolling back submission");
                }
                Err(e)
            }
        }
    }

    /// Id of an already committed session with the submission's identity key
    async fn committed_session(&self, data: &SessionData, ids: Identities) -> Option<i64> {
        let lookup = match self.db.acquire().await {
            Ok(mut conn) => find_session(&mut conn, data, ids).await,
            Err(e) => Err(Error::Database(e)),
        };
        match lookup {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Could not look up session for the lost quarantine");
                None
            }
        }
    }

    async fn resolve_identities(&self, data: &SessionData) -> Result<Identities> {
        let speaker_id = self.identities.resolve_speaker(&data.speaker_info).await?;
        let instructor_id = self
            .identities
            .resolve_instructor(&data.instructor_document()?)
            .await?;
        let device_id = self.identities.resolve_device(&data.device_info).await?;
        Ok(Identities {
            speaker_id,
            instructor_id,
            device_id,
        })
    }

    /// Token id and prompt text for one recording.
    ///
    /// Inline text wins over the token table. The token id is required either
    /// way since the recording row references it.
    async fn resolve_token(&self, meta: &RecordingMeta) -> Result<(Option<i64>, Option<String>)> {
        let token_id = ClientId::present(&meta.token_id).and_then(ClientId::as_row_id);

        if let Some(text) = &meta.token_text {
            return match token_id {
                Some(id) => Ok((Some(id), Some(text.clone()))),
                None => Err(Error::InvalidInput("Recording info without tokenId".to_string())),
            };
        }

        let Some(id) = token_id else {
            return Err(Error::InvalidInput("Recording info without tokenId".to_string()));
        };

        let prompt: Option<String> = sqlx::query_scalar("SELECT inputToken FROM token WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| {
                error!(token_id = id, error = %e, "Error looking up token");
                Error::Database(e)
            })?;

        match prompt {
            Some(text) => Ok((Some(id), Some(text))),
            None => {
                warn!(token_id = id, "No token with supplied id");
                Err(Error::InvalidInput(format!("No token with supplied id: {}", id)))
            }
        }
    }

    async fn place(&self, staging: Staging, placement: Placement) -> Result<()> {
        let staged_dir = staging.dir().to_path_buf();
        self.store.place(staging, placement).await.map(|_| ()).map_err(|e| {
            error!(
                staging = %staged_dir.display(),
                ?placement,
                error = %e,
                "Recordings could not be placed and remain in staging"
            );
            e
        })
    }

    async fn delivered_count(&self, speaker_name: &str, ids: Identities) -> i64 {
        match self
            .counter
            .count(speaker_name, ids.speaker_id, ids.device_id)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                error!(speaker_id = ids.speaker_id, error = %e, "Error grabbing recording count");
                -1
            }
        }
    }
}

async fn insert_metadata(
    tx: &mut Transaction<'static, Sqlite>,
    store: &RecordingStore,
    data: &SessionData,
    ids: Identities,
    staging: &mut Staging,
    token_ids: &[Option<i64>],
) -> Result<i64> {
    let session_id = upsert_session(tx, data, ids).await.map_err(|e| {
        error!(error = %e, "Error inserting session into database");
        e
    })?;

    let mut taken: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT filename FROM recording WHERE sessionId = ?")
            .bind(session_id)
            .fetch_all(&mut **tx)
            .await?
            .into_iter()
            .collect();
    taken.extend(store.existing_names(Placement::Session(session_id)).await?);
    staging.avoid_names(&taken).await?;

    for (staged, token_id) in staging.recordings().iter().zip(token_ids) {
        let Some(token_id) = *token_id else {
            return Err(Error::Internal(format!(
                "Staged recording without a token: {}",
                staged.file_name
            )));
        };
        let row = NewRecording {
            token_id,
            speaker_id: ids.speaker_id,
            session_id,
            filename: staged.file_name.clone(),
        };
        insert_row(&mut **tx, &row).await.map_err(|e| {
            error!(filename = %row.filename, error = %e, "Error adding recording to database");
            e
        })?;
    }
    Ok(session_id)
}

async fn find_session(
    conn: &mut SqliteConnection,
    data: &SessionData,
    ids: Identities,
) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM session
        WHERE speakerId = ? AND instructorId = ? AND deviceId = ? AND location = ? AND start = ?
        ORDER BY id LIMIT 1
        "#,
    )
    .bind(ids.speaker_id)
    .bind(ids.instructor_id)
    .bind(ids.device_id)
    .bind(&data.location)
    .bind(&data.start)
    .fetch_optional(conn)
    .await?;
    Ok(id)
}

/// Update `end` of the session with the same identity key, or insert one
async fn upsert_session(
    conn: &mut SqliteConnection,
    data: &SessionData,
    ids: Identities,
) -> Result<i64> {
    if let Some(id) = find_session(conn, data, ids).await? {
        sqlx::query(r#"UPDATE session SET "end" = ? WHERE id = ?"#)
            .bind(&data.end)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        debug!(session_id = id, "Session exists, updated end time");
        return Ok(id);
    }

    let row = NewSession {
        speaker_id: ids.speaker_id,
        instructor_id: ids.instructor_id,
        device_id: ids.device_id,
        location: data.location.clone(),
        start: data.start.clone(),
        end: data.end.clone(),
        comments: data.comments.clone(),
    };
    let id = insert_row(conn, &row).await?;
    debug!(session_id = id, "Inserted new session");
    Ok(id)
}
