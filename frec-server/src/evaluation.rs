//! Evaluation sets and graded evaluations
//!
//! A materialized set is an ordered list of recordings in `evaluation_sets`.
//! [`RANDOM_SET`] is synthetic: it draws from every committed recording on
//! demand and has no membership rows.

use std::collections::HashMap;
use std::sync::Arc;

use frec_common::db::models::{insert_row, NewEvaluation};
use frec_common::{Error, Result};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, error, info, warn};

use crate::identity::ClientId;
use crate::links::LinkBuilder;

/// Name of the on-demand set sampled from all recordings
pub const RANDOM_SET: &str = "Random";

/// Size reported for a set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SetSize {
    Exact(i64),
    /// Sets generated on demand have no fixed size
    Unknown(&'static str),
}

impl SetSize {
    pub fn unknown() -> Self {
        SetSize::Unknown("???")
    }
}

/// `[recordingLink, prompt]`
pub type SlicePair = (String, String);

/// One graded recording as submitted by an evaluator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEntry {
    pub evaluator: String,
    pub session_id: ClientId,
    pub recording_filename: String,
    #[serde(default)]
    pub grade: Option<i64>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub skipped: bool,
}

/// Result of recording an evaluation batch.
///
/// Valid entries are committed even when others fail; `last_error` carries
/// the last per-entry failure.
#[derive(Debug)]
pub struct EvaluationOutcome {
    pub committed: usize,
    pub last_error: Option<Error>,
}

/// Read and write access to evaluation sets
#[derive(Clone)]
pub struct EvaluationCatalog {
    db: SqlitePool,
    links: Arc<dyn LinkBuilder>,
    placeholder_recording_id: Option<i64>,
}

impl EvaluationCatalog {
    pub fn new(
        db: SqlitePool,
        links: Arc<dyn LinkBuilder>,
        placeholder_recording_id: Option<i64>,
    ) -> Self {
        Self {
            db,
            links,
            placeholder_recording_id,
        }
    }

    /// Distinct set labels, in order of first appearance
    pub async fn list_sets(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT eval_set FROM evaluation_sets GROUP BY eval_set ORDER BY MIN(id)",
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| {
            error!(error = %e, "Error getting possible sets");
            Error::Database(e)
        })
    }

    pub async fn set_size(&self, eval_set: &str) -> Result<SetSize> {
        if eval_set == RANDOM_SET {
            return Ok(SetSize::unknown());
        }
        let count = self.member_count(eval_set).await?;
        Ok(SetSize::Exact(count))
    }

    /// `count` link/prompt pairs of `eval_set` starting at `progress`.
    ///
    /// The random set ignores `progress` and samples without replacement.
    pub async fn fetch_slice(
        &self,
        eval_set: &str,
        progress: u32,
        count: u32,
    ) -> Result<Vec<SlicePair>> {
        if eval_set == RANDOM_SET {
            return self.random_slice(count as usize).await;
        }

        if self.member_count(eval_set).await? == 0 {
            warn!(eval_set, "No set by that name in database");
            return Err(Error::NotFound(format!(
                "No set by that name in database: {}",
                eval_set
            )));
        }

        let rows = sqlx::query(
            r#"
            SELECT recording.sessionId, recording.filename, token.inputToken
            FROM evaluation_sets
            JOIN recording ON recording.id = evaluation_sets.recordingId
            JOIN token ON token.id = recording.tokenId
            WHERE evaluation_sets.eval_set = ?
            ORDER BY evaluation_sets.id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(eval_set)
        .bind(i64::from(count))
        .bind(i64::from(progress))
        .fetch_all(&self.db)
        .await
        .map_err(|e| {
            error!(eval_set, error = %e, "Error grabbing from set");
            Error::Database(e)
        })?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let session_id: i64 = row.try_get("sessionId")?;
            let filename: String = row.try_get("filename")?;
            pairs.push((
                self.links.recording_link(session_id, &filename),
                row.try_get("inputToken")?,
            ));
        }
        Ok(pairs)
    }

    async fn random_slice(&self, count: usize) -> Result<Vec<SlicePair>> {
        let pool: Vec<i64> = sqlx::query_scalar("SELECT id FROM recording ORDER BY id")
            .fetch_all(&self.db)
            .await
            .map_err(|e| {
                error!(error = %e, "Error grabbing recording pool");
                Error::Database(e)
            })?;
        let pool: Vec<i64> = pool
            .into_iter()
            .filter(|id| Some(*id) != self.placeholder_recording_id)
            .collect();

        if pool.is_empty() {
            warn!("No recordings to sample for the random set");
            return Err(Error::NotFound("No recordings available".to_string()));
        }

        let sampled: Vec<i64> = {
            let mut rng = rand::thread_rng();
            pool.choose_multiple(&mut rng, count).copied().collect()
        };
        if sampled.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT recording.id, recording.sessionId, recording.filename, token.inputToken \
             FROM recording JOIN token ON token.id = recording.tokenId \
             WHERE recording.id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in &sampled {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.db).await.map_err(|e| {
            error!(error = %e, "Error grabbing random recordings");
            Error::Database(e)
        })?;

        let mut by_id: HashMap<i64, SlicePair> = HashMap::with_capacity(rows.len());
        for row in rows {
            let session_id: i64 = row.try_get("sessionId")?;
            let filename: String = row.try_get("filename")?;
            by_id.insert(
                row.try_get("id")?,
                (
                    self.links.recording_link(session_id, &filename),
                    row.try_get("inputToken")?,
                ),
            );
        }

        debug!(requested = count, sampled = sampled.len(), "Sampled random set");
        Ok(sampled.into_iter().filter_map(|id| by_id.remove(&id)).collect())
    }

    /// Evaluations already recorded by `evaluator` for `eval_set`
    pub async fn user_progress(&self, evaluator: &str, eval_set: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM evaluation WHERE eval_set = ? AND evaluator = ?")
            .bind(eval_set)
            .bind(evaluator)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                error!(eval_set, evaluator, error = %e, "Error getting user progress");
                Error::Database(e)
            })
    }

    /// Record a batch of evaluations for `eval_set`.
    ///
    /// Entries that fail to parse or resolve are skipped; everything else is
    /// inserted and committed together at the end.
    pub async fn record_evaluation(
        &self,
        eval_set: &str,
        entries: Vec<Value>,
    ) -> Result<EvaluationOutcome> {
        let mut tx = self.db.begin().await.map_err(|e| {
            error!(eval_set, error = %e, "Could not begin evaluation transaction");
            Error::Database(e)
        })?;

        let mut committed = 0;
        let mut last_error = None;

        for raw in entries {
            let entry: EvaluationEntry = match serde_json::from_value(raw.clone()) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(eval_set, data = %raw, error = %e, "Some evaluation data not on correct format");
                    last_error = Some(Error::InvalidInput(format!(
                        "Some evaluation data not on correct format: {}",
                        e
                    )));
                    continue;
                }
            };

            let recording_id = match resolve_recording(&mut tx, eval_set, &entry).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(
                        eval_set,
                        session_id = %entry.session_id.to_text(),
                        filename = %entry.recording_filename,
                        error = %e,
                        "Could not find a recording for evaluation"
                    );
                    last_error = Some(e);
                    continue;
                }
            };

            let row = NewEvaluation {
                recording_id,
                eval_set: eval_set.to_string(),
                evaluator: entry.evaluator,
                grade: entry.grade,
                comments: entry.comments,
                skipped: entry.skipped,
            };
            match insert_row(&mut *tx, &row).await {
                Ok(_) => committed += 1,
                Err(e) => {
                    error!(eval_set, recording_id, error = %e, "Error inserting evaluation");
                    last_error = Some(e);
                }
            }
        }

        tx.commit().await.map_err(|e| {
            error!(eval_set, error = %e, "Error committing evaluations");
            Error::Database(e)
        })?;

        info!(eval_set, committed, failed = last_error.is_some(), "Processed evaluation batch");
        Ok(EvaluationOutcome {
            committed,
            last_error,
        })
    }

    async fn member_count(&self, eval_set: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM evaluation_sets WHERE eval_set = ?")
            .bind(eval_set)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                error!(eval_set, error = %e, "Error getting set info");
                Error::Database(e)
            })
    }
}

/// Recording graded by `entry`; scoped to set members unless the set is random
async fn resolve_recording(
    conn: &mut SqliteConnection,
    eval_set: &str,
    entry: &EvaluationEntry,
) -> Result<i64> {
    let Some(session_id) = entry.session_id.as_row_id() else {
        return Err(Error::InvalidInput(format!(
            "Invalid sessionId: {}",
            entry.session_id.to_text()
        )));
    };

    let found: Option<i64> = if eval_set == RANDOM_SET {
        sqlx::query_scalar(
            "SELECT id FROM recording WHERE sessionId = ? AND filename = ? ORDER BY id LIMIT 1",
        )
        .bind(session_id)
        .bind(&entry.recording_filename)
        .fetch_optional(&mut *conn)
        .await?
    } else {
        sqlx::query_scalar(
            r#"
            SELECT recording.id FROM recording
            JOIN evaluation_sets ON evaluation_sets.recordingId = recording.id
            WHERE recording.sessionId = ? AND recording.filename = ? AND evaluation_sets.eval_set = ?
            ORDER BY recording.id LIMIT 1
            "#,
        )
        .bind(session_id)
        .bind(&entry.recording_filename)
        .bind(eval_set)
        .fetch_optional(&mut *conn)
        .await?
    };

    found.ok_or_else(|| {
        Error::InvalidInput(format!(
            "Could not find a recording with session {} and filename {}",
            session_id, entry.recording_filename
        ))
    })
}
