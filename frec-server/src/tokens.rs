//! Prompt token issuance and validity
//!
//! Tokens marked invalid stay in the table (recordings still reference
//! them) but are never issued again. The set of invalid ids is cached and
//! dropped whenever a token's validity changes.

use std::collections::HashSet;

use frec_common::{Error, Result};
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// One entry of a token batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenEntry {
    pub id: i64,
    pub token: String,
}

/// Cached ids of tokens with `valid = 0`.
///
/// Loaded on first use, dropped by [`InvalidTokenCache::invalidate`].
#[derive(Debug, Default)]
pub struct InvalidTokenCache {
    ids: RwLock<Option<HashSet<i64>>>,
}

impl InvalidTokenCache {
    pub async fn get_or_load(&self, db: &SqlitePool) -> Result<HashSet<i64>> {
        if let Some(ids) = self.ids.read().await.as_ref() {
            return Ok(ids.clone());
        }

        let mut guard = self.ids.write().await;
        if let Some(ids) = guard.as_ref() {
            return Ok(ids.clone());
        }

        let ids: HashSet<i64> = sqlx::query_scalar::<_, i64>("SELECT id FROM token WHERE valid = 0")
            .fetch_all(db)
            .await?
            .into_iter()
            .collect();
        debug!(count = ids.len(), "Loaded invalid token ids");
        *guard = Some(ids.clone());
        Ok(ids)
    }

    pub async fn invalidate(&self) {
        *self.ids.write().await = None;
    }

    pub async fn is_loaded(&self) -> bool {
        self.ids.read().await.is_some()
    }
}

/// Issues prompts to field devices
#[derive(Debug)]
pub struct TokenCatalog {
    db: SqlitePool,
    invalid: InvalidTokenCache,
}

impl TokenCatalog {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            invalid: InvalidTokenCache::default(),
        }
    }

    pub fn invalid_cache(&self) -> &InvalidTokenCache {
        &self.invalid
    }

    /// Up to `count` random valid tokens, no repeats within one batch.
    ///
    /// Cached invalid ids are excluded and sampled in one query, so only the
    /// chosen rows leave the database.
    pub async fn issue_tokens(&self, count: usize) -> Result<Vec<TokenEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let invalid = self.invalid.get_or_load(&self.db).await.map_err(|e| {
            error!(error = %e, "Error loading invalid tokens");
            e
        })?;

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id, inputToken FROM token");
        if !invalid.is_empty() {
            builder.push(" WHERE id NOT IN (");
            let mut separated = builder.separated(", ");
            for id in &invalid {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY RANDOM() LIMIT ");
        builder.push_bind(i64::try_from(count).unwrap_or(i64::MAX));

        let rows = builder.build().fetch_all(&self.db).await.map_err(|e| {
            error!(error = %e, "Error getting tokens from database");
            Error::Database(e)
        })?;

        let mut tokens = Vec::with_capacity(rows.len());
        for row in rows {
            tokens.push(TokenEntry {
                id: row.try_get("id")?,
                token: row.try_get("inputToken")?,
            });
        }

        debug!(requested = count, issued = tokens.len(), "Issued tokens");
        Ok(tokens)
    }

    /// Mark a token valid or invalid for future issuance
    pub async fn set_token_validity(&self, token_id: i64, valid: bool) -> Result<()> {
        let result = sqlx::query("UPDATE token SET valid = ? WHERE id = ?")
            .bind(valid)
            .bind(token_id)
            .execute(&self.db)
            .await
            .map_err(|e| {
                error!(token_id, error = %e, "Error updating token validity");
                Error::Database(e)
            })?;

        if result.rows_affected() == 0 {
            warn!(token_id, "No token with supplied id");
            return Err(Error::UnknownReference(format!(
                "No token with supplied id: {}",
                token_id
            )));
        }

        self.invalid.invalidate().await;
        info!(token_id, valid, "Token validity changed");
        Ok(())
    }
}
