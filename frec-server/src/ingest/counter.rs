//! Delivered-recording count acknowledged to clients

use frec_common::Result;
use sqlx::SqlitePool;

/// Counts how many recordings a speaker has delivered.
///
/// A speaker identity can fork across resubmissions, so the count is the
/// larger of two views: recordings of every speaker with the submitted name
/// on the resolved device, and recordings of the resolved speaker id.
#[derive(Debug, Clone)]
pub struct RecordingCounter {
    db: SqlitePool,
}

impl RecordingCounter {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn count(&self, speaker_name: &str, speaker_id: i64, device_id: i64) -> Result<i64> {
        let by_name: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM recording
            WHERE speakerId IN (SELECT id FROM speaker WHERE name = ?)
              AND sessionId IN (SELECT id FROM session WHERE deviceId = ?)
            "#,
        )
        .bind(speaker_name)
        .bind(device_id)
        .fetch_one(&self.db)
        .await?;

        let by_id: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recording WHERE speakerId = ?")
            .bind(speaker_id)
            .fetch_one(&self.db)
            .await?;

        Ok(by_name.max(by_id))
    }
}
