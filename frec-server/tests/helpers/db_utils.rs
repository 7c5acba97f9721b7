//! Database Test Utilities
//!
//! Scratch databases and seed rows for integration tests

use anyhow::Result;
use frec_common::db::models::{
    insert_row, NewDevice, NewEvaluationSetMember, NewInstructor, NewRecording, NewSession,
    NewSpeaker, NewToken,
};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tempfile::TempDir;

/// Scratch recordings root with a database inside it
///
/// The TempDir must be kept alive for the duration of the test.
pub struct TestEnv {
    pub dir: TempDir,
    pub root: PathBuf,
    pub pool: SqlitePool,
}

/// Create a temporary recordings root and initialized database
pub async fn create_test_env() -> Result<TestEnv> {
    let dir = TempDir::new()?;
    let root = dir.path().join("recordings");
    std::fs::create_dir_all(&root)?;
    let pool = frec_common::db::init_database(&dir.path().join("test_frec.db")).await?;
    Ok(TestEnv { dir, root, pool })
}

/// Insert a fully registered instructor
pub async fn seed_instructor(pool: &SqlitePool) -> Result<i64> {
    let mut conn = pool.acquire().await?;
    let id = insert_row(
        &mut conn,
        &NewInstructor {
            name: "Gunnar".into(),
            email: "gunnar@example.org".into(),
            phone: "5551234".into(),
            address: "Laugavegur 1".into(),
        },
    )
    .await?;
    Ok(id)
}

/// Insert valid tokens, returning their ids in order
pub async fn seed_tokens(pool: &SqlitePool, prompts: &[&str]) -> Result<Vec<i64>> {
    let mut conn = pool.acquire().await?;
    let mut ids = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        ids.push(
            insert_row(
                &mut conn,
                &NewToken {
                    input_token: prompt.to_string(),
                    valid: true,
                },
            )
            .await?,
        );
    }
    Ok(ids)
}

/// Insert a recording in its own session, bypassing ingestion
pub async fn seed_recording(pool: &SqlitePool, token_id: i64, filename: &str) -> Result<(i64, i64)> {
    let mut conn = pool.acquire().await?;
    let device_id = insert_row(
        &mut conn,
        &NewDevice {
            user_agent: "seed".into(),
            imei: None,
        },
    )
    .await?;
    let speaker_id = insert_row(
        &mut conn,
        &NewSpeaker {
            name: "seed".into(),
            device_imei: None,
        },
    )
    .await?;
    let instructor_id = seed_instructor(pool).await?;
    let session_id = insert_row(
        &mut conn,
        &NewSession {
            speaker_id,
            instructor_id,
            device_id,
            location: "lab".into(),
            start: format!("start-{}", filename),
            end: "end".into(),
            comments: None,
        },
    )
    .await?;
    let recording_id = insert_row(
        &mut conn,
        &NewRecording {
            token_id,
            speaker_id,
            session_id,
            filename: filename.to_string(),
        },
    )
    .await?;
    Ok((session_id, recording_id))
}

/// Add a recording to a materialized evaluation set
pub async fn seed_set_member(pool: &SqlitePool, eval_set: &str, recording_id: i64) -> Result<i64> {
    let mut conn = pool.acquire().await?;
    let id = insert_row(
        &mut conn,
        &NewEvaluationSetMember {
            eval_set: eval_set.to_string(),
            recording_id,
        },
    )
    .await?;
    Ok(id)
}

/// Row count of `table`
pub async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64> {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    Ok(sqlx::query_scalar(&query).fetch_one(pool).await?)
}
