//! Database initialization tests
//!
//! - Database file is created on first run
//! - Re-opening an existing database is safe
//! - Every table the ingestion and evaluation paths use exists
//! - Foreign keys are enforced on every pooled connection

use frec_common::db::init::init_database;
use frec_common::db::models::{insert_row, NewRecording};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("frec.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_idempotent_initialization() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("frec.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO token (inputToken, valid) VALUES ('halló heimur', 1)")
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    // Second initialization keeps existing rows
    let pool2 = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM token")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1, "Re-initialization must not drop data");
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("frec.db")).await.unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for expected in [
        "device",
        "evaluation",
        "evaluation_sets",
        "instructor",
        "recording",
        "session",
        "speaker",
        "speaker_info",
        "token",
    ] {
        assert!(
            tables.iter().any(|t| t == expected),
            "Table '{}' missing, found {:?}",
            expected,
            tables
        );
    }
}

#[tokio::test]
async fn test_recording_requires_existing_token() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("frec.db")).await.unwrap();

    // Acquire several connections so the check is not tied to the first one
    let mut conns = Vec::new();
    for _ in 0..3 {
        conns.push(pool.acquire().await.unwrap());
    }

    for conn in conns.iter_mut() {
        let result = insert_row(
            &mut *conn,
            &NewRecording {
                token_id: 999,
                speaker_id: 1,
                session_id: 1,
                filename: "a_b.wav".to_string(),
            },
        )
        .await;
        assert!(result.is_err(), "Dangling token reference must be rejected");
    }
}
