//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates every table the
//! ingestion and evaluation paths use. Table creation is idempotent.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Foreign keys are a per-connection setting, so they go on the connect
    // options rather than a one-off PRAGMA against the pool.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_device_table(pool).await?;
    create_instructor_table(pool).await?;
    create_speaker_tables(pool).await?;
    create_token_table(pool).await?;
    create_session_table(pool).await?;
    create_recording_table(pool).await?;
    create_evaluation_tables(pool).await?;
    Ok(())
}

async fn create_device_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            userAgent TEXT NOT NULL,
            imei TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_device_imei ON device(imei)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_instructor_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instructor (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT NOT NULL,
            address TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_speaker_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS speaker (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            deviceImei TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_speaker_name_imei ON speaker(name, deviceImei)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS speaker_info (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            speakerId INTEGER NOT NULL REFERENCES speaker(id),
            s_key TEXT NOT NULL,
            s_value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_token_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS token (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            inputToken TEXT NOT NULL,
            valid INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_session_table(pool: &SqlitePool) -> Result<()> {
    // "end" is an SQL keyword, so it stays quoted everywhere it is used
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            speakerId INTEGER NOT NULL REFERENCES speaker(id),
            instructorId INTEGER NOT NULL REFERENCES instructor(id),
            deviceId INTEGER NOT NULL REFERENCES device(id),
            location TEXT NOT NULL,
            start TEXT NOT NULL,
            "end" TEXT NOT NULL,
            comments TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_session_identity
        ON session(speakerId, instructorId, deviceId, location, start)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_recording_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recording (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tokenId INTEGER NOT NULL REFERENCES token(id),
            speakerId INTEGER NOT NULL REFERENCES speaker(id),
            sessionId INTEGER NOT NULL REFERENCES session(id),
            filename TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_recording_session ON recording(sessionId, filename)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_evaluation_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluation_sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            eval_set TEXT NOT NULL,
            recordingId INTEGER NOT NULL REFERENCES recording(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluation (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recordingId INTEGER NOT NULL REFERENCES recording(id),
            eval_set TEXT NOT NULL,
            evaluator TEXT NOT NULL,
            grade INTEGER,
            comments TEXT,
            skipped INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evaluation_progress ON evaluation(eval_set, evaluator)")
        .execute(pool)
        .await?;

    Ok(())
}
