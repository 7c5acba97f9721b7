//! Database models
//!
//! Every entity insert goes through [`insert_row`]. The column list of each
//! statement is the fixed field set of a typed record, so no client-supplied
//! key ever reaches SQL text, and the generated id comes back from the same
//! statement (`RETURNING id`) instead of a follow-up lookup.

use crate::Result;
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection};
use sqlx::Row;

/// Query type the records bind their values into
pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// A typed record that can be inserted into one table
pub trait NewRow {
    /// Target table
    const TABLE: &'static str;
    /// Columns written, in the order [`NewRow::bind_values`] binds them
    const COLUMNS: &'static [&'static str];

    /// Bind one value per entry of [`NewRow::COLUMNS`]
    fn bind_values<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;
}

/// SQL text for inserting `R`, returning the generated id
pub fn insert_sql<R: NewRow>() -> String {
    let columns = R::COLUMNS
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; R::COLUMNS.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING id",
        R::TABLE,
        columns,
        placeholders
    )
}

/// Insert `row` and return its generated id in one atomic statement
pub async fn insert_row<R: NewRow>(conn: &mut SqliteConnection, row: &R) -> Result<i64> {
    let sql = insert_sql::<R>();
    let result = row.bind_values(sqlx::query(&sql)).fetch_one(&mut *conn).await?;
    let id: i64 = result.try_get("id")?;
    Ok(id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDevice {
    pub user_agent: String,
    pub imei: Option<String>,
}

impl NewRow for NewDevice {
    const TABLE: &'static str = "device";
    const COLUMNS: &'static [&'static str] = &["userAgent", "imei"];

    fn bind_values<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query.bind(&self.user_agent).bind(&self.imei)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInstructor {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

impl NewRow for NewInstructor {
    const TABLE: &'static str = "instructor";
    const COLUMNS: &'static [&'static str] = &["name", "email", "phone", "address"];

    fn bind_values<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(&self.name)
            .bind(&self.email)
            .bind(&self.phone)
            .bind(&self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSpeaker {
    pub name: String,
    pub device_imei: Option<String>,
}

impl NewRow for NewSpeaker {
    const TABLE: &'static str = "speaker";
    const COLUMNS: &'static [&'static str] = &["name", "deviceImei"];

    fn bind_values<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query.bind(&self.name).bind(&self.device_imei)
    }
}

/// Open-ended key/value pair attached to a speaker at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSpeakerAttribute {
    pub speaker_id: i64,
    pub key: String,
    pub value: String,
}

impl NewRow for NewSpeakerAttribute {
    const TABLE: &'static str = "speaker_info";
    const COLUMNS: &'static [&'static str] = &["speakerId", "s_key", "s_value"];

    fn bind_values<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query.bind(self.speaker_id).bind(&self.key).bind(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewToken {
    pub input_token: String,
    pub valid: bool,
}

impl NewRow for NewToken {
    const TABLE: &'static str = "token";
    const COLUMNS: &'static [&'static str] = &["inputToken", "valid"];

    fn bind_values<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query.bind(&self.input_token).bind(self.valid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub speaker_id: i64,
    pub instructor_id: i64,
    pub device_id: i64,
    pub location: String,
    pub start: String,
    pub end: String,
    pub comments: Option<String>,
}

impl NewRow for NewSession {
    const TABLE: &'static str = "session";
    const COLUMNS: &'static [&'static str] = &[
        "speakerId",
        "instructorId",
        "deviceId",
        "location",
        "start",
        "end",
        "comments",
    ];

    fn bind_values<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.speaker_id)
            .bind(self.instructor_id)
            .bind(self.device_id)
            .bind(&self.location)
            .bind(&self.start)
            .bind(&self.end)
            .bind(&self.comments)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecording {
    pub token_id: i64,
    pub speaker_id: i64,
    pub session_id: i64,
    /// Basename inside the session directory
    pub filename: String,
}

impl NewRow for NewRecording {
    const TABLE: &'static str = "recording";
    const COLUMNS: &'static [&'static str] = &["tokenId", "speakerId", "sessionId", "filename"];

    fn bind_values<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.token_id)
            .bind(self.speaker_id)
            .bind(self.session_id)
            .bind(&self.filename)
    }
}

/// Membership of one recording in a named evaluation set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvaluationSetMember {
    pub eval_set: String,
    pub recording_id: i64,
}

impl NewRow for NewEvaluationSetMember {
    const TABLE: &'static str = "evaluation_sets";
    const COLUMNS: &'static [&'static str] = &["eval_set", "recordingId"];

    fn bind_values<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query.bind(&self.eval_set).bind(self.recording_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvaluation {
    pub recording_id: i64,
    pub eval_set: String,
    pub evaluator: String,
    pub grade: Option<i64>,
    pub comments: Option<String>,
    pub skipped: bool,
}

impl NewRow for NewEvaluation {
    const TABLE: &'static str = "evaluation";
    const COLUMNS: &'static [&'static str] = &[
        "recordingId",
        "eval_set",
        "evaluator",
        "grade",
        "comments",
        "skipped",
    ];

    fn bind_values<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.recording_id)
            .bind(&self.eval_set)
            .bind(&self.evaluator)
            .bind(self.grade)
            .bind(&self.comments)
            .bind(self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_database;

    #[test]
    fn test_insert_sql_quotes_fixed_columns() {
        assert_eq!(
            insert_sql::<NewDevice>(),
            "INSERT INTO device (\"userAgent\", \"imei\") VALUES (?, ?) RETURNING id"
        );
        assert!(insert_sql::<NewSession>().contains("\"end\""));
    }

    #[tokio::test]
    async fn test_insert_row_returns_distinct_ids_for_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("models.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let device = NewDevice {
            user_agent: "Mozilla/5.0".to_string(),
            imei: None,
        };
        let first = insert_row(&mut conn, &device).await.unwrap();
        let second = insert_row(&mut conn, &device).await.unwrap();

        assert_ne!(first, second, "Identical rows must still get their own ids");
        assert!(second > first);
    }
}
