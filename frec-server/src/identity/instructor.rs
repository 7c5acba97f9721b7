//! Instructor resolution: strict lookup by id, or creation from full fields

use frec_common::db::models::{insert_row, NewInstructor};
use frec_common::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{parse_document, storage_failure, ClientId, IdentityResolver};

/// Instructor document: either `{"id": ..}` or the full set of fields
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstructorDocument {
    #[serde(default)]
    pub id: Option<ClientId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl InstructorDocument {
    fn new_row(&self) -> Result<NewInstructor> {
        match (&self.name, &self.email, &self.phone, &self.address) {
            (Some(name), Some(email), Some(phone), Some(address)) => Ok(NewInstructor {
                name: name.clone(),
                email: email.clone(),
                phone: phone.clone(),
                address: address.clone(),
            }),
            _ => {
                warn!("Instructor document without id is missing fields");
                Err(Error::InvalidInput(
                    "Instructor data not on correct format: name, email, phone and address are required"
                        .to_string(),
                ))
            }
        }
    }
}

impl IdentityResolver {
    /// Resolve an instructor document.
    ///
    /// An id that does not exist is an error; this path never falls back to
    /// inserting a new instructor.
    pub async fn resolve_instructor(&self, doc: &Value) -> Result<i64> {
        let doc: InstructorDocument = parse_document("Instructor", doc)?;

        if let Some(claimed) = ClientId::present(&doc.id) {
            let existing: Option<i64> = match claimed.as_row_id() {
                Some(id) => sqlx::query_scalar("SELECT id FROM instructor WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.db)
                    .await
                    .map_err(storage_failure)?,
                None => None,
            };

            return existing.ok_or_else(|| {
                warn!(claimed_id = %claimed.to_text(), "No instructor with that id");
                Error::UnknownReference(format!(
                    "No instructor with that id: {}",
                    claimed.to_text()
                ))
            });
        }

        let row = doc.new_row()?;
        let mut conn = self.db.acquire().await.map_err(storage_failure)?;
        let id = insert_row(&mut conn, &row).await.map_err(storage_failure)?;
        info!(instructor_id = id, "Inserted new instructor");
        Ok(id)
    }
}
