//! Speaker resolution: by (name, device IMEI), else by id + name
//!
//! Keys other than `name`, `deviceImei` and `speakerId` become speaker
//! attributes. Attributes are written only when a speaker is created.

use std::collections::BTreeMap;

use frec_common::db::models::{insert_row, NewSpeaker, NewSpeakerAttribute};
use frec_common::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{parse_document, storage_failure, ClientId, IdentityResolver};

#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerDocument {
    pub name: String,
    #[serde(default, rename = "deviceImei")]
    pub device_imei: Option<ClientId>,
    #[serde(default, rename = "speakerId")]
    pub speaker_id: Option<ClientId>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl SpeakerDocument {
    fn new_row(&self) -> NewSpeaker {
        NewSpeaker {
            name: self.name.clone(),
            device_imei: ClientId::present(&self.device_imei).map(ClientId::to_text),
        }
    }

    /// Attribute key/value pairs with values flattened to text
    pub fn attribute_pairs(&self) -> Vec<(String, String)> {
        self.attributes
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

impl IdentityResolver {
    /// Resolve a speaker document to a speaker id, inserting a new speaker
    /// (with its attributes) when it cannot be matched.
    pub async fn resolve_speaker(&self, doc: &Value) -> Result<i64> {
        let doc: SpeakerDocument = parse_document("Speaker", doc)?;

        if let Some(imei) = ClientId::present(&doc.device_imei) {
            let imei = imei.to_text();
            let existing: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM speaker WHERE name = ? AND deviceImei = ? ORDER BY id LIMIT 1",
            )
            .bind(&doc.name)
            .bind(&imei)
            .fetch_optional(&self.db)
            .await
            .map_err(storage_failure)?;

            if let Some(id) = existing {
                debug!(speaker_id = id, "Speaker matched by name and device IMEI");
                return Ok(id);
            }
            return self.insert_speaker(&doc).await;
        }

        if let Some(claimed) = ClientId::present(&doc.speaker_id) {
            let stored: Option<String> = match claimed.as_row_id() {
                Some(id) => sqlx::query_scalar("SELECT name FROM speaker WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.db)
                    .await
                    .map_err(storage_failure)?,
                None => None,
            };

            match (stored, claimed.as_row_id()) {
                (Some(name), Some(id)) if name == doc.name => {
                    debug!(speaker_id = id, "Speaker matched by id and name");
                    return Ok(id);
                }
                (Some(_), _) => {
                    warn!(
                        claimed_id = %claimed.to_text(),
                        "Names don't match for supplied speaker id, creating new speaker"
                    );
                }
                (None, _) => {
                    warn!(
                        claimed_id = %claimed.to_text(),
                        "No speaker with supplied id, creating new speaker"
                    );
                }
            }
        }

        self.insert_speaker(&doc).await
    }

    /// Insert speaker and attributes in one transaction
    async fn insert_speaker(&self, doc: &SpeakerDocument) -> Result<i64> {
        let mut tx = self.db.begin().await.map_err(storage_failure)?;

        let speaker_id = insert_row(&mut tx, &doc.new_row())
            .await
            .map_err(storage_failure)?;

        let pairs = doc.attribute_pairs();
        for (key, value) in &pairs {
            let attribute = NewSpeakerAttribute {
                speaker_id,
                key: key.clone(),
                value: value.clone(),
            };
            insert_row(&mut tx, &attribute)
                .await
                .map_err(storage_failure)?;
        }

        tx.commit().await.map_err(storage_failure)?;
        info!(
            speaker_id,
            attributes = pairs.len(),
            "Inserted new speaker"
        );
        Ok(speaker_id)
    }
}
