//! Device resolution: by IMEI when present, else by id + user agent

use frec_common::db::models::{insert_row, NewDevice};
use frec_common::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{parse_document, storage_failure, ClientId, IdentityResolver};

/// Device document as submitted by a client.
///
/// Unknown keys are rejected; the field set is the allow-list.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDocument {
    #[serde(rename = "userAgent")]
    pub user_agent: String,
    #[serde(default)]
    pub imei: Option<ClientId>,
    #[serde(default, rename = "deviceId")]
    pub device_id: Option<ClientId>,
}

impl DeviceDocument {
    fn new_row(&self) -> NewDevice {
        NewDevice {
            user_agent: self.user_agent.clone(),
            imei: ClientId::present(&self.imei).map(ClientId::to_text),
        }
    }
}

impl IdentityResolver {
    /// Resolve a device document to a device id, inserting a new device when
    /// it cannot be matched.
    pub async fn resolve_device(&self, doc: &Value) -> Result<i64> {
        let doc: DeviceDocument = parse_document("Device", doc)?;
        let mut conn = self.db.acquire().await.map_err(storage_failure)?;

        if let Some(imei) = ClientId::present(&doc.imei) {
            let imei = imei.to_text();
            let existing: Option<i64> =
                sqlx::query_scalar("SELECT id FROM device WHERE imei = ? ORDER BY id LIMIT 1")
                    .bind(&imei)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(storage_failure)?;

            if let Some(id) = existing {
                debug!(device_id = id, imei = %imei, "Device matched by IMEI");
                return Ok(id);
            }

            let id = insert_row(&mut conn, &doc.new_row())
                .await
                .map_err(storage_failure)?;
            info!(device_id = id, imei = %imei, "Inserted new device");
            return Ok(id);
        }

        if let Some(claimed) = ClientId::present(&doc.device_id) {
            let stored: Option<String> = match claimed.as_row_id() {
                Some(id) => sqlx::query_scalar("SELECT userAgent FROM device WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(storage_failure)?,
                None => None,
            };

            match (stored, claimed.as_row_id()) {
                (Some(user_agent), Some(id)) if user_agent == doc.user_agent => {
                    debug!(device_id = id, "Device matched by id and user agent");
                    return Ok(id);
                }
                (Some(_), _) => {
                    warn!(
                        claimed_id = %claimed.to_text(),
                        "userAgents don't match for supplied device id, creating new device"
                    );
                }
                (None, _) => {
                    warn!(
                        claimed_id = %claimed.to_text(),
                        "No device with supplied id, creating new device"
                    );
                }
            }
        }

        let id = insert_row(&mut conn, &doc.new_row())
            .await
            .map_err(storage_failure)?;
        info!(device_id = id, "Inserted new device");
        Ok(id)
    }
}
