//! Session submission envelope: `{"type": "session", "data": {...}}`

use std::collections::HashMap;

use frec_common::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::identity::{ClientId, SpeakerDocument};

/// One uploaded audio item
#[derive(Debug, Clone)]
pub struct UploadedRecording {
    /// Filename as sent by the client; keys into `recordingsInfo`
    pub filename: String,
    pub audio: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Payload of a session submission
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub speaker_info: Value,
    /// Shorthand for `instructorInfo: {"id": ..}`
    #[serde(default)]
    pub instructor_id: Option<ClientId>,
    #[serde(default)]
    pub instructor_info: Option<Value>,
    pub device_info: Value,
    pub location: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub recordings_info: HashMap<String, RecordingMeta>,
}

/// Per-recording metadata, keyed by uploaded filename
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMeta {
    #[serde(default)]
    pub token_id: Option<ClientId>,
    /// Prompt text sent inline; preferred over the token table
    #[serde(default)]
    pub token_text: Option<String>,
}

impl SessionData {
    /// Instructor document to resolve: explicit info wins over a bare id
    pub fn instructor_document(&self) -> Result<Value> {
        if let Some(info) = &self.instructor_info {
            return Ok(info.clone());
        }
        match ClientId::present(&self.instructor_id) {
            Some(ClientId::Number(n)) => Ok(serde_json::json!({ "id": n })),
            Some(ClientId::Text(s)) => Ok(serde_json::json!({ "id": s })),
            None => {
                warn!("Session data carries no instructor");
                Err(Error::InvalidInput(
                    "Session data not on correct format: instructorId is required".to_string(),
                ))
            }
        }
    }

    /// Speaker name as submitted, if the speaker document is readable
    pub fn speaker_name(&self) -> Option<String> {
        crate::identity::parse_document::<SpeakerDocument>("Speaker", &self.speaker_info)
            .ok()
            .map(|doc| doc.name)
    }
}

/// Parse the raw envelope of a session submission
pub fn parse_envelope(raw: &str) -> Result<SessionData> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(|e| {
        warn!(error = %e, "Session data not on correct format");
        Error::InvalidInput(format!("Session data not on correct format: {}", e))
    })?;

    if envelope.kind != "session" {
        warn!(kind = %envelope.kind, "Wrong type of data");
        return Err(Error::InvalidInput(format!(
            "Wrong type of data: {}",
            envelope.kind
        )));
    }

    serde_json::from_value(envelope.data).map_err(|e| {
        warn!(error = %e, "Session data not on correct format");
        Error::InvalidInput(format!("Session data not on correct format: {}", e))
    })
}
