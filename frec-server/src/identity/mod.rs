//! Identity reconciliation for devices, speakers and instructors
//!
//! Field devices submit partially-untrusted identity documents with every
//! session. Device and speaker ambiguity never blocks ingestion: a mismatch
//! forks a new row and leaves the old one untouched. Instructors are
//! registered by an administrator, so an unknown instructor id is rejected.
//!
//! Two concurrent submissions for the same never-seen identity may each
//! insert a row. That duplicate is accepted; ids themselves come from an
//! atomic insert-returning statement, so neither request can pick up the
//! other's row.

mod device;
mod instructor;
mod speaker;

use frec_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{error, warn};

pub use device::DeviceDocument;
pub use instructor::InstructorDocument;
pub use speaker::SpeakerDocument;

/// Resolves or creates device, speaker and instructor rows
#[derive(Clone)]
pub struct IdentityResolver {
    db: SqlitePool,
}

impl IdentityResolver {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

/// An identifier as a client sends it: a JSON number or a string.
///
/// An empty string counts as absent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ClientId {
    Number(i64),
    Text(String),
}

impl ClientId {
    /// The id if it carries any value
    pub fn present(value: &Option<ClientId>) -> Option<&ClientId> {
        value.as_ref().filter(|id| match id {
            ClientId::Number(_) => true,
            ClientId::Text(s) => !s.trim().is_empty(),
        })
    }

    /// Numeric row id, if the value is one
    pub fn as_row_id(&self) -> Option<i64> {
        match self {
            ClientId::Number(n) => Some(*n),
            ClientId::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Text form, used for free-form identifiers such as IMEIs
    pub fn to_text(&self) -> String {
        match self {
            ClientId::Number(n) => n.to_string(),
            ClientId::Text(s) => s.clone(),
        }
    }
}

/// Deserialize an identity document.
///
/// Clients sometimes send nested documents as JSON-encoded strings, so a
/// string value is parsed once more before deserializing.
pub(crate) fn parse_document<T: DeserializeOwned>(what: &str, value: &Value) -> Result<T> {
    let parsed = match value {
        Value::String(raw) => serde_json::from_str::<Value>(raw).map_err(|e| {
            let msg = format!("{} data not on correct format: {}", what, e);
            warn!(document = what, error = %e, "Rejected identity document");
            Error::InvalidInput(msg)
        })?,
        other => other.clone(),
    };

    serde_json::from_value(parsed).map_err(|e| {
        warn!(document = what, error = %e, "Rejected identity document");
        Error::InvalidInput(format!("{} data not on correct format: {}", what, e))
    })
}

/// Log a storage failure with context before it is surfaced
pub(crate) fn storage_failure<E: Into<Error>>(e: E) -> Error {
    let e = e.into();
    error!(error = %e, "Storage failure during identity resolution");
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_id_presence() {
        assert!(ClientId::present(&Some(ClientId::Text(String::new()))).is_none());
        assert!(ClientId::present(&Some(ClientId::Text("  ".into()))).is_none());
        assert!(ClientId::present(&None).is_none());
        assert!(ClientId::present(&Some(ClientId::Number(0))).is_some());
        assert!(ClientId::present(&Some(ClientId::Text("12".into()))).is_some());
    }

    #[test]
    fn test_client_id_row_id() {
        assert_eq!(ClientId::Text(" 42 ".into()).as_row_id(), Some(42));
        assert_eq!(ClientId::Text("abc".into()).as_row_id(), None);
        assert_eq!(ClientId::Number(7).to_text(), "7");
    }

    #[test]
    fn test_parse_document_accepts_encoded_string() {
        let doc: DeviceDocument =
            parse_document("Device", &json!("{\"userAgent\":\"Mozilla\"}")).unwrap();
        assert_eq!(doc.user_agent, "Mozilla");
    }

    #[test]
    fn test_parse_document_rejects_garbage() {
        let err = parse_document::<DeviceDocument>("Device", &json!("{not json")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
