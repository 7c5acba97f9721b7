//! Public links to recordings for evaluator-facing responses

/// Builds the link an evaluator's client uses to fetch a recording
pub trait LinkBuilder: Send + Sync {
    fn recording_link(&self, session_id: i64, filename: &str) -> String;
}

/// Joins a public base path with the session-relative file path,
/// e.g. `/recs/session_26/anna_take1.wav`
#[derive(Debug, Clone)]
pub struct PublicBaseLinks {
    base: String,
}

impl PublicBaseLinks {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

impl LinkBuilder for PublicBaseLinks {
    fn recording_link(&self, session_id: i64, filename: &str) -> String {
        format!("{}/session_{}/{}", self.base, session_id, filename)
    }
}
