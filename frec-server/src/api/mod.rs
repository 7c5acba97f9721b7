//! HTTP API handlers
//!
//! Thin adapter over the ingestion, token and evaluation components.
//! Authentication is handled in front of this service.

pub mod evaluation;
pub mod health;
pub mod recordings;
pub mod sessions;
pub mod submit;
pub mod tokens;

pub use evaluation::evaluation_routes;
pub use health::health_routes;
pub use recordings::recording_routes;
pub use sessions::session_routes;
pub use submit::submit_routes;
pub use tokens::token_routes;
