//! Database initialization and typed row records

pub mod init;
pub mod models;

pub use init::*;
pub use models::*;
