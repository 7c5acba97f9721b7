//! # frec Common Library
//!
//! Shared code for the frec recording services:
//! - Error type and client-facing error classification
//! - Configuration loading and root folder resolution
//! - Database initialization and schema
//! - Typed row records with atomic insert-returning-id
pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, ErrorKind, Result};
