//! # oauth-storage-core
//!
//! Persistence contract for an OAuth2 authorization server: the stored entity
//! shapes, one capability trait per entity family, the shared error type and
//! backend configuration. Backends live in their own crates and implement
//! whichever capabilities they support.

pub mod config;
pub mod db;
pub mod env;
pub mod error;

// Re-exports for convenience
pub use config::{ConnectionOptions, DocumentConfig, Entity, KeyValueConfig};
pub use db::capabilities::*;
pub use db::models::*;
pub use error::{StorageError, StorageResult};
