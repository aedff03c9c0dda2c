//! PaperScope Common Library
//!
//! Shared code for the PaperScope client core including:
//! - Wire models for the paper/entity REST contract
//! - Error taxonomy and integrity warnings
//! - Configuration management

pub mod config;
pub mod errors;
pub mod models;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{ClientError, IntegrityWarning, Result};
pub use models::{Entity, EntityFeed, Paper};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Well-known entity type tags emitted by the extraction pipeline.
/// The set is open-ended; these are the tags the backend produces today.
pub const ENTITY_TYPE_PERSON: &str = "PERSON";
pub const ENTITY_TYPE_ORG: &str = "ORG";
pub const ENTITY_TYPE_WORK_OF_ART: &str = "WORK_OF_ART";
pub const ENTITY_TYPE_LOC: &str = "LOC";
