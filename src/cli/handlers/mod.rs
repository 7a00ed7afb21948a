//! CLI command handlers module
//!
//! This module is organized by functional domains:
//! - init: Database initialization
//! - taxonomy: Taxonomy import and embedding backfill
//! - classify: Single and batch classification
//! - serve: API server
//! - info: Configuration display

pub mod classify;
pub mod info;
pub mod init;
pub mod serve;
pub mod taxonomy;

// Re-export all public handlers
pub use classify::*;
pub use info::*;
pub use init::*;
pub use serve::*;
pub use taxonomy::*;
