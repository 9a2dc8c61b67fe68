//! Docshelf Common Library
//!
//! Shared code for the Docshelf gateway including:
//! - File-backed record store and document catalog
//! - Duplicate detection and short identifiers
//! - Error types and handling
//! - Configuration management
//! - Accounts, sessions and confirmation email
//! - Metadata lookup, PDF inspection and thumbnails
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod dedup;
pub mod email;
pub mod errors;
pub mod format;
pub mod ids;
pub mod library;
pub mod lookup;
pub mod metrics;
pub mod models;
pub mod pdf;
pub mod store;
pub mod thumbnail;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use library::Library;
pub use models::{Document, DocumentPatch};
pub use store::{DeleteMode, DocumentStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
