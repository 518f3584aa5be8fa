//! Shared types, error model, and configuration for folioscan.
//!
//! This crate is the foundation depended on by all other folioscan crates.
//! It provides:
//! - [`FolioError`] - the unified error type
//! - Domain types ([`WorkId`], [`ImageFile`], [`JournalEntry`], [`Severity`])
//! - Configuration ([`AppConfig`], [`AnalyzerConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnalyzerConfig, AnalyzerSection, AppConfig, SchemaSection, StructureRule, WorkSection,
    config_dir, config_file_path, init_config, journal_db_path, load_config, load_config_from,
};
pub use error::{FolioError, Result};
pub use types::{ImageFile, JournalEntry, Severity, UNCOUNTED, WorkId};
