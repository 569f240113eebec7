//! Shared types, error model, and configuration for nbforge.
//!
//! This crate is the foundation depended on by all other nbforge crates.
//! It provides:
//! - [`NbforgeError`] — the unified error type
//! - Domain types ([`Collection`], [`Category`], [`BuildJob`], [`JobContext`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildSettings, CiConfig, PathsConfig, SiteConfig, ci_token, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{NbforgeError, Result};
pub use types::{
    ArtifactContext, BuildContext, BuildJob, Category, Collection, DEFAULT_SCRIPT_TIMEOUT_SECS,
    IgnoreData, JobContext, Metadata, MetadataContext, Namespace, Notebook, NotebookContext,
    PreInstall, PreRequirements, Requirements,
};
