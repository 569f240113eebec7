//! Job context materialization and build execution.
//!
//! This crate provides:
//! - [`context`] — isolated build-directory creation and script rendering
//! - [`executor`] — blocking child-process execution with per-job log files
//! - [`metadata`] — notebook sidecar metadata extraction

pub mod context;
pub mod executor;
pub mod metadata;

pub use context::generate_job_context;
pub use executor::{run_command, run_job_context};
pub use metadata::{NotebookMetadata, extract_metadata, reset_notebook_execution};
