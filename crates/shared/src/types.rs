//! Core domain types for the nbforge build pipeline.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

/// Default timeout (seconds) carried into generated build scripts.
pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 600;

// ---------------------------------------------------------------------------
// Discovery-side types
// ---------------------------------------------------------------------------

/// Merged `.gitignore` entries plus the built-in defaults.
///
/// Order is irrelevant; membership is all that matters.
#[derive(Debug, Clone, Default)]
pub struct IgnoreData {
    pub entries: HashSet<String>,
}

impl IgnoreData {
    /// Whether a directory or file name is ignored.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains(name)
    }
}

/// A top-level namespace directory containing one or more categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collection {
    pub name: String,
    pub path: PathBuf,
}

/// An intermediate directory segment between a collection and a nested category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Namespace {
    pub name: String,
}

/// Sidecar metadata JSON path for one notebook. The file may not exist yet;
/// it is produced during the build by metadata extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub path: PathBuf,
}

/// One notebook file within a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notebook {
    pub name: String,
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// Path to a category's optional `pre-requirements.txt` manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreRequirements {
    pub path: PathBuf,
}

/// Path to a category's `requirements.txt` manifest. Its presence is what
/// qualifies a directory as a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirements {
    pub path: PathBuf,
}

/// Path to a category's optional `pre-install.sh` hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreInstall {
    pub path: PathBuf,
}

/// A directory with a dependency manifest and at least one notebook.
/// The atomic unit of a build.
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub name: String,
    pub path: PathBuf,
    pub collection: Collection,
    pub notebooks: Vec<Notebook>,
    pub pre_install: PreInstall,
    pub pre_requirements: PreRequirements,
    pub requirements: Requirements,
    /// Intermediate directory names between the collection root and this
    /// category, in order. Empty for categories directly under a collection.
    pub namespaces: Vec<Namespace>,
}

/// A (collection, category) pair queued for building.
#[derive(Debug, Clone, Serialize)]
pub struct BuildJob {
    pub collection: Collection,
    pub category: Category,
}

impl BuildJob {
    /// Stable identity key `collection/namespaces…/category`.
    ///
    /// Used consistently for scheduling, build/artifact directory naming,
    /// and merge-time deduplication. Two jobs with the same semantic path
    /// are the same build target.
    pub fn semantic_path(&self) -> String {
        let mut segments = Vec::with_capacity(self.category.namespaces.len() + 2);
        segments.push(self.collection.name.as_str());
        for namespace in &self.category.namespaces {
            segments.push(namespace.name.as_str());
        }
        segments.push(self.category.name.as_str());
        segments.join("/")
    }

    /// Per-job log file stem.
    pub fn log_name(&self) -> String {
        format!("{}-{}", self.collection.name, self.category.name)
    }

    /// Dot-separated `collection.category` key used by the artifact merge
    /// to deduplicate online against local artifact sources.
    pub fn namespace_key(&self) -> String {
        format!("{}.{}", self.collection.name, self.category.name)
    }
}

// ---------------------------------------------------------------------------
// Build-side contexts
// ---------------------------------------------------------------------------

/// Build-wide values passed to every script template.
#[derive(Debug, Clone, Serialize)]
pub struct BuildContext {
    pub build_dir: PathBuf,
    /// Converter output format, e.g. `html`.
    pub output_format: String,
    /// Per-notebook execution timeout in seconds. Carried into the rendered
    /// scripts; not enforced by the scheduler.
    pub timeout: u64,
}

/// Final artifact destinations for one notebook, rooted under the shared
/// artifact directory keyed by the job's semantic path.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactContext {
    pub dirpath: PathBuf,
    pub path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Destination of the extracted metadata sidecar for one notebook.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataContext {
    pub path: PathBuf,
}

/// Per-notebook build unit within a [`JobContext`].
#[derive(Debug, Clone, Serialize)]
pub struct NotebookContext {
    pub notebook: Notebook,
    pub collection_name: String,
    pub category_name: String,
    /// The notebook's copy inside the build directory.
    pub path: PathBuf,
    pub build_script_path: PathBuf,
    pub metadata: MetadataContext,
    pub artifact: ArtifactContext,
}

/// An ephemeral, filesystem-backed working copy created fresh per build
/// attempt. Owned exclusively by one execution attempt; never shared across
/// concurrent workers for the same job.
#[derive(Debug, Clone, Serialize)]
pub struct JobContext {
    pub build_dir: PathBuf,
    pub setup_script: PathBuf,
    pub notebooks: Vec<NotebookContext>,
    pub job: BuildJob,
    pub pre_install: PreInstall,
    pub pre_requirements: PreRequirements,
    pub requirements: Requirements,
    pub logfile_name: String,
}
