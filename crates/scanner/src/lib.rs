//! Build-job discovery for notebook collection repositories.
//!
//! This crate provides:
//! - [`load_ignore`] — layered `.gitignore` merging with built-in defaults
//! - [`find_collections`] — top-level collection directories under a repo root
//! - [`find_categories`] — buildable categories (manifest + notebooks) within
//!   a collection, at any nesting depth
//! - [`find_build_jobs`] — the composed job stream with name allow-lists
//!
//! Discovery is a pure function of the filesystem at call time: it is invoked
//! repeatedly across the pipeline (initial discovery, per-worker re-discovery,
//! merge-time re-discovery) and returns consistent results absent filesystem
//! changes. Nothing is cached.

mod ignore;

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use nbforge_shared::{
    BuildJob, Category, Collection, IgnoreData, Metadata, Namespace, NbforgeError, Notebook,
    PreInstall, PreRequirements, Requirements, Result,
};

pub use ignore::{DEFAULT_IGNORE_ENTRIES, load_ignore};

/// The manifest file whose presence qualifies a directory as a category.
const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Notebook file extension.
const NOTEBOOK_EXT: &str = "ipynb";

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// Find the collections directly under `root`.
///
/// A collection is an immediate subdirectory whose name does not start with
/// `.` and is not in the ignore set (ignore rules computed once over the full
/// tree). Results are sorted by name so repeated scans are stable.
pub fn find_collections(root: &Path) -> Result<Vec<Collection>> {
    let ignore = load_ignore(root, false);

    let mut collections = Vec::new();
    let entries = std::fs::read_dir(root).map_err(|e| NbforgeError::io(root, e))?;
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || ignore.contains(&name) {
            continue;
        }

        collections.push(Collection { name, path });
    }

    collections.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(collections)
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Find the buildable categories under a collection, at any depth.
///
/// A directory qualifies as a category iff it contains `requirements.txt`.
/// Directories whose name starts with `.` or matches the collection's ignore
/// rules (root-level `.gitignore` only) are skipped and not descended into.
/// The `*.ipynb` files directly inside a category become its notebooks,
/// subject to `notebook_allow_list` (empty = all). Categories that end up
/// with zero notebooks are dropped with a warning — a policy, not an error.
pub fn find_categories(
    collection: &Collection,
    notebook_allow_list: &[String],
) -> Result<Vec<Category>> {
    let ignore = load_ignore(&collection.path, true);

    let mut categories = Vec::new();
    let walker = WalkDir::new(&collection.path)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden_or_ignored(entry, &ignore));

    for entry in walker.filter_map(std::result::Result::ok) {
        if !entry.file_type().is_dir() {
            continue;
        }

        let dirpath = entry.path();
        if !dirpath.join(REQUIREMENTS_FILE).exists() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let namespaces = namespaces_between(&collection.path, dirpath);
        let notebooks = collect_notebooks(dirpath, notebook_allow_list)?;

        if notebooks.is_empty() {
            warn!(category = %dirpath.display(), "missing notebooks in category, skipping");
            continue;
        }

        debug!(
            category = %name,
            notebooks = notebooks.len(),
            namespaces = namespaces.len(),
            "discovered category"
        );

        categories.push(Category {
            name,
            path: dirpath.to_path_buf(),
            collection: collection.clone(),
            notebooks,
            pre_install: PreInstall {
                path: dirpath.join("pre-install.sh"),
            },
            pre_requirements: PreRequirements {
                path: dirpath.join("pre-requirements.txt"),
            },
            requirements: Requirements {
                path: dirpath.join(REQUIREMENTS_FILE),
            },
            namespaces,
        });
    }

    Ok(categories)
}

/// Intermediate directory names between a collection root and a category
/// directory, excluding the category's own name.
fn namespaces_between(collection_path: &Path, category_path: &Path) -> Vec<Namespace> {
    let Ok(relative) = category_path.strip_prefix(collection_path) else {
        return Vec::new();
    };

    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    segments
        .iter()
        .take(segments.len().saturating_sub(1))
        .map(|name| Namespace { name: name.clone() })
        .collect()
}

/// Notebooks directly inside a category directory, name-sorted, filtered by
/// the allow-list (empty = all).
fn collect_notebooks(dirpath: &Path, allow_list: &[String]) -> Result<Vec<Notebook>> {
    let mut notebooks = Vec::new();
    let entries = std::fs::read_dir(dirpath).map_err(|e| NbforgeError::io(dirpath, e))?;
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(NOTEBOOK_EXT) {
            continue;
        }

        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        if !allowed(name, allow_list) {
            continue;
        }

        notebooks.push(Notebook {
            name: name.to_string(),
            path: path.clone(),
            metadata: Metadata {
                path: dirpath.join(format!("{name}.metadata.json")),
            },
        });
    }

    notebooks.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(notebooks)
}

/// Whether a walk entry should be skipped (and not descended into).
fn is_hidden_or_ignored(entry: &walkdir::DirEntry, ignore: &IgnoreData) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || ignore.contains(&name)
}

// ---------------------------------------------------------------------------
// Build jobs
// ---------------------------------------------------------------------------

/// Compose collection and category discovery into the build-job stream.
///
/// Name allow-lists apply at each level; an empty allow-list means "all".
pub fn find_build_jobs(
    root: &Path,
    collection_allow_list: &[String],
    category_allow_list: &[String],
    notebook_allow_list: &[String],
) -> Result<Vec<BuildJob>> {
    let mut jobs = Vec::new();
    for collection in find_collections(root)? {
        if !allowed(&collection.name, collection_allow_list) {
            continue;
        }

        for category in find_categories(&collection, notebook_allow_list)? {
            if !allowed(&category.name, category_allow_list) {
                continue;
            }

            jobs.push(BuildJob {
                collection: collection.clone(),
                category,
            });
        }
    }

    Ok(jobs)
}

fn allowed(name: &str, allow_list: &[String]) -> bool {
    allow_list.is_empty() || allow_list.iter().any(|allowed| allowed == name)
}
