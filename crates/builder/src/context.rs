//! Build-directory materialization for one job.
//!
//! Given one discovered [`BuildJob`], creates an isolated working copy of the
//! category's source tree, renders the setup script and one build script per
//! notebook, and computes every notebook's final artifact destinations.

use std::path::Path;

use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use nbforge_render::Renderer;
use nbforge_shared::{
    AppConfig, ArtifactContext, BuildContext, BuildJob, JobContext, MetadataContext, NbforgeError,
    NotebookContext, PreInstall, PreRequirements, Requirements, Result,
};

/// Materialize an isolated build directory for `job` and render its scripts.
///
/// Any existing directory at `build_root/<semantic_path>` is destroyed first,
/// so repeated calls for the same job always yield a fresh working copy with
/// identical rendered scripts. A missing template or unrenderable variable
/// aborts context creation for the job.
#[instrument(skip_all, fields(job = %job.semantic_path()))]
pub fn generate_job_context(
    job: &BuildJob,
    config: &AppConfig,
    renderer: &Renderer,
) -> Result<JobContext> {
    let build_dir = config.paths.build_root.join(job.semantic_path());

    if build_dir.exists() {
        debug!(path = %build_dir.display(), "removing stale build directory");
        std::fs::remove_dir_all(&build_dir).map_err(|e| NbforgeError::io(&build_dir, e))?;
    }

    copy_tree(&job.category.path, &build_dir)?;

    let build_context = BuildContext {
        build_dir: build_dir.clone(),
        output_format: config.build.output_format.clone(),
        timeout: config.build.timeout_secs,
    };

    let setup_script = build_dir.join("setup-build-env.sh");
    let rendered = renderer.render(
        "setup-build-env.sh",
        &serde_json::json!({ "build_context": build_context }),
    )?;
    std::fs::write(&setup_script, rendered).map_err(|e| NbforgeError::io(&setup_script, e))?;

    let artifact_dir = config.paths.artifact_root.join(job.semantic_path());

    // Notebooks arrive name-sorted from the scanner; script generation and
    // execution follow that order.
    let mut notebooks = Vec::with_capacity(job.category.notebooks.len());
    for notebook in &job.category.notebooks {
        let artifact = ArtifactContext {
            dirpath: artifact_dir.clone(),
            path: artifact_dir.join(format!(
                "{}.{}",
                notebook.name, config.build.output_format
            )),
            metadata_path: artifact_dir.join(format!("{}.metadata.json", notebook.name)),
        };
        let metadata = MetadataContext {
            path: artifact.metadata_path.clone(),
        };

        let notebook_context = NotebookContext {
            notebook: notebook.clone(),
            collection_name: job.collection.name.clone(),
            category_name: job.category.name.clone(),
            path: build_dir.join(format!("{}.ipynb", notebook.name)),
            build_script_path: build_dir.join(format!("{}.build.sh", notebook.name)),
            metadata,
            artifact,
        };

        let script = renderer.render(
            "build.sh",
            &serde_json::json!({
                "build_context": build_context,
                "notebook_context": notebook_context,
            }),
        )?;
        std::fs::write(&notebook_context.build_script_path, script)
            .map_err(|e| NbforgeError::io(&notebook_context.build_script_path, e))?;

        notebooks.push(notebook_context);
    }

    info!(
        build_dir = %build_dir.display(),
        notebooks = notebooks.len(),
        "job context ready"
    );

    Ok(JobContext {
        setup_script,
        notebooks,
        job: job.clone(),
        pre_install: PreInstall {
            path: build_dir.join("pre-install.sh"),
        },
        pre_requirements: PreRequirements {
            path: build_dir.join("pre-requirements.txt"),
        },
        requirements: Requirements {
            path: build_dir.join("requirements.txt"),
        },
        logfile_name: job.log_name(),
        build_dir,
    })
}

/// Recursively copy a directory tree.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            NbforgeError::io(src, io)
        })?;

        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| NbforgeError::validation(format!("copy outside source tree: {e}")))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| NbforgeError::io(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| NbforgeError::io(parent, e))?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| NbforgeError::io(&target, e))?;
        }
    }

    Ok(())
}
