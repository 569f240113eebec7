//! Artifact reconciliation and site publication.
//!
//! This crate provides:
//! - [`provider`] — the CI provider build/artifact listing client
//! - [`site`] — artifact tree assembly and static site rendering
//! - [`run_artifact_merge`] — the merge entry point: reconciles remote and
//!   local artifacts, deduplicates by `collection.category` namespace, and
//!   leaves a populated site directory as its result
//!
//! Remote artifacts win: a namespace covered by the online set never admits
//! local-source files for the same namespace.

pub mod provider;
pub mod site;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};
use url::Url;

use nbforge_render::Renderer;
use nbforge_scanner::find_build_jobs;
use nbforge_shared::{AppConfig, NbforgeError, Result, ci_token};

pub use provider::{
    ArtifactRef, BuildSummary, CiClient, complete_build_urls, latest_build_cohort,
};
pub use site::{ArtifactCategory, ArtifactCollection, ArtifactNotebook, build_artifact_tree};

/// Source marker recorded on locally sourced artifact tuples.
const LOCAL_SOURCE: &str = "local-file";

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Which artifact sources participate in the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    Online,
    Local,
    Both,
}

impl MergeMode {
    fn includes_online(self) -> bool {
        matches!(self, Self::Online | Self::Both)
    }

    fn includes_local(self) -> bool {
        matches!(self, Self::Local | Self::Both)
    }
}

/// Parameters of one merge run.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub project_path: PathBuf,
    pub org: String,
    pub repo_name: String,
    pub collection_allow_list: Vec<String>,
    pub category_allow_list: Vec<String>,
    pub notebook_allow_list: Vec<String>,
    pub mode: MergeMode,
}

/// Working directories of one merge run.
#[derive(Debug, Clone)]
pub struct MergeContext {
    /// Scratch directory remote artifacts are downloaded into.
    pub artifact_dest_dir: PathBuf,
    /// Final published site directory, rebuilt from scratch each run.
    pub site_dir: PathBuf,
    /// Static assets shipped alongside the templates, when present.
    pub assets_dir: Option<PathBuf>,
    /// Root of the local build-artifact tree.
    pub local_artifact_dir: PathBuf,
}

/// One artifact file admitted into the merge: either a notebook page or its
/// metadata sidecar.
#[derive(Debug, Clone)]
pub struct NotebookSource {
    pub filename: String,
    pub filepath: PathBuf,
    pub category: String,
    pub collection: String,
    pub source_url: String,
    pub is_metadata_file: bool,
}

/// Progress callback for merge runs.
pub trait MergeProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each remote artifact download.
    fn artifact_downloaded(&self, filename: &str, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl MergeProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn artifact_downloaded(&self, _filename: &str, _current: usize, _total: usize) {}
}

// ---------------------------------------------------------------------------
// Merge context setup
// ---------------------------------------------------------------------------

/// Reset the scratch and site directories and resolve asset locations.
///
/// Both directories are destroyed and recreated; the merge owns them.
pub fn generate_merge_context(options: &MergeOptions, config: &AppConfig) -> Result<MergeContext> {
    let artifact_dest_dir = options.project_path.join("pages");
    reset_dir(&artifact_dest_dir)?;

    let site_dir = options.project_path.join("site");
    reset_dir(&site_dir)?;

    let assets_dir = config
        .paths
        .template_dir
        .as_ref()
        .map(|dir| dir.join("assets"))
        .filter(|dir| {
            if dir.exists() {
                true
            } else {
                warn!(assets = %dir.display(), "assets dir missing");
                false
            }
        });

    Ok(MergeContext {
        artifact_dest_dir,
        site_dir,
        assets_dir,
        local_artifact_dir: config.paths.artifact_root.clone(),
    })
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| NbforgeError::io(dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| NbforgeError::io(dir, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Merge entry point
// ---------------------------------------------------------------------------

/// Run the full artifact merge and leave a populated site directory behind.
///
/// Zero builds from the CI provider terminates the run early — a no-op exit,
/// not an error. Any other network or parse failure propagates as fatal.
#[instrument(skip_all, fields(org = %options.org, repo = %options.repo_name, mode = ?options.mode))]
pub async fn run_artifact_merge(
    options: &MergeOptions,
    config: &AppConfig,
    renderer: &Renderer,
    progress: &dyn MergeProgress,
) -> Result<()> {
    let context = generate_merge_context(options, config)?;

    let mut sources: Vec<NotebookSource> = Vec::new();
    let mut covered: HashSet<String> = HashSet::new();

    if options.mode.includes_online() {
        progress.phase("Fetching remote artifacts");
        let token = ci_token(config)?;
        let client = CiClient::new(&config.ci.base_url, &token)?;

        let builds = client.list_builds(&options.org, &options.repo_name).await?;
        if builds.is_empty() {
            info!("no builds found, aborting artifact merge");
            return Ok(());
        }

        let cohort = latest_build_cohort(&builds)?;
        let urls = cohort_artifact_urls(&client, &cohort).await?;
        let online = download_sources(&client, &urls, &context.artifact_dest_dir, progress).await?;

        covered = online
            .iter()
            .map(|s| format!("{}.{}", s.collection, s.category))
            .collect();
        sources.extend(online);
    }

    if options.mode.includes_local() {
        progress.phase("Collecting local artifacts");
        sources.extend(local_sources(options, &covered, &context.local_artifact_dir)?);
    }

    progress.phase("Rendering site");
    let collections = build_artifact_tree(&sources)?;
    site::render_site(&context, &collections, renderer, &config.site)?;

    info!(
        sources = sources.len(),
        collections = collections.len(),
        "artifact merge complete"
    );

    Ok(())
}

/// Artifact URLs across the whole cohort, with incomplete builds excluded.
async fn cohort_artifact_urls(client: &CiClient, cohort: &[BuildSummary]) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    for build in cohort {
        let artifacts = client.list_artifacts(build).await?;
        match complete_build_urls(&artifacts) {
            Some(build_urls) => urls.extend(build_urls),
            None => info!(build_num = build.build_num, "incomplete build, excluding"),
        }
    }
    Ok(urls)
}

/// Stream each remote artifact into the scratch directory, recording a source
/// tuple per file. Collection and category come from the URL path.
async fn download_sources(
    client: &CiClient,
    urls: &[String],
    dest_dir: &Path,
    progress: &dyn MergeProgress,
) -> Result<Vec<NotebookSource>> {
    let mut sources = Vec::with_capacity(urls.len());
    for (index, url) in urls.iter().enumerate() {
        let (collection, category, filename) = split_artifact_url(url)?;
        let filepath = dest_dir.join(&filename);

        client.download(url, &filepath).await?;
        progress.artifact_downloaded(&filename, index + 1, urls.len());

        let is_metadata_file = filename.ends_with("metadata.json");
        sources.push(NotebookSource {
            filename,
            filepath,
            category,
            collection,
            source_url: url.clone(),
            is_metadata_file,
        });
    }
    Ok(sources)
}

/// The last three path segments of an artifact URL: collection, category,
/// and filename.
fn split_artifact_url(raw: &str) -> Result<(String, String, String)> {
    let url = Url::parse(raw)
        .map_err(|e| NbforgeError::parse(format!("bad artifact URL {raw}: {e}")))?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();

    let [.., collection, category, filename] = segments.as_slice() else {
        return Err(NbforgeError::validation(format!(
            "artifact URL too shallow: {raw}"
        )));
    };

    Ok((
        (*collection).to_string(),
        (*category).to_string(),
        (*filename).to_string(),
    ))
}

/// Local page/sidecar pairs for every discovered job whose namespace is not
/// already covered by the online set. Both files must exist to be admitted.
fn local_sources(
    options: &MergeOptions,
    covered: &HashSet<String>,
    local_artifact_dir: &Path,
) -> Result<Vec<NotebookSource>> {
    let jobs = find_build_jobs(
        &options.project_path,
        &options.collection_allow_list,
        &options.category_allow_list,
        &options.notebook_allow_list,
    )?;

    let mut sources = Vec::new();
    for job in jobs {
        if covered.contains(&job.namespace_key()) {
            continue;
        }

        let artifact_dir = local_artifact_dir.join(job.semantic_path());
        for notebook in &job.category.notebooks {
            let html_path = artifact_dir.join(format!("{}.html", notebook.name));
            let meta_path = artifact_dir.join(format!("{}.metadata.json", notebook.name));
            if !html_path.exists() || !meta_path.exists() {
                continue;
            }

            sources.push(NotebookSource {
                filename: format!("{}.html", notebook.name),
                filepath: html_path,
                category: job.category.name.clone(),
                collection: job.collection.name.clone(),
                source_url: LOCAL_SOURCE.into(),
                is_metadata_file: false,
            });
            sources.push(NotebookSource {
                filename: format!("{}.metadata.json", notebook.name),
                filepath: meta_path,
                category: job.category.name.clone(),
                collection: job.collection.name.clone(),
                source_url: LOCAL_SOURCE.into(),
                is_metadata_file: true,
            });
        }
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_repo_category(root: &Path, collection: &str, category: &str, notebook: &str) {
        let dir = root.join(collection).join(category);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("requirements.txt"), "numpy\n").unwrap();
        std::fs::write(dir.join(format!("{notebook}.ipynb")), "{\"cells\": []}").unwrap();
    }

    fn make_local_artifacts(artifact_root: &Path, semantic_path: &str, notebook: &str) {
        let dir = artifact_root.join(semantic_path);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{notebook}.html")),
            "<div class=\"cell\">x</div>",
        )
        .unwrap();
        std::fs::write(
            dir.join(format!("{notebook}.metadata.json")),
            r#"{"title": "T", "description": "D"}"#,
        )
        .unwrap();
    }

    fn options_for(root: &Path) -> MergeOptions {
        MergeOptions {
            project_path: root.to_path_buf(),
            org: "example-org".into(),
            repo_name: "notebooks".into(),
            collection_allow_list: vec![],
            category_allow_list: vec![],
            notebook_allow_list: vec![],
            mode: MergeMode::Local,
        }
    }

    #[test]
    fn split_artifact_url_takes_last_three_segments() {
        let (collection, category, filename) =
            split_artifact_url("https://ci.example/output/job/0/coll/cat/nb1.html").unwrap();
        assert_eq!(collection, "coll");
        assert_eq!(category, "cat");
        assert_eq!(filename, "nb1.html");
    }

    #[test]
    fn split_artifact_url_rejects_shallow_paths() {
        let err = split_artifact_url("https://ci.example/nb1.html").unwrap_err();
        assert!(matches!(err, NbforgeError::Validation { .. }));
    }

    #[test]
    fn local_sources_pair_html_with_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        make_repo_category(&repo, "coll", "cat", "nb1");
        let artifacts = tmp.path().join("artifacts");
        make_local_artifacts(&artifacts, "coll/cat", "nb1");

        let sources = local_sources(&options_for(&repo), &HashSet::new(), &artifacts).unwrap();
        assert_eq!(sources.len(), 2);
        assert!(!sources[0].is_metadata_file);
        assert!(sources[1].is_metadata_file);
        assert!(sources.iter().all(|s| s.source_url == "local-file"));
    }

    #[test]
    fn covered_namespaces_admit_no_local_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        make_repo_category(&repo, "coll", "cat", "nb1");
        let artifacts = tmp.path().join("artifacts");
        make_local_artifacts(&artifacts, "coll/cat", "nb1");

        let covered: HashSet<String> = ["coll.cat".to_string()].into_iter().collect();
        let sources = local_sources(&options_for(&repo), &covered, &artifacts).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn unbuilt_jobs_contribute_no_local_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        make_repo_category(&repo, "coll", "cat", "nb1");
        // Artifact tree exists but holds only the page, not the sidecar.
        let artifacts = tmp.path().join("artifacts");
        let dir = artifacts.join("coll/cat");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("nb1.html"), "x").unwrap();

        let sources = local_sources(&options_for(&repo), &HashSet::new(), &artifacts).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn namespaced_jobs_look_up_semantic_path_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        let dir = repo.join("coll/ns/cat");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("requirements.txt"), "x\n").unwrap();
        std::fs::write(dir.join("nb1.ipynb"), "{}").unwrap();

        let artifacts = tmp.path().join("artifacts");
        make_local_artifacts(&artifacts, "coll/ns/cat", "nb1");

        let sources = local_sources(&options_for(&repo), &HashSet::new(), &artifacts).unwrap();
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn generate_merge_context_resets_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let stale = tmp.path().join("site").join("stale.html");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        let config = AppConfig::default();
        let context = generate_merge_context(&options_for(tmp.path()), &config).unwrap();

        assert!(context.artifact_dest_dir.exists());
        assert!(context.site_dir.exists());
        assert!(!stale.exists());
        assert!(context.assets_dir.is_none());
    }

    #[tokio::test]
    async fn online_merge_is_a_noop_when_no_builds_exist() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path(
                "/project/github/example-org/notebooks",
            ))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut options = options_for(tmp.path());
        options.mode = MergeMode::Online;

        let mut config = AppConfig::default();
        config.ci.base_url = server.uri();
        config.ci.token_env = "NBFORGE_TEST_MERGE_TOKEN".into();
        // SAFETY: test-scoped env var with a unique name.
        unsafe { std::env::set_var("NBFORGE_TEST_MERGE_TOKEN", "secret") };

        let renderer = Renderer::new(None, &config.site).unwrap();
        run_artifact_merge(&options, &config, &renderer, &SilentProgress)
            .await
            .unwrap();

        // Early no-op exit: the site index was never rendered.
        assert!(!tmp.path().join("site/index.html").exists());
    }

    #[tokio::test]
    async fn full_local_merge_renders_a_site() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        make_repo_category(&repo, "coll", "cat", "nb1");

        let artifacts = tmp.path().join("artifacts");
        make_local_artifacts(&artifacts, "coll/cat", "nb1");

        let mut config = AppConfig::default();
        config.paths.artifact_root = artifacts;

        let options = options_for(&repo);
        let renderer = Renderer::new(None, &config.site).unwrap();
        run_artifact_merge(&options, &config, &renderer, &SilentProgress)
            .await
            .unwrap();

        let index = std::fs::read_to_string(repo.join("site/index.html")).unwrap();
        assert!(index.contains("coll/cat/nb1.html"));
        assert!(repo.join("site/coll/cat/nb1.html").exists());
    }
}
