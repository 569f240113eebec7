//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use nbforge_builder::{generate_job_context, reset_notebook_execution, run_job_context};
use nbforge_merge::{MergeMode, MergeOptions, MergeProgress, run_artifact_merge};
use nbforge_render::Renderer;
use nbforge_scanner::find_build_jobs;
use nbforge_scheduler::{
    SchedulerOptions, WorkerCommand, queue_from_jobs, run_scheduler,
};
use nbforge_shared::{AppConfig, config_file_path, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// nbforge — build notebook collections and publish their artifacts.
#[derive(Parser)]
#[command(
    name = "nbforge",
    version,
    about = "Discover, build, and publish notebook collections.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Discover and build notebook categories.
    Build {
        /// Repository root to scan.
        #[arg(short = 'p', long, default_value = ".")]
        project_path: PathBuf,

        /// Subset of collections to build (default: all).
        #[arg(short = 'c', long, value_delimiter = ',')]
        collection_names: Vec<String>,

        /// Subset of categories to build (default: all).
        #[arg(short = 't', long, value_delimiter = ',')]
        category_names: Vec<String>,

        /// Subset of notebooks to build (default: all).
        #[arg(short = 'n', long, value_delimiter = ',')]
        notebook_names: Vec<String>,

        /// Build categories concurrently with up to N worker processes.
        #[arg(long)]
        max_workers: Option<usize>,

        /// Run as a scheduler-spawned worker: scoped discovery, logs to files.
        #[arg(long, hide = true)]
        worker: bool,
    },

    /// Merge remote and local build artifacts into a published site.
    MergeArtifacts {
        /// Organization that owns the CI project.
        #[arg(short = 'o', long)]
        org: String,

        /// CI project (repository) name.
        #[arg(short = 'r', long)]
        repo_name: String,

        /// Repository root to scan for local artifacts.
        #[arg(short = 'p', long, default_value = ".")]
        project_path: PathBuf,

        /// Subset of collections to merge (default: all).
        #[arg(short = 'c', long, value_delimiter = ',')]
        collection_names: Vec<String>,

        /// Subset of categories to merge (default: all).
        #[arg(short = 't', long, value_delimiter = ',')]
        category_names: Vec<String>,

        /// Subset of notebooks to merge (default: all).
        #[arg(short = 'n', long, value_delimiter = ',')]
        notebook_names: Vec<String>,

        /// Which artifact sources participate.
        #[arg(long, default_value = "both")]
        mode: MergeModeArg,
    },

    /// Extract notebook metadata sidecars, or reset cell execution state.
    Metadata {
        /// Repository root to scan.
        #[arg(short = 'p', long, default_value = ".")]
        project_path: PathBuf,

        /// Subset of collections (default: all).
        #[arg(short = 'c', long, value_delimiter = ',')]
        collection_names: Vec<String>,

        /// Subset of categories (default: all).
        #[arg(short = 't', long, value_delimiter = ',')]
        category_names: Vec<String>,

        /// Subset of notebooks (default: all).
        #[arg(short = 'n', long, value_delimiter = ',')]
        notebook_names: Vec<String>,

        /// Clear outputs and execution counts in the source notebooks.
        #[arg(long)]
        reset_execution: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Merge source selection.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum MergeModeArg {
    Online,
    Local,
    Both,
}

impl From<MergeModeArg> for MergeMode {
    fn from(mode: MergeModeArg) -> Self {
        match mode {
            MergeModeArg::Online => MergeMode::Online,
            MergeModeArg::Local => MergeMode::Local,
            MergeModeArg::Both => MergeMode::Both,
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "nbforge=info",
        1 => "nbforge=debug",
        _ => "nbforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;

    match cli.command {
        Command::Build {
            project_path,
            collection_names,
            category_names,
            notebook_names,
            max_workers,
            worker,
        } => {
            if let Some(workers) = max_workers {
                run_concurrent_build(&config, &project_path, &collection_names, &category_names, workers)
            } else {
                // Worker processes log to files; foreground runs stream live.
                run_foreground_build(
                    &config,
                    &project_path,
                    &collection_names,
                    &category_names,
                    &notebook_names,
                    !worker,
                )
            }
        }

        Command::MergeArtifacts {
            org,
            repo_name,
            project_path,
            collection_names,
            category_names,
            notebook_names,
            mode,
        } => {
            let renderer = Renderer::new(config.paths.template_dir.as_deref(), &config.site)?;
            let options = MergeOptions {
                project_path,
                org,
                repo_name,
                collection_allow_list: collection_names,
                category_allow_list: category_names,
                notebook_allow_list: notebook_names,
                mode: mode.into(),
            };

            let progress = DownloadProgress::new();
            run_artifact_merge(&options, &config, &renderer, &progress).await?;
            progress.finish();
            Ok(())
        }

        Command::Metadata {
            project_path,
            collection_names,
            category_names,
            notebook_names,
            reset_execution,
        } => {
            if reset_execution {
                run_reset_execution(&project_path, &collection_names, &category_names)
            } else {
                run_extract_metadata(
                    &config,
                    &project_path,
                    &collection_names,
                    &category_names,
                    &notebook_names,
                )
            }
        }

        Command::Config { action } => match action {
            ConfigAction::Init => {
                let path = init_config()?;
                println!("Wrote default config to {}", path.display());
                Ok(())
            }
            ConfigAction::Show => {
                println!("# {}", config_file_path()?.display());
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Build paths
// ---------------------------------------------------------------------------

/// Sequential builds: discovery, context creation, and execution in-process.
fn run_foreground_build(
    config: &AppConfig,
    project_path: &std::path::Path,
    collection_names: &[String],
    category_names: &[String],
    notebook_names: &[String],
    live_output: bool,
) -> Result<()> {
    let renderer = Renderer::new(config.paths.template_dir.as_deref(), &config.site)?;
    let jobs = find_build_jobs(project_path, collection_names, category_names, notebook_names)?;

    if jobs.is_empty() {
        return Err(eyre!("no build jobs discovered under {}", project_path.display()));
    }

    for job in &jobs {
        info!(job = %job.semantic_path(), "building category");
        let context = generate_job_context(job, config, &renderer)?;
        run_job_context(&context, live_output, &config.paths.log_dir)?;
    }

    Ok(())
}

/// Concurrent builds: one worker process per category, bounded pool.
fn run_concurrent_build(
    config: &AppConfig,
    project_path: &std::path::Path,
    collection_names: &[String],
    category_names: &[String],
    max_workers: usize,
) -> Result<()> {
    let jobs = find_build_jobs(project_path, collection_names, category_names, &[])?;
    if jobs.is_empty() {
        return Err(eyre!("no build jobs discovered under {}", project_path.display()));
    }

    // Fresh log directory per concurrent run; log files are per-job-named.
    if config.paths.log_dir.exists() {
        std::fs::remove_dir_all(&config.paths.log_dir)?;
    }
    std::fs::create_dir_all(&config.paths.log_dir)?;

    let worker = WorkerCommand {
        program: std::env::current_exe()?,
        base_args: vec![
            "build".into(),
            "--project-path".into(),
            project_path.display().to_string(),
            "--worker".into(),
        ],
    };

    let options = SchedulerOptions {
        max_workers,
        poll_interval: std::time::Duration::from_millis(config.build.poll_interval_ms),
    };

    let report = run_scheduler(&queue_from_jobs(&jobs), &worker, &options)?;

    if !report.failed.is_empty() {
        let failed: Vec<String> = report
            .failed
            .iter()
            .map(|f| format!("{}/{} (exit {})", f.collection, f.category, f.exit_code))
            .collect();
        return Err(eyre!(
            "{} of {} category builds failed: {}",
            report.failed.len(),
            report.spawned.len(),
            failed.join(", ")
        ));
    }

    info!(built = report.spawned.len(), "all category builds finished");
    Ok(())
}

// ---------------------------------------------------------------------------
// Metadata paths
// ---------------------------------------------------------------------------

/// Extract sidecar metadata for every discovered notebook.
fn run_extract_metadata(
    config: &AppConfig,
    project_path: &std::path::Path,
    collection_names: &[String],
    category_names: &[String],
    notebook_names: &[String],
) -> Result<()> {
    let renderer = Renderer::new(config.paths.template_dir.as_deref(), &config.site)?;
    let jobs = find_build_jobs(project_path, collection_names, category_names, notebook_names)?;

    for job in &jobs {
        let context = generate_job_context(job, config, &renderer)?;
        for notebook_context in &context.notebooks {
            let metadata = nbforge_builder::extract_metadata(notebook_context)?;
            info!(
                notebook = %notebook_context.notebook.name,
                title = ?metadata.title,
                "extracted metadata"
            );
        }
    }

    Ok(())
}

/// Clear execution state of every discovered notebook, in place.
fn run_reset_execution(
    project_path: &std::path::Path,
    collection_names: &[String],
    category_names: &[String],
) -> Result<()> {
    let jobs = find_build_jobs(project_path, collection_names, category_names, &[])?;

    for job in &jobs {
        for notebook in &job.category.notebooks {
            let raw = std::fs::read_to_string(&notebook.path)?;
            let mut data: serde_json::Value = serde_json::from_str(&raw)?;
            reset_notebook_execution(&mut data);
            std::fs::write(&notebook.path, serde_json::to_string(&data)?)?;
            info!(notebook = %notebook.name, "reset execution state");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Merge progress display
// ---------------------------------------------------------------------------

/// Progress bar for artifact downloads during merges.
struct DownloadProgress {
    bar: ProgressBar,
}

impl DownloadProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{pos}/{len}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl MergeProgress for DownloadProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn artifact_downloaded(&self, filename: &str, current: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(current as u64);
        self.bar.set_message(filename.to_string());
    }
}
