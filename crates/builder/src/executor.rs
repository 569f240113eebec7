//! Child-process execution for rendered build scripts.
//!
//! Commands run through `sh -c` in one of two modes: non-live (stdout and
//! stderr redirected to per-job log files, used by concurrent workers) or
//! live (attached to the parent's own streams, used for single-job
//! foreground runs). Either way the call blocks until the child exits.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{info, instrument};

use nbforge_shared::{JobContext, NbforgeError, Result};

use crate::metadata::extract_metadata;

/// Run a shell command to completion.
///
/// In non-live mode, `{log_name}.stdout.log` and `{log_name}.stderr.log` are
/// created (truncating any prior content) inside `log_dir` and the child's
/// streams are redirected there. A non-zero exit raises
/// [`NbforgeError::Build`] carrying the exit code and the command string;
/// zero exit is silent success.
pub fn run_command(cmd: &str, log_name: &str, live_output: bool, log_dir: &Path) -> Result<()> {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);

    info!(command = %cmd, "running build command");

    if !live_output {
        std::fs::create_dir_all(log_dir).map_err(|e| NbforgeError::io(log_dir, e))?;

        let stdout_path = log_dir.join(format!("{log_name}.stdout.log"));
        let stderr_path = log_dir.join(format!("{log_name}.stderr.log"));
        let stdout = std::fs::File::create(&stdout_path)
            .map_err(|e| NbforgeError::io(&stdout_path, e))?;
        let stderr = std::fs::File::create(&stderr_path)
            .map_err(|e| NbforgeError::io(&stderr_path, e))?;

        info!(logs = %log_dir.display(), "logs at {log_name}.*.log");
        command.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
    }

    let mut child = command
        .spawn()
        .map_err(|e| NbforgeError::io(Path::new("sh"), e))?;

    let status = child
        .wait()
        .map_err(|e| NbforgeError::io(Path::new("sh"), e))?;

    if !status.success() {
        return Err(NbforgeError::build(status.code().unwrap_or(-1), cmd));
    }

    Ok(())
}

/// Run a prepared job context: setup script first, then each notebook's
/// metadata extraction and build script in order.
///
/// Fail-fast: the first [`NbforgeError::Build`] propagates without attempting
/// the remaining notebooks.
#[instrument(skip_all, fields(job = %context.job.semantic_path()))]
pub fn run_job_context(context: &JobContext, live_output: bool, log_dir: &Path) -> Result<()> {
    info!("setting up build environment");
    run_command(
        &format!("bash \"{}\"", context.setup_script.display()),
        &context.logfile_name,
        live_output,
        log_dir,
    )?;

    for notebook in &context.notebooks {
        info!(notebook = %notebook.notebook.name, "extracting metadata");
        extract_metadata(notebook)?;

        info!(notebook = %notebook.notebook.name, "building notebook");
        run_command(
            &format!("bash \"{}\"", notebook.build_script_path.display()),
            &context.logfile_name,
            live_output,
            log_dir,
        )?;
    }

    Ok(())
}
