//! Bounded worker pool over OS processes.
//!
//! Pulls `(collection, category)` pairs off a FIFO queue and spawns one child
//! process per pair, capped at a configurable number of live workers. Each
//! worker is the nbforge binary re-invoked with discovery scoped to that
//! single category and an explicit `--worker` flag, so simultaneous builds
//! share no in-process state: separate process memory, separate build
//! directories keyed by semantic path, separate log files.
//!
//! This is deliberately process-level, not thread-level, concurrency — the
//! executed build scripts spawn heavyweight external tooling that is not safe
//! to share across threads. Workers never outlive the scheduler's own
//! process: any still-running children are killed when the pool is dropped.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use nbforge_shared::{BuildJob, NbforgeError, Result};

// ---------------------------------------------------------------------------
// Queue entries and worker invocation
// ---------------------------------------------------------------------------

/// One scheduled unit of work: a single category within a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCategory {
    pub collection: String,
    pub category: String,
}

/// Build the scheduler queue from discovered jobs (one entry per category).
pub fn queue_from_jobs(jobs: &[BuildJob]) -> Vec<QueuedCategory> {
    jobs.iter()
        .map(|job| QueuedCategory {
            collection: job.collection.name.clone(),
            category: job.category.name.clone(),
        })
        .collect()
}

/// How to launch one worker process.
///
/// The scheduler appends `--collection-names <c> --category-names <t>` to
/// `base_args`, so the worker re-runs discovery scoped to exactly one
/// category. Concurrent mode travels in the argument list itself (the caller
/// includes `--worker` in `base_args`) rather than through a process-wide
/// environment variable.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub base_args: Vec<String>,
}

impl WorkerCommand {
    fn command_for(&self, job: &QueuedCategory) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .arg("--collection-names")
            .arg(&job.collection)
            .arg("--category-names")
            .arg(&job.category);
        command
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum simultaneously live worker processes.
    pub max_workers: usize,
    /// Sleep between reap passes when at the cap or draining.
    pub poll_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// A category whose worker exited non-zero.
#[derive(Debug, Clone)]
pub struct FailedCategory {
    pub collection: String,
    pub category: String,
    pub exit_code: i32,
}

/// Outcome of a scheduler run.
///
/// Worker failures do not abort the run and are not retried; they are
/// recorded here for the caller to report (and to decide the process exit
/// status on).
#[derive(Debug, Default)]
pub struct SchedulerReport {
    pub spawned: Vec<QueuedCategory>,
    pub failed: Vec<FailedCategory>,
}

/// Run every queued category through a bounded pool of worker processes.
///
/// Loops until the queue is drained and every worker has been reaped. At no
/// point are more than `max_workers` children alive, and every queued pair is
/// spawned exactly once, in queue order. Completion order across workers is
/// unordered.
#[instrument(skip_all, fields(jobs = queue.len(), max_workers = options.max_workers))]
pub fn run_scheduler(
    queue: &[QueuedCategory],
    worker: &WorkerCommand,
    options: &SchedulerOptions,
) -> Result<SchedulerReport> {
    let mut queue: VecDeque<QueuedCategory> = queue.iter().cloned().collect();
    let mut report = SchedulerReport::default();
    let mut pool = WorkerPool::default();

    info!(jobs = queue.len(), "starting concurrent build");

    while !queue.is_empty() || !pool.is_empty() {
        pool.reap(&mut report);

        if pool.len() >= options.max_workers {
            std::thread::sleep(options.poll_interval);
            continue;
        }

        let Some(next) = queue.pop_front() else {
            // Queue drained; wait for the remaining workers.
            if !pool.is_empty() {
                std::thread::sleep(options.poll_interval);
            }
            continue;
        };

        info!(
            collection = %next.collection,
            category = %next.category,
            "starting category build"
        );

        let child = worker.command_for(&next).spawn().map_err(|e| {
            NbforgeError::io(&worker.program, e)
        })?;

        report.spawned.push(next.clone());
        pool.push(RunningWorker { child, job: next });
    }

    info!(
        spawned = report.spawned.len(),
        failed = report.failed.len(),
        "concurrent build finished"
    );

    Ok(report)
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

struct RunningWorker {
    child: Child,
    job: QueuedCategory,
}

#[derive(Default)]
struct WorkerPool {
    workers: Vec<RunningWorker>,
}

impl WorkerPool {
    fn len(&self) -> usize {
        self.workers.len()
    }

    fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    fn push(&mut self, worker: RunningWorker) {
        self.workers.push(worker);
    }

    /// Remove every worker that has exited, recording non-zero exits.
    fn reap(&mut self, report: &mut SchedulerReport) {
        let mut alive = Vec::with_capacity(self.workers.len());

        for mut worker in self.workers.drain(..) {
            match worker.child.try_wait() {
                Ok(Some(status)) if status.success() => {
                    debug!(
                        collection = %worker.job.collection,
                        category = %worker.job.category,
                        "worker finished"
                    );
                }
                Ok(Some(status)) => {
                    let exit_code = status.code().unwrap_or(-1);
                    warn!(
                        collection = %worker.job.collection,
                        category = %worker.job.category,
                        exit_code,
                        "worker failed"
                    );
                    report.failed.push(FailedCategory {
                        collection: worker.job.collection,
                        category: worker.job.category,
                        exit_code,
                    });
                }
                Ok(None) => alive.push(worker),
                Err(e) => {
                    warn!(
                        collection = %worker.job.collection,
                        category = %worker.job.category,
                        error = %e,
                        "worker status check failed"
                    );
                    report.failed.push(FailedCategory {
                        collection: worker.job.collection,
                        category: worker.job.category,
                        exit_code: -1,
                    });
                }
            }
        }

        self.workers = alive;
    }
}

impl Drop for WorkerPool {
    /// Workers never outlive the scheduler's own process.
    fn drop(&mut self) {
        for worker in &mut self.workers {
            let _ = worker.child.kill();
            let _ = worker.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_worker(script: &str) -> WorkerCommand {
        WorkerCommand {
            program: PathBuf::from("/bin/sh"),
            base_args: vec!["-c".into(), script.into()],
        }
    }

    fn categories(n: usize) -> Vec<QueuedCategory> {
        (0..n)
            .map(|i| QueuedCategory {
                collection: "coll".into(),
                category: format!("cat_{i}"),
            })
            .collect()
    }

    fn fast_options(max_workers: usize) -> SchedulerOptions {
        SchedulerOptions {
            max_workers,
            poll_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn every_category_is_spawned_exactly_once() {
        let queue = categories(5);
        let report = run_scheduler(&queue, &shell_worker("sleep 0.05"), &fast_options(2)).unwrap();

        assert_eq!(report.spawned.len(), 5);
        assert!(report.failed.is_empty());
        for queued in &queue {
            let count = report.spawned.iter().filter(|s| *s == queued).count();
            assert_eq!(count, 1, "category {queued:?} spawned {count} times");
        }
    }

    #[test]
    fn failed_workers_are_recorded_not_raised() {
        let queue = categories(3);
        let report = run_scheduler(&queue, &shell_worker("exit 3"), &fast_options(2)).unwrap();

        assert_eq!(report.spawned.len(), 3);
        assert_eq!(report.failed.len(), 3);
        assert!(report.failed.iter().all(|f| f.exit_code == 3));
    }

    #[test]
    fn mixed_outcomes_record_only_failures() {
        // The appended --category-names value is visible to the script as a
        // positional parameter, letting one category fail on purpose.
        let script = r#"case "$3" in cat_1) exit 9;; *) exit 0;; esac"#;
        let queue = categories(3);
        let report = run_scheduler(&queue, &shell_worker(script), &fast_options(3)).unwrap();

        assert_eq!(report.spawned.len(), 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].category, "cat_1");
        assert_eq!(report.failed[0].exit_code, 9);
    }

    #[test]
    fn empty_queue_is_a_no_op() {
        let report = run_scheduler(&[], &shell_worker("exit 0"), &fast_options(2)).unwrap();
        assert!(report.spawned.is_empty());
        assert!(report.failed.is_empty());
    }

    #[test]
    fn worker_command_appends_scoping_args() {
        let worker = shell_worker("exit 0");
        let job = QueuedCategory {
            collection: "coll".into(),
            category: "cat".into(),
        };
        let command = worker.command_for(&job);
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec![
                "-c",
                "exit 0",
                "--collection-names",
                "coll",
                "--category-names",
                "cat"
            ]
        );
    }
}
