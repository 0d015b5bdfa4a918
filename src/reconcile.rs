//! Startup reconciliation: the subagent root is ground truth, but a job
//! directory left `running` after a host reboot or a killed orchestrator
//! process describes a job that is actually dead. This module closes that
//! gap by walking the root once and rewriting any job whose on-disk status
//! disagrees with observable reality.

use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tracing::{info, warn};

use crate::job::{JobDir, JobStatus};
use crate::signal;
use crate::slot::SlotCounter;

const QUEUE_STALL_LIMIT: Duration = Duration::from_secs(5 * 60);

/// Full reconciliation pass over every job directory under `root`,
/// regardless of project. Run once at process startup before any command
/// that reads or mutates job state.
///
/// Two corrections are made:
///   - a job marked `running` whose recorded PID is no longer alive becomes
///     `failed`, with a stderr note explaining why;
///   - a job marked `queued` whose status file has not been touched in over
///     five minutes becomes `failed` — the process that would have started
///     it is presumed gone.
///
/// Afterward the slot counter is rewritten to the number of jobs actually
/// found `running`, so a crash that left it overcounted (or undercounted)
/// self-heals.
pub fn reconcile_all(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Ok(());
    }

    let mut live_running = 0u64;

    for project_entry in read_dir_entries(root) {
        if !project_entry.is_dir() {
            continue;
        }
        for job_entry in read_dir_entries(&project_entry) {
            if !job_entry.is_dir() {
                continue;
            }
            let job_id = job_entry
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dir = JobDir::from_path(job_entry.clone(), &job_id);
            if reconcile_job(&dir)? == JobStatus::Running {
                live_running += 1;
            }
        }
    }

    let counter = SlotCounter::new(root);
    let previous = counter.peek().unwrap_or(0);
    if previous != live_running {
        info!(previous, live_running, "resetting slot counter to observed running jobs");
        counter.reset_to(live_running)?;
    }

    Ok(())
}

/// Reconcile a single job directory, returning its status after any
/// correction. Used both by the full startup sweep and, lightweight, by
/// commands that read one job's state (`status`, `result`, `log`, `tail`)
/// so a dead job always reports accurately even between sweeps.
pub fn reconcile_job(dir: &JobDir) -> Result<JobStatus> {
    let status = dir.read_status()?;

    match status {
        JobStatus::Running => {
            let alive = match dir.read_pid()? {
                Some(pid) => signal::is_alive(pid),
                None => false,
            };
            if alive {
                Ok(JobStatus::Running)
            } else {
                warn!(job_id = %dir.job_id, "recorded PID is no longer alive; marking failed");
                let pid_desc = dir
                    .read_pid()?
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                dir.append_stderr_note(&format!(
                    "[GoLeM] Process died unexpectedly (PID {pid_desc})"
                ))?;
                dir.complete(JobStatus::Failed, None)?;
                Ok(JobStatus::Failed)
            }
        }
        JobStatus::Queued => {
            if is_stale_queue_entry(dir)? {
                warn!(job_id = %dir.job_id, "job stuck in queue past the staleness limit; marking failed");
                dir.append_stderr_note("[GoLeM] Job stuck in queue for over 5 minutes")?;
                dir.complete(JobStatus::Failed, None)?;
                Ok(JobStatus::Failed)
            } else {
                Ok(JobStatus::Queued)
            }
        }
        terminal => Ok(terminal),
    }
}

fn is_stale_queue_entry(dir: &JobDir) -> Result<bool> {
    let Ok(metadata) = std::fs::metadata(&dir.path) else {
        return Ok(false);
    };
    let Ok(modified) = metadata.modified() else {
        return Ok(false);
    };
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    Ok(age > QUEUE_STALL_LIMIT)
}

fn read_dir_entries(dir: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.flatten().map(|e| e.path()).collect())
        .unwrap_or_default()
}
