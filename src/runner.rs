//! The supervised runner: the ordering-sensitive glue between job creation,
//! slot acquisition, subprocess execution, output parsing, and terminal
//! status.
//!
//! A synchronous run does all seven steps on the caller's thread. An
//! asynchronous start does steps 1-2 on the caller's thread (which includes
//! spawning the detached process that becomes this job's long-lived
//! supervisor) and publishes the job ID immediately; steps 3-7 run inside
//! that detached process, re-entering at [`run_from_queued`].

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::warn;

use crate::atomic;
use crate::engine::{self, EngineInput};
use crate::error::GolemError;
use crate::identity;
use crate::job::{JobDir, JobStatus, ModelTriplet};
use crate::parser;
use crate::slot::SlotCounter;

pub struct RunRequest {
    pub workdir: PathBuf,
    pub prompt: String,
    pub permission_mode: String,
    pub models: ModelTriplet,
    pub timeout_secs: u64,
    pub max_parallel: u64,
    pub zai_base_url: String,
    pub auth_token: String,
    pub zai_api_timeout_ms: String,
}

/// Releases a claimed slot exactly once, including on panic unwind.
struct SlotGuard<'a> {
    counter: &'a SlotCounter,
    released: bool,
}

impl<'a> SlotGuard<'a> {
    fn new(counter: &'a SlotCounter) -> Self {
        SlotGuard {
            counter,
            released: false,
        }
    }

    fn release_now(&mut self) {
        if !self.released {
            if let Err(e) = self.counter.release_slot() {
                warn!(error = %e, "failed to release slot");
            }
            self.released = true;
        }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// Run a job synchronously on the calling thread: all seven steps from
/// start to finish.
pub fn run_job(root: &Path, project_id: &str, request: &RunRequest) -> Result<JobDir, GolemError> {
    engine::check_dependency()?;

    let job_id = identity::generate_job_id();
    let dir = JobDir::create(
        root,
        project_id,
        &job_id,
        &request.prompt,
        &request.workdir,
        &request.permission_mode,
        &request.models,
    )
    .map_err(|e| GolemError::internal(format!("{e:#}")))?;

    dir.record_pid(std::process::id())
        .map_err(|e| GolemError::internal(format!("{e:#}")))?;

    run_from_queued(root, &dir, request).map_err(|e| GolemError::internal(format!("{e:#}")))?;
    Ok(dir)
}

/// Start a job asynchronously: create the job directory and spawn a
/// detached `golem _supervise` process that becomes this job's long-lived
/// supervisor, then return once its PID is recorded. The caller may publish
/// the job ID the moment this returns.
pub fn start_job(root: &Path, project_id: &str, request: &RunRequest) -> Result<JobDir, GolemError> {
    engine::check_dependency()?;

    let job_id = identity::generate_job_id();
    let dir = JobDir::create(
        root,
        project_id,
        &job_id,
        &request.prompt,
        &request.workdir,
        &request.permission_mode,
        &request.models,
    )
    .map_err(|e| GolemError::internal(format!("{e:#}")))?;

    let exe = std::env::current_exe().map_err(|e| GolemError::internal(format!("{e:#}")))?;
    let child = Command::new(exe)
        .arg("_supervise")
        .arg("--root")
        .arg(root.display().to_string())
        .arg("--project-id")
        .arg(project_id)
        .arg("--job-id")
        .arg(&job_id)
        .arg("--timeout-secs")
        .arg(request.timeout_secs.to_string())
        .arg("--max-parallel")
        .arg(request.max_parallel.to_string())
        .arg("--zai-base-url")
        .arg(&request.zai_base_url)
        .arg("--zai-api-timeout-ms")
        .arg(&request.zai_api_timeout_ms)
        .env("GOLEM_API_KEY", &request.auth_token)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| GolemError::internal(format!("spawn detached supervisor: {e}")))?;

    dir.record_pid(child.id())
        .map_err(|e| GolemError::internal(format!("{e:#}")))?;
    Ok(dir)
}

/// Steps 3-7: wait for a slot, run the subprocess, parse its output, and
/// write the terminal status. Entered directly by [`run_job`] on the
/// caller's thread, and by the `_supervise` subcommand after it has done
/// its own process-group setup.
pub fn run_from_queued(root: &Path, dir: &JobDir, request: &RunRequest) -> Result<()> {
    let counter = SlotCounter::new(root);
    let cancelled = std::sync::atomic::AtomicBool::new(false);
    counter
        .wait_for_slot(request.max_parallel, &cancelled)
        .context("wait for slot")?;
    let mut guard = SlotGuard::new(&counter);

    dir.mark_running().context("mark job running")?;

    let input = EngineInput {
        prompt: &request.prompt,
        workdir: &request.workdir,
        permission_mode: &request.permission_mode,
        models: &request.models,
        zai_base_url: &request.zai_base_url,
        auth_token: &request.auth_token,
        zai_api_timeout_ms: &request.zai_api_timeout_ms,
        timeout_secs: request.timeout_secs,
    };

    let exec_result = engine::execute(&input, dir);

    let outcome = match exec_result {
        Ok(o) => o,
        Err(e) => {
            warn!(job_id = %dir.job_id, error = %e, "execution engine failed to run subprocess");
            let _ = dir.append_stderr_note(&format!("[GoLeM] {e:#}"));
            guard.release_now();
            dir.complete(JobStatus::Failed, None)?;
            return Ok(());
        }
    };

    if let Err(e) = parser::parse_and_write(dir) {
        warn!(job_id = %dir.job_id, error = %e, "failed to write parsed output files");
    }

    let status = if outcome.timed_out {
        let _ = dir.append_stderr_note(&format!(
            "[GoLeM] Job exceeded {}s timeout",
            request.timeout_secs
        ));
        JobStatus::Timeout
    } else {
        let stderr_content = atomic::read_string(&dir.stderr_path())
            .unwrap_or_default()
            .unwrap_or_default();
        engine::map_exit_code(outcome.exit_code, &stderr_content)
    };

    guard.release_now();
    dir.complete(status, outcome.exit_code)?;
    Ok(())
}

/// Entry point for the `_supervise` detached process: runs steps 3-7 with a
/// top-level recovery handler so an unexpected panic still leaves the job
/// `failed` rather than silently `running` forever. Process-group setup
/// happens later, in `engine::execute`'s `pre_exec` hook on the spawned
/// `claude` child itself.
pub fn supervise_entry(root: &Path, dir: &JobDir, request: &RunRequest) -> Result<()> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_from_queued(root, dir, request)));

    match result {
        Ok(inner) => inner,
        Err(_) => {
            warn!(job_id = %dir.job_id, "supervisor panicked; marking job failed");
            let _ = dir.append_stderr_note("[GoLeM] supervisor encountered an unexpected fault");
            // The slot was already released by SlotGuard's Drop during unwind,
            // if it had been claimed.
            dir.complete(JobStatus::Failed, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triplet() -> ModelTriplet {
        ModelTriplet {
            opus: "m".into(),
            sonnet: "m".into(),
            haiku: "m".into(),
        }
    }

    #[test]
    fn run_job_fails_fast_with_dependency_error_when_claude_missing() {
        let root = tempfile::tempdir().unwrap();
        let original = std::env::var_os("PATH");
        unsafe { std::env::set_var("PATH", "") };

        let request = RunRequest {
            workdir: std::env::temp_dir(),
            prompt: "hi".into(),
            permission_mode: "bypassPermissions".into(),
            models: triplet(),
            timeout_secs: 0,
            max_parallel: 1,
            zai_base_url: "https://example.test".into(),
            auth_token: "tok".into(),
            zai_api_timeout_ms: "1000".into(),
        };

        let result = run_job(root.path(), "proj", &request);

        if let Some(p) = original {
            unsafe { std::env::set_var("PATH", p) };
        }

        let err = result.unwrap_err();
        assert_eq!(err.category, crate::error::Category::Dependency);
    }
}
