//! The job state machine and on-disk job directory.
//!
//! A job directory is either fully absent or contains at least a `status`
//! file; everything else in this module treats a malformed or missing
//! `status` file as `failed`, never as an error, because the filesystem is
//! the ground truth and must stay queryable even after abrupt termination.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::atomic;

/// The closed set of job statuses. Any other literal read from disk is
/// treated as [`JobStatus::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
    Timeout,
    Killed,
    PermissionError,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
            JobStatus::Killed => "killed",
            JobStatus::PermissionError => "permission_error",
        }
    }

    /// Parse a status literal. Returns `None` for anything outside the
    /// closed set — callers decide how to handle that (the state-machine
    /// reader maps it to `Failed`; `list` reports `unknown`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            "timeout" => Some(JobStatus::Timeout),
            "killed" => Some(JobStatus::Killed),
            "permission_error" => Some(JobStatus::PermissionError),
            _ => None,
        }
    }

    /// A terminal status never transitions to anything else.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

/// Handle to a job's directory and the one-file-per-attribute layout
/// described in `spec.md` §6.
#[derive(Debug, Clone)]
pub struct JobDir {
    pub path: PathBuf,
    pub job_id: String,
}

/// The three model slots a job's `claude` invocation is configured with.
#[derive(Debug, Clone)]
pub struct ModelTriplet {
    pub opus: String,
    pub sonnet: String,
    pub haiku: String,
}

impl ModelTriplet {
    pub fn render(&self) -> String {
        format!("opus={} sonnet={} haiku={}", self.opus, self.sonnet, self.haiku)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let mut opus = None;
        let mut sonnet = None;
        let mut haiku = None;
        for field in s.split_whitespace() {
            let (key, value) = field.split_once('=')?;
            match key {
                "opus" => opus = Some(value.to_string()),
                "sonnet" => sonnet = Some(value.to_string()),
                "haiku" => haiku = Some(value.to_string()),
                _ => {}
            }
        }
        Some(ModelTriplet {
            opus: opus?,
            sonnet: sonnet?,
            haiku: haiku?,
        })
    }
}

impl JobDir {
    pub fn at(root: &Path, project_id: &str, job_id: &str) -> Self {
        JobDir {
            path: root.join(project_id).join(job_id),
            job_id: job_id.to_string(),
        }
    }

    pub fn from_path(path: PathBuf, job_id: &str) -> Self {
        JobDir {
            path,
            job_id: job_id.to_string(),
        }
    }

    pub fn status_path(&self) -> PathBuf {
        self.path.join("status")
    }
    pub fn pid_path(&self) -> PathBuf {
        self.path.join("pid.txt")
    }
    pub fn prompt_path(&self) -> PathBuf {
        self.path.join("prompt.txt")
    }
    pub fn workdir_path(&self) -> PathBuf {
        self.path.join("workdir.txt")
    }
    pub fn permission_mode_path(&self) -> PathBuf {
        self.path.join("permission_mode.txt")
    }
    pub fn model_path(&self) -> PathBuf {
        self.path.join("model.txt")
    }
    pub fn started_at_path(&self) -> PathBuf {
        self.path.join("started_at.txt")
    }
    pub fn finished_at_path(&self) -> PathBuf {
        self.path.join("finished_at.txt")
    }
    pub fn raw_json_path(&self) -> PathBuf {
        self.path.join("raw.json")
    }
    pub fn stdout_path(&self) -> PathBuf {
        self.path.join("stdout.txt")
    }
    pub fn stderr_path(&self) -> PathBuf {
        self.path.join("stderr.txt")
    }
    pub fn changelog_path(&self) -> PathBuf {
        self.path.join("changelog.txt")
    }
    pub fn exit_code_path(&self) -> PathBuf {
        self.path.join("exit_code.txt")
    }
    pub fn usage_path(&self) -> PathBuf {
        self.path.join("usage.json")
    }

    /// *Create* phase: allocate the directory and write `status=queued`,
    /// `prompt.txt`, `workdir.txt`, `permission_mode.txt`, `model.txt`.
    pub fn create(
        root: &Path,
        project_id: &str,
        job_id: &str,
        prompt: &str,
        workdir: &Path,
        permission_mode: &str,
        models: &ModelTriplet,
    ) -> Result<Self> {
        let dir = JobDir::at(root, project_id, job_id);
        std::fs::create_dir_all(&dir.path)
            .with_context(|| format!("create job directory {}", dir.path.display()))?;

        atomic::write_atomic(&dir.prompt_path(), prompt.as_bytes())?;
        atomic::write_atomic(
            &dir.workdir_path(),
            workdir.display().to_string().as_bytes(),
        )?;
        atomic::write_atomic(&dir.permission_mode_path(), permission_mode.as_bytes())?;
        atomic::write_atomic(&dir.model_path(), models.render().as_bytes())?;
        dir.write_status(JobStatus::Queued)?;

        Ok(dir)
    }

    /// First half of the *Start* phase: write `pid.txt` with the PID of the
    /// process supervising this job's execution. Must happen before this
    /// job ID is published to any external caller, and before the slot wait
    /// — the runner calls this while the job is still `queued`. Once
    /// written, `pid.txt` is never rewritten.
    pub fn record_pid(&self, pid: u32) -> Result<()> {
        atomic::write_atomic(&self.pid_path(), pid.to_string().as_bytes())
            .with_context(|| format!("record supervisor pid for job {}", self.job_id))
    }

    /// Second half of the *Start* phase, run once a slot has been claimed:
    /// write `started_at.txt`, then `status=running`.
    pub fn mark_running(&self) -> Result<()> {
        atomic::write_atomic(
            &self.started_at_path(),
            crate::timefmt::now_rfc3339().as_bytes(),
        )?;
        self.write_status(JobStatus::Running)?;
        Ok(())
    }

    /// Convenience wrapper running both halves of the *Start* phase
    /// back-to-back, for callers that don't need the slot wait in between.
    pub fn start(&self, pid: u32) -> Result<()> {
        self.record_pid(pid)?;
        self.mark_running()
    }

    /// *Complete* phase: the caller has already written `raw.json` and run
    /// the output parser; this writes the remaining bookkeeping files.
    pub fn complete(&self, status: JobStatus, exit_code: Option<i32>) -> Result<()> {
        atomic::write_atomic(
            &self.finished_at_path(),
            crate::timefmt::now_rfc3339().as_bytes(),
        )?;
        if let Some(code) = exit_code {
            if code != 0 {
                atomic::write_atomic(&self.exit_code_path(), code.to_string().as_bytes())?;
            }
        }
        self.write_status(status)?;
        Ok(())
    }

    /// *Destroy* phase: recursive remove of the job directory.
    pub fn destroy(&self) -> Result<()> {
        atomic::remove_tree(&self.path)
            .with_context(|| format!("remove job directory {}", self.path.display()))
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Read the job's status. An absent `status` file, or content matching
    /// none of the seven enum literals, is reported as `Failed` with a
    /// logged warning — it never surfaces as an error.
    pub fn read_status(&self) -> Result<JobStatus> {
        match atomic::read_string(&self.status_path())? {
            Some(raw) => match JobStatus::parse(&raw) {
                Some(status) => Ok(status),
                None => {
                    warn!(job_id = %self.job_id, raw = %raw, "malformed status file; treating as failed");
                    Ok(JobStatus::Failed)
                }
            },
            None => {
                warn!(job_id = %self.job_id, "status file missing; treating as failed");
                Ok(JobStatus::Failed)
            }
        }
    }

    /// Write the job's status atomically. Callers are responsible for
    /// ordering slot operations correctly around this call.
    pub fn write_status(&self, status: JobStatus) -> Result<()> {
        atomic::write_atomic(&self.status_path(), status.as_str().as_bytes())
            .with_context(|| format!("write status for job {}", self.job_id))
    }

    pub fn read_pid(&self) -> Result<Option<u32>> {
        Ok(atomic::read_string(&self.pid_path())?.and_then(|s| s.parse().ok()))
    }

    pub fn read_prompt(&self) -> Result<String> {
        Ok(atomic::read_string(&self.prompt_path())?.unwrap_or_default())
    }

    pub fn read_workdir(&self) -> Result<Option<PathBuf>> {
        Ok(atomic::read_string(&self.workdir_path())?.map(PathBuf::from))
    }

    pub fn read_permission_mode(&self) -> Result<Option<String>> {
        Ok(atomic::read_string(&self.permission_mode_path())?)
    }

    pub fn read_models(&self) -> Result<Option<ModelTriplet>> {
        Ok(atomic::read_string(&self.model_path())?.and_then(|s| ModelTriplet::parse(&s)))
    }

    pub fn read_started_at(&self) -> Result<Option<String>> {
        Ok(atomic::read_string(&self.started_at_path())?)
    }

    pub fn read_finished_at(&self) -> Result<Option<String>> {
        Ok(atomic::read_string(&self.finished_at_path())?)
    }

    pub fn read_exit_code(&self) -> Result<Option<i32>> {
        Ok(atomic::read_string(&self.exit_code_path())?.and_then(|s| s.parse().ok()))
    }

    pub fn append_stderr_note(&self, line: &str) -> Result<()> {
        let mut existing = atomic::read(&self.stderr_path())?.unwrap_or_default();
        if !existing.is_empty() && !existing.ends_with(b"\n") {
            existing.push(b'\n');
        }
        existing.extend_from_slice(line.as_bytes());
        existing.push(b'\n');
        Ok(atomic::write_atomic(&self.stderr_path(), &existing)?)
    }

    /// Read the last `tail_lines` lines (0 = all) of `filename`, truncated
    /// from the end to at most `max_bytes` first.
    pub fn tail(&self, filename: &str, tail_lines: u64, max_bytes: u64) -> String {
        let path = self.path.join(filename);
        let Ok(Some(data)) = atomic::read(&path) else {
            return String::new();
        };

        let start = if data.len() as u64 > max_bytes {
            (data.len() as u64 - max_bytes) as usize
        } else {
            0
        };
        let text = String::from_utf8_lossy(&data[start..]);

        if tail_lines == 0 {
            return text.into_owned();
        }
        let lines: Vec<&str> = text.lines().collect();
        let skip = lines.len().saturating_sub(tail_lines as usize);
        lines[skip..].join("\n")
    }
}
