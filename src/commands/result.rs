//! `result` — read-once-delete retrieval of a job's final output.

use crate::error::GolemError;
use crate::identity;
use crate::job::{JobDir, JobStatus};
use crate::schema::{Response, ResultData};

pub struct ResultOpts {
    pub root: Option<String>,
    pub workdir: Option<String>,
    pub job_id: String,
    pub keep: bool,
    pub plain: bool,
}

pub fn execute(opts: ResultOpts) -> Result<(), GolemError> {
    let root = identity::resolve_root(opts.root.as_deref());
    let workdir = match &opts.workdir {
        Some(w) => std::path::PathBuf::from(w),
        None => std::env::current_dir().map_err(|e| GolemError::internal(format!("{e}")))?,
    };
    let project_id = identity::resolve_project_id(&workdir);

    let path = identity::find_job_dir(&root, &project_id, &opts.job_id)
        .map_err(|e| GolemError::not_found(e.to_string()))?;
    let dir = JobDir::from_path(path, &opts.job_id);

    let status = dir.read_status().map_err(|e| GolemError::internal(format!("{e:#}")))?;
    if !status.is_terminal() {
        return Err(GolemError::user(format!(
            "job {} is still {}",
            opts.job_id,
            status.as_str()
        )));
    }

    let stdout = crate::atomic::read_string(&dir.stdout_path())
        .map_err(|e| GolemError::internal(format!("{e}")))?
        .unwrap_or_default();
    let changelog = crate::atomic::read_string(&dir.changelog_path())
        .map_err(|e| GolemError::internal(format!("{e}")))?
        .unwrap_or_default();
    let exit_code = dir.read_exit_code().map_err(|e| GolemError::internal(format!("{e:#}")))?;

    let mut stderr = String::new();
    if matches!(status, JobStatus::Failed | JobStatus::Timeout | JobStatus::PermissionError) {
        stderr = crate::atomic::read_string(&dir.stderr_path())
            .map_err(|e| GolemError::internal(format!("{e}")))?
            .unwrap_or_default();
        if !stderr.is_empty() {
            eprintln!("warning: {stderr}");
        }
    }

    let deleted = !opts.keep;
    if deleted {
        dir.destroy().map_err(|e| GolemError::internal(format!("{e:#}")))?;
    }

    let job_id = opts.job_id;
    let data = ResultData {
        job_id: job_id.clone(),
        status: status.as_str().to_string(),
        stdout,
        changelog,
        exit_code,
        deleted,
    };

    if opts.plain {
        println!("{}", data.stdout);
    } else {
        Response::new("result", data).print();
    }

    match status {
        JobStatus::Timeout => Err(GolemError::timeout(
            stderr_line(&stderr).unwrap_or_else(|| format!("job {job_id} exceeded its timeout")),
        )),
        JobStatus::PermissionError => Err(GolemError::user(format!(
            "job {job_id} was denied permission by the assistant"
        ))),
        JobStatus::Failed => Err(GolemError::internal(format!("job {job_id} failed"))),
        _ => Ok(()),
    }
}

/// Pull the `[GoLeM] ...` note line out of captured stderr, if present, so
/// the CLI-facing error message carries the same text the job directory
/// recorded (e.g. `"Job exceeded {T}s timeout"`).
fn stderr_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix("[GoLeM] "))
        .map(str::to_string)
}
