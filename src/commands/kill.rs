//! `kill` — invoke the signal propagator and mark the job killed.

use crate::error::GolemError;
use crate::identity;
use crate::job::{JobDir, JobStatus};
use crate::schema::{KillData, Response};
use crate::signal;

pub struct KillOpts {
    pub root: Option<String>,
    pub workdir: Option<String>,
    pub job_id: String,
    pub plain: bool,
}

pub fn execute(opts: KillOpts) -> Result<(), GolemError> {
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
    let final_status = if status.is_terminal() {
        status
    } else {
        if let Some(pid) = dir.read_pid().map_err(|e| GolemError::internal(format!("{e:#}")))? {
            signal::terminate_process_group(pid);
        }
        dir.write_status(JobStatus::Killed)
            .map_err(|e| GolemError::internal(format!("{e:#}")))?;
        JobStatus::Killed
    };

    let data = KillData {
        job_id: opts.job_id,
        status: final_status.as_str().to_string(),
    };

    if opts.plain {
        println!("{} {}", data.job_id, data.status);
    } else {
        Response::new("kill", data).print();
    }
    Ok(())
}
