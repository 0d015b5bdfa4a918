//! Thin CLI adapters over the core subsystems. Each module exposes an
//! `Opts` struct and an `execute()` function, mirroring the teacher's
//! command-module shape.

pub mod chain;
pub mod clean;
pub mod config;
pub mod cost;
pub mod doctor;
pub mod kill;
pub mod list;
pub mod log;
pub mod result;
pub mod session;
pub mod status;
pub mod supervise;
pub mod tail;

use crate::job::JobDir;
use crate::schema::JobRecord;

/// Build the full JSON record for a job from its on-disk files.
pub fn job_record(dir: &JobDir, project_id: &str) -> anyhow::Result<JobRecord> {
    let status = dir.read_status()?;
    Ok(JobRecord {
        job_id: dir.job_id.clone(),
        project_id: project_id.to_string(),
        status: status.as_str().to_string(),
        pid: dir.read_pid()?,
        started_at: dir.read_started_at()?,
        finished_at: dir.read_finished_at()?,
        exit_code: dir.read_exit_code()?,
    })
}
