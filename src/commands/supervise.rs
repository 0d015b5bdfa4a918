//! `_supervise` — hidden entry point for the detached process spawned by
//! `session --async`. Reconstructs the run request from the job directory
//! and the flags its parent passed, then runs steps 3-7.

use crate::config;
use crate::error::GolemError;
use crate::job::JobDir;
use crate::runner::{self, RunRequest};

pub struct SuperviseOpts {
    pub root: String,
    pub project_id: String,
    pub job_id: String,
    pub timeout_secs: u64,
    pub max_parallel: u64,
    pub zai_base_url: String,
    pub zai_api_timeout_ms: String,
}

pub fn execute(opts: SuperviseOpts) -> Result<(), GolemError> {
    let root = std::path::PathBuf::from(&opts.root);
    let dir = JobDir::at(&root, &opts.project_id, &opts.job_id);

    let prompt = dir.read_prompt().map_err(|e| GolemError::internal(format!("{e:#}")))?;
    let workdir = dir
        .read_workdir()
        .map_err(|e| GolemError::internal(format!("{e:#}")))?
        .ok_or_else(|| GolemError::internal("job directory is missing workdir.txt"))?;
    let permission_mode = dir
        .read_permission_mode()
        .map_err(|e| GolemError::internal(format!("{e:#}")))?
        .ok_or_else(|| GolemError::internal("job directory is missing permission_mode.txt"))?;
    let models = dir
        .read_models()
        .map_err(|e| GolemError::internal(format!("{e:#}")))?
        .ok_or_else(|| GolemError::internal("job directory is missing model.txt"))?;

    let auth_token = std::env::var("GOLEM_API_KEY")
        .ok()
        .or_else(|| config::load(&config::Overrides::default()).ok().map(|c| c.auth_token))
        .unwrap_or_default();

    let request = RunRequest {
        workdir,
        prompt,
        permission_mode,
        models,
        timeout_secs: opts.timeout_secs,
        max_parallel: opts.max_parallel,
        zai_base_url: opts.zai_base_url,
        auth_token,
        zai_api_timeout_ms: opts.zai_api_timeout_ms,
    };

    runner::supervise_entry(&root, &dir, &request).map_err(|e| GolemError::internal(format!("{e:#}")))
}
