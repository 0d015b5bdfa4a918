//! `session` — create and run a job, synchronously or asynchronously.

use std::path::PathBuf;

use crate::config;
use crate::error::GolemError;
use crate::identity;
use crate::job::ModelTriplet;
use crate::reconcile;
use crate::runner::{self, RunRequest};
use crate::schema::{Response, SessionAsyncData};

pub struct SessionOpts {
    pub root: Option<String>,
    pub workdir: Option<String>,
    pub timeout: u64,
    pub model: Option<String>,
    pub opus_model: Option<String>,
    pub sonnet_model: Option<String>,
    pub haiku_model: Option<String>,
    pub permission_mode: Option<String>,
    pub max_parallel: Option<u64>,
    pub run_async: bool,
    pub prompt: Option<String>,
    pub prompt_file: Option<String>,
    pub plain: bool,
}

pub fn execute(opts: SessionOpts) -> Result<(), GolemError> {
    validate_timeout(opts.timeout)?;

    let prompt = resolve_prompt(&opts)?;

    let workdir = match &opts.workdir {
        Some(w) => PathBuf::from(w),
        None => std::env::current_dir().map_err(|e| GolemError::internal(format!("{e}")))?,
    };

    let overrides = config::Overrides {
        model: opts.model.clone(),
        opus_model: opts.opus_model.clone(),
        sonnet_model: opts.sonnet_model.clone(),
        haiku_model: opts.haiku_model.clone(),
        permission_mode: opts.permission_mode.clone(),
        max_parallel: opts.max_parallel,
        ..Default::default()
    };
    let cfg = config::load(&overrides)?;

    let root = identity::resolve_root(opts.root.as_deref());
    let project_id = identity::resolve_project_id(&workdir);

    reconcile::reconcile_all(&root).map_err(|e| GolemError::internal(format!("{e:#}")))?;

    let request = RunRequest {
        workdir,
        prompt,
        permission_mode: cfg.permission_mode,
        models: ModelTriplet {
            opus: cfg.opus_model,
            sonnet: cfg.sonnet_model,
            haiku: cfg.haiku_model,
        },
        timeout_secs: opts.timeout,
        max_parallel: cfg.max_parallel,
        zai_base_url: cfg.zai_base_url,
        auth_token: cfg.auth_token,
        zai_api_timeout_ms: cfg.zai_api_timeout_ms,
    };

    if opts.run_async {
        let dir = runner::start_job(&root, &project_id, &request)?;
        let data = SessionAsyncData {
            job_id: dir.job_id.clone(),
            status: "queued".to_string(),
        };
        if opts.plain {
            println!("{} queued", data.job_id);
        } else {
            Response::new("session_async", data).print();
        }
    } else {
        let dir = runner::run_job(&root, &project_id, &request)?;
        let record = super::job_record(&dir, &project_id).map_err(|e| GolemError::internal(format!("{e:#}")))?;
        if opts.plain {
            println!("{} {}", record.job_id, record.status);
        } else {
            Response::new("job", record).print();
        }
    }

    Ok(())
}

fn resolve_prompt(opts: &SessionOpts) -> Result<String, GolemError> {
    if let Some(p) = &opts.prompt {
        return Ok(p.clone());
    }
    if let Some(path) = &opts.prompt_file {
        return std::fs::read_to_string(path)
            .map_err(|e| GolemError::user(format!("failed to read prompt file {path}: {e}")));
    }
    Err(GolemError::user("either a PROMPT argument or --prompt-file is required"))
}

pub fn validate_timeout(timeout: u64) -> Result<(), GolemError> {
    if timeout == 0 {
        return Err(GolemError::user("--timeout must be positive"));
    }
    Ok(())
}
