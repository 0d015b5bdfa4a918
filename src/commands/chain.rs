//! `chain` — run an ordered list of prompts as separate jobs, one after
//! another, each waiting for the previous step's terminal status.

use std::path::PathBuf;

use crate::config;
use crate::error::GolemError;
use crate::identity;
use crate::job::{JobStatus, ModelTriplet};
use crate::reconcile;
use crate::runner::{self, RunRequest};
use crate::schema::{ChainData, Response};

pub struct ChainOpts {
    pub root: Option<String>,
    pub workdir: Option<String>,
    pub timeout: u64,
    pub model: Option<String>,
    pub permission_mode: Option<String>,
    pub max_parallel: Option<u64>,
    pub steps: Vec<String>,
    pub steps_file: Option<String>,
    pub independent_workdirs: bool,
    pub continue_on_error: bool,
    pub plain: bool,
}

pub fn execute(opts: ChainOpts) -> Result<(), GolemError> {
    super::session::validate_timeout(opts.timeout)?;

    let prompts = resolve_steps(&opts)?;
    if prompts.is_empty() {
        return Err(GolemError::user("chain requires at least one step"));
    }

    let base_workdir = match &opts.workdir {
        Some(w) => PathBuf::from(w),
        None => std::env::current_dir().map_err(|e| GolemError::internal(format!("{e}")))?,
    };

    let overrides = config::Overrides {
        model: opts.model.clone(),
        permission_mode: opts.permission_mode.clone(),
        max_parallel: opts.max_parallel,
        ..Default::default()
    };
    let cfg = config::load(&overrides)?;

    let root = identity::resolve_root(opts.root.as_deref());
    let project_id = identity::resolve_project_id(&base_workdir);

    reconcile::reconcile_all(&root).map_err(|e| GolemError::internal(format!("{e:#}")))?;

    let mut steps = Vec::new();
    let mut aborted = false;

    for prompt in prompts {
        let step_workdir = if opts.independent_workdirs {
            std::env::temp_dir().join(format!("golem-chain-{}", crate::identity::generate_job_id()))
        } else {
            base_workdir.clone()
        };
        if opts.independent_workdirs {
            std::fs::create_dir_all(&step_workdir).map_err(|e| GolemError::internal(format!("{e}")))?;
        }

        let request = RunRequest {
            workdir: step_workdir,
            prompt,
            permission_mode: cfg.permission_mode.clone(),
            models: ModelTriplet {
                opus: cfg.opus_model.clone(),
                sonnet: cfg.sonnet_model.clone(),
                haiku: cfg.haiku_model.clone(),
            },
            timeout_secs: opts.timeout,
            max_parallel: cfg.max_parallel,
            zai_base_url: cfg.zai_base_url.clone(),
            auth_token: cfg.auth_token.clone(),
            zai_api_timeout_ms: cfg.zai_api_timeout_ms.clone(),
        };

        let dir = runner::run_job(&root, &project_id, &request)?;
        let record = super::job_record(&dir, &project_id).map_err(|e| GolemError::internal(format!("{e:#}")))?;
        let status = JobStatus::parse(&record.status);
        steps.push(record);

        if status != Some(JobStatus::Done) && !opts.continue_on_error {
            aborted = true;
            break;
        }
    }

    let data = ChainData { steps, aborted };

    if opts.plain {
        for step in &data.steps {
            println!("{} {}", step.job_id, step.status);
        }
        if data.aborted {
            println!("aborted");
        }
    } else {
        Response::new("chain", data).print();
    }
    Ok(())
}

fn resolve_steps(opts: &ChainOpts) -> Result<Vec<String>, GolemError> {
    if let Some(path) = &opts.steps_file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GolemError::user(format!("failed to read steps file {path}: {e}")))?;
        return Ok(text.lines().map(str::to_string).filter(|l| !l.trim().is_empty()).collect());
    }
    Ok(opts.steps.clone())
}
