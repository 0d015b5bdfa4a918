//! `cost` — sum token usage across job directories.

use crate::error::GolemError;
use crate::identity;
use crate::job::JobDir;
use crate::parser::Usage;
use crate::schema::{CostData, Response};
use crate::timefmt;

pub struct CostOpts {
    pub root: Option<String>,
    pub project: Option<String>,
    pub since: Option<String>,
    pub plain: bool,
}

pub fn execute(opts: CostOpts) -> Result<(), GolemError> {
    let root = identity::resolve_root(opts.root.as_deref());

    let since_secs = opts
        .since
        .as_deref()
        .map(|s| {
            timefmt::parse_rfc3339(s)
                .ok_or_else(|| GolemError::user(format!("--since must be an RFC 3339 timestamp, got `{s}`")))
        })
        .transpose()?;

    let mut data = CostData {
        project_id: opts.project.clone(),
        since: opts.since.clone(),
        ..Default::default()
    };

    let project_dirs: Vec<std::path::PathBuf> = match &opts.project {
        Some(p) => vec![root.join(p)],
        None => std::fs::read_dir(&root)
            .map(|entries| entries.flatten().filter(|e| e.path().is_dir()).map(|e| e.path()).collect())
            .unwrap_or_default(),
    };

    for project_dir in &project_dirs {
        let Ok(job_entries) = std::fs::read_dir(project_dir) else {
            continue;
        };
        for job_entry in job_entries.flatten() {
            let job_path = job_entry.path();
            if !job_path.is_dir() {
                continue;
            }
            let job_id = job_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dir = JobDir::from_path(job_path, &job_id);

            if let Some(cutoff) = since_secs {
                let started = dir
                    .read_started_at()
                    .map_err(|e| GolemError::internal(format!("{e:#}")))?
                    .and_then(|s| timefmt::parse_rfc3339(&s));
                if started.is_none_or(|t| t < cutoff) {
                    continue;
                }
            }

            data.jobs_counted += 1;

            match crate::atomic::read(&dir.usage_path()).ok().flatten() {
                Some(bytes) => match serde_json::from_slice::<Usage>(&bytes) {
                    Ok(usage) => {
                        data.input_tokens += usage.input_tokens;
                        data.output_tokens += usage.output_tokens;
                        data.cache_creation_input_tokens += usage.cache_creation_input_tokens;
                        data.cache_read_input_tokens += usage.cache_read_input_tokens;
                    }
                    Err(_) => data.missing_usage += 1,
                },
                None => data.missing_usage += 1,
            }
        }
    }

    if opts.plain {
        println!(
            "jobs={} input={} output={} cache_creation={} cache_read={} missing_usage={}",
            data.jobs_counted,
            data.input_tokens,
            data.output_tokens,
            data.cache_creation_input_tokens,
            data.cache_read_input_tokens,
            data.missing_usage
        );
    } else {
        Response::new("cost", data).print();
    }
    Ok(())
}
