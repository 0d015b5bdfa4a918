//! `list` — enumerate jobs under the resolved project (or all projects).

use crate::error::GolemError;
use crate::identity;
use crate::job::JobDir;
use crate::schema::{JobSummary, ListData, Response};

pub struct ListOpts {
    pub root: Option<String>,
    pub workdir: Option<String>,
    pub all_projects: bool,
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub plain: bool,
}

pub fn execute(opts: ListOpts) -> Result<(), GolemError> {
    let root = identity::resolve_root(opts.root.as_deref());
    let workdir = match &opts.workdir {
        Some(w) => std::path::PathBuf::from(w),
        None => std::env::current_dir().map_err(|e| GolemError::internal(format!("{e}")))?,
    };
    let project_id = identity::resolve_project_id(&workdir);

    let mut jobs = Vec::new();
    let project_dirs: Vec<std::path::PathBuf> = if opts.all_projects {
        std::fs::read_dir(&root)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().is_dir())
                    .map(|e| e.path())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        vec![root.join(&project_id)]
    };

    for project_dir in &project_dirs {
        let Ok(entries) = std::fs::read_dir(project_dir) else {
            continue;
        };
        let this_project_id = project_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for entry in entries.flatten() {
            let job_path = entry.path();
            if !job_path.is_dir() {
                continue;
            }
            let job_id = job_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dir = JobDir::from_path(job_path, &job_id);

            let status = match crate::atomic::read_string(&dir.status_path())
                .map_err(|e| GolemError::internal(format!("{e}")))?
            {
                Some(raw) => crate::job::JobStatus::parse(&raw)
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                None => "unknown".to_string(),
            };

            if let Some(filter) = &opts.status {
                if &status != filter {
                    continue;
                }
            }

            let started_at = dir.read_started_at().map_err(|e| GolemError::internal(format!("{e}")))?;

            jobs.push(JobSummary {
                job_id,
                project_id: this_project_id.clone(),
                status,
                started_at,
            });
        }
    }

    jobs.sort_by(|a, b| b.job_id.cmp(&a.job_id));

    let truncated = opts.limit.is_some_and(|limit| jobs.len() > limit);
    if let Some(limit) = opts.limit {
        jobs.truncate(limit);
    }

    let data = ListData {
        root: root.display().to_string(),
        jobs,
        truncated,
    };

    if opts.plain {
        for job in &data.jobs {
            println!("{} {} {}", job.job_id, job.project_id, job.status);
        }
    } else {
        Response::new("list", data).print();
    }

    Ok(())
}
