//! `clean` — reconcile, then remove old terminal job directories.

use std::time::{Duration, SystemTime};

use crate::error::GolemError;
use crate::identity;
use crate::job::{JobDir, JobStatus};
use crate::reconcile;
use crate::schema::{CleanData, Response};

const SECS_PER_DAY: u64 = 86_400;

pub struct CleanOpts {
    pub root: Option<String>,
    pub all: bool,
    pub days: u64,
    pub status: Vec<String>,
    pub plain: bool,
}

pub fn execute(opts: CleanOpts) -> Result<(), GolemError> {
    let root = identity::resolve_root(opts.root.as_deref());

    reconcile::reconcile_all(&root).map_err(|e| GolemError::internal(format!("{e:#}")))?;

    let mut removed = Vec::new();
    let mut scanned = 0u64;

    let Ok(project_entries) = std::fs::read_dir(&root) else {
        let data = CleanData { removed, scanned };
        print_result(&opts, data);
        return Ok(());
    };

    for project_entry in project_entries.flatten() {
        let project_path = project_entry.path();
        if !project_path.is_dir() {
            continue;
        }
        let Ok(job_entries) = std::fs::read_dir(&project_path) else {
            continue;
        };
        for job_entry in job_entries.flatten() {
            let job_path = job_entry.path();
            if !job_path.is_dir() {
                continue;
            }
            scanned += 1;

            let job_id = job_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dir = JobDir::from_path(job_path.clone(), &job_id);

            let status = dir.read_status().map_err(|e| GolemError::internal(format!("{e:#}")))?;
            if matches!(status, JobStatus::Queued | JobStatus::Running) {
                continue;
            }

            if !opts.status.is_empty() && !opts.status.contains(&status.as_str().to_string()) {
                continue;
            }

            if !opts.all && !is_strictly_older_than(&job_path, opts.days) {
                continue;
            }

            dir.destroy().map_err(|e| GolemError::internal(format!("{e:#}")))?;
            removed.push(job_id);
        }
    }

    let data = CleanData { removed, scanned };
    print_result(&opts, data);
    Ok(())
}

fn is_strictly_older_than(path: &std::path::Path, days: u64) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    let Ok(age) = SystemTime::now().duration_since(modified) else {
        return false;
    };
    age > Duration::from_secs(days * SECS_PER_DAY)
}

fn print_result(opts: &CleanOpts, data: CleanData) {
    if opts.plain {
        for job_id in &data.removed {
            println!("{job_id}");
        }
        println!("scanned {} removed {}", data.scanned, data.removed.len());
    } else {
        Response::new("clean", data).print();
    }
}
