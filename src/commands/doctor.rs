//! `doctor` — dependency, writability, and reconciliation health check.

use crate::engine;
use crate::error::GolemError;
use crate::identity;
use crate::job::{JobDir, JobStatus};
use crate::reconcile;
use crate::schema::{DoctorData, Response};
use crate::slot::SlotCounter;

pub struct DoctorOpts {
    pub root: Option<String>,
    pub plain: bool,
}

pub fn execute(opts: DoctorOpts) -> Result<(), GolemError> {
    let root = identity::resolve_root(opts.root.as_deref());

    let claude_on_path = engine::check_dependency().is_ok();
    let root_writable = check_writable(&root);

    reconcile::reconcile_all(&root).map_err(|e| GolemError::internal(format!("{e:#}")))?;

    let observed_running = count_running(&root);
    let slot_counter = SlotCounter::new(&root)
        .peek()
        .map_err(|e| GolemError::internal(format!("{e:#}")))?;

    let data = DoctorData {
        claude_on_path,
        root_writable,
        slot_counter,
        observed_running,
        consistent: slot_counter == observed_running,
    };

    if opts.plain {
        println!(
            "claude_on_path={} root_writable={} slot_counter={} observed_running={} consistent={}",
            data.claude_on_path, data.root_writable, data.slot_counter, data.observed_running, data.consistent
        );
    } else {
        Response::new("doctor", data).print();
    }
    Ok(())
}

fn check_writable(root: &std::path::Path) -> bool {
    if std::fs::create_dir_all(root).is_err() {
        return false;
    }
    let probe = root.join(".golem-doctor-probe");
    let writable = std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);
    writable
}

fn count_running(root: &std::path::Path) -> u64 {
    let mut count = 0u64;
    let Ok(project_entries) = std::fs::read_dir(root) else {
        return 0;
    };
    for project_entry in project_entries.flatten() {
        let Ok(job_entries) = std::fs::read_dir(project_entry.path()) else {
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
            if dir.read_status().unwrap_or(JobStatus::Failed) == JobStatus::Running {
                count += 1;
            }
        }
    }
    count
}
