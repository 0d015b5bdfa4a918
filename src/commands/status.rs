//! `status` — read a single job's status via the lightweight freshness
//! probe (never the full reconciliation scan).

use crate::error::GolemError;
use crate::identity;
use crate::job::JobDir;
use crate::reconcile;
use crate::schema::Response;

pub struct StatusOpts {
    pub root: Option<String>,
    pub workdir: Option<String>,
    pub job_id: String,
    pub plain: bool,
}

pub fn execute(opts: StatusOpts) -> Result<(), GolemError> {
    let root = identity::resolve_root(opts.root.as_deref());
    let workdir = match &opts.workdir {
        Some(w) => std::path::PathBuf::from(w),
        None => std::env::current_dir().map_err(|e| GolemError::internal(format!("{e}")))?,
    };
    let project_id = identity::resolve_project_id(&workdir);

    let path = identity::find_job_dir(&root, &project_id, &opts.job_id)
        .map_err(|e| GolemError::not_found(e.to_string()))?;
    let dir = JobDir::from_path(path, &opts.job_id);

    reconcile::reconcile_job(&dir).map_err(|e| GolemError::internal(format!("{e:#}")))?;
    let record = super::job_record(&dir, &project_id).map_err(|e| GolemError::internal(format!("{e:#}")))?;

    if opts.plain {
        println!("{} {}", record.job_id, record.status);
    } else {
        Response::new("job", record).print();
    }
    Ok(())
}
