//! `log` — print one artifact file verbatim without deleting the job.

use crate::error::GolemError;
use crate::identity;
use crate::job::JobDir;
use crate::schema::{LogData, Response};

pub struct LogOpts {
    pub root: Option<String>,
    pub workdir: Option<String>,
    pub job_id: String,
    pub stream: String,
    pub plain: bool,
}

pub fn execute(opts: LogOpts) -> Result<(), GolemError> {
    let root = identity::resolve_root(opts.root.as_deref());
    let workdir = match &opts.workdir {
        Some(w) => std::path::PathBuf::from(w),
        None => std::env::current_dir().map_err(|e| GolemError::internal(format!("{e}")))?,
    };
    let project_id = identity::resolve_project_id(&workdir);

    let path = identity::find_job_dir(&root, &project_id, &opts.job_id)
        .map_err(|e| GolemError::not_found(e.to_string()))?;
    let dir = JobDir::from_path(path, &opts.job_id);

    let file_path = match opts.stream.as_str() {
        "stdout" => dir.stdout_path(),
        "stderr" => dir.stderr_path(),
        "raw" => dir.raw_json_path(),
        "changelog" => dir.changelog_path(),
        "usage" => dir.usage_path(),
        other => {
            return Err(GolemError::user(format!(
                "unrecognized stream `{other}`; expected one of stdout, stderr, raw, changelog, usage"
            )))
        }
    };

    let content = crate::atomic::read_string(&file_path)
        .map_err(|e| GolemError::internal(format!("{e}")))?
        .unwrap_or_default();

    let data = LogData {
        job_id: opts.job_id,
        stream: opts.stream,
        content,
    };

    if opts.plain {
        println!("{}", data.content);
    } else {
        Response::new("log", data).print();
    }
    Ok(())
}
