//! `tail` — print the tail of stdout/stderr, optionally following until
//! the job reaches a terminal status.

use std::time::Duration;

use crate::error::GolemError;
use crate::identity;
use crate::job::JobDir;
use crate::schema::{Response, TailData};

const MAX_BYTES: u64 = 65536;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct TailOpts {
    pub root: Option<String>,
    pub workdir: Option<String>,
    pub job_id: String,
    pub lines: u64,
    pub follow: bool,
    pub plain: bool,
}

pub fn execute(opts: TailOpts) -> Result<(), GolemError> {
    let root = identity::resolve_root(opts.root.as_deref());
    let workdir = match &opts.workdir {
        Some(w) => std::path::PathBuf::from(w),
        None => std::env::current_dir().map_err(|e| GolemError::internal(format!("{e}")))?,
    };
    let project_id = identity::resolve_project_id(&workdir);

    let path = identity::find_job_dir(&root, &project_id, &opts.job_id)
        .map_err(|e| GolemError::not_found(e.to_string()))?;
    let dir = JobDir::from_path(path, &opts.job_id);

    if opts.follow {
        loop {
            let status = dir.read_status().map_err(|e| GolemError::internal(format!("{e:#}")))?;
            if status.is_terminal() {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    print_tail(&dir, &opts)
}

fn print_tail(dir: &JobDir, opts: &TailOpts) -> Result<(), GolemError> {
    let status = dir.read_status().map_err(|e| GolemError::internal(format!("{e:#}")))?;
    let stdout_tail = dir.tail("stdout.txt", opts.lines, MAX_BYTES);
    let stderr_tail = dir.tail("stderr.txt", opts.lines, MAX_BYTES);

    let data = TailData {
        job_id: opts.job_id.clone(),
        status: status.as_str().to_string(),
        stdout_tail,
        stderr_tail,
    };

    if opts.plain {
        println!("{}", data.stdout_tail);
        if !data.stderr_tail.is_empty() {
            eprintln!("{}", data.stderr_tail);
        }
    } else {
        Response::new("tail", data).print();
    }
    Ok(())
}
