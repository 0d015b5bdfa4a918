//! The execution engine: builds the `claude` subprocess's environment and
//! argument vector, spawns it as the leader of a fresh process group,
//! enforces the job's timeout, and captures its output.

use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::error::GolemError;
use crate::job::{JobDir, ModelTriplet};
use crate::signal;

const SYSTEM_PROMPT: &str = "You are GoLeM, a non-interactive coding subagent. Complete the task and report the result.";
const PERMISSION_PHRASES: [&str; 4] = ["permission", "not allowed", "denied", "unauthorized"];

pub struct EngineInput<'a> {
    pub prompt: &'a str,
    pub workdir: &'a Path,
    pub permission_mode: &'a str,
    pub models: &'a ModelTriplet,
    pub zai_base_url: &'a str,
    pub auth_token: &'a str,
    pub zai_api_timeout_ms: &'a str,
    pub timeout_secs: u64,
}

pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Verify the `claude` CLI is reachable on `PATH`. Called both by `session`
/// before spawning a job and by `doctor`.
pub fn check_dependency() -> Result<(), GolemError> {
    if find_on_path("claude").is_some() {
        Ok(())
    } else {
        Err(GolemError::dependency(
            "the `claude` CLI was not found on PATH; install it and ensure it is reachable",
        ))
    }
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(name);
        is_executable_file(&candidate).then_some(candidate)
    })
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn build_args(input: &EngineInput) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        "--no-session-persistence".to_string(),
        "--model".to_string(),
        "sonnet".to_string(),
        "--output-format".to_string(),
        "json".to_string(),
        "--append-system-prompt".to_string(),
        SYSTEM_PROMPT.to_string(),
    ];
    if input.permission_mode == "bypassPermissions" {
        args.push("--dangerously-skip-permissions".to_string());
    } else {
        args.push("--permission-mode".to_string());
        args.push(input.permission_mode.to_string());
    }
    args.push(input.prompt.to_string());
    args
}

fn build_command(input: &EngineInput) -> Command {
    let mut cmd = Command::new("claude");
    cmd.args(build_args(input));
    cmd.current_dir(input.workdir);
    cmd.env("ANTHROPIC_AUTH_TOKEN", input.auth_token);
    cmd.env("ANTHROPIC_BASE_URL", input.zai_base_url);
    cmd.env("API_TIMEOUT_MS", input.zai_api_timeout_ms);
    cmd.env("ANTHROPIC_DEFAULT_OPUS_MODEL", &input.models.opus);
    cmd.env("ANTHROPIC_DEFAULT_SONNET_MODEL", &input.models.sonnet);
    cmd.env("ANTHROPIC_DEFAULT_HAIKU_MODEL", &input.models.haiku);
    cmd.env_remove("CLAUDECODE");
    cmd.env_remove("CLAUDE_CODE_ENTRYPOINT");
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    // SAFETY: set_own_process_group only calls setpgid, which is
    // async-signal-safe, satisfying pre_exec's contract.
    unsafe {
        cmd.pre_exec(|| signal::set_own_process_group());
    }
    cmd
}

/// Run the job: spawn `claude`, stream its stdout to `raw.json` and stderr
/// to `stderr.txt`, and enforce `input.timeout_secs` (0 = no timeout).
///
/// The spawned `claude` child is made the leader of its own new process
/// group via a `pre_exec` hook, so the group ID equals the child's PID and
/// the whole job (including any tool subprocesses it forks) can be
/// terminated as one unit by signalling `-child_pid`.
pub fn execute(input: &EngineInput, dir: &JobDir) -> Result<ExecutionResult> {
    let mut cmd = build_command(input);
    let mut child = cmd.spawn().context("spawn claude subprocess")?;
    let pgid = child.id();
    info!(job_id = %dir.job_id, pid = pgid, "claude subprocess started");

    let stdout = child.stdout.take().expect("child stdout piped");
    let stderr = child.stderr.take().expect("child stderr piped");

    let raw_json_path = dir.raw_json_path();
    let stdout_thread = std::thread::spawn(move || drain_to_file(stdout, &raw_json_path));

    let stderr_path = dir.stderr_path();
    let stderr_thread = std::thread::spawn(move || drain_to_file(stderr, &stderr_path));

    let timed_out = Arc::new(AtomicBool::new(false));
    let child_done = Arc::new(AtomicBool::new(false));

    let watcher = if input.timeout_secs > 0 {
        let timed_out = Arc::clone(&timed_out);
        let child_done = Arc::clone(&child_done);
        let timeout = Duration::from_secs(input.timeout_secs);
        Some(std::thread::spawn(move || {
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                if child_done.load(Ordering::Relaxed) {
                    return;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            if !child_done.load(Ordering::Relaxed) {
                warn!(pid = pgid, "job exceeded its timeout; terminating process group");
                timed_out.store(true, Ordering::Relaxed);
                signal::terminate_process_group(pgid);
            }
        }))
    } else {
        None
    };

    let status = child.wait().context("wait for claude subprocess")?;
    child_done.store(true, Ordering::Relaxed);

    let _ = stdout_thread.join();
    let _ = stderr_thread.join();
    if let Some(w) = watcher {
        let _ = w.join();
    }

    debug!(job_id = %dir.job_id, code = ?status.code(), "claude subprocess finished");

    Ok(ExecutionResult {
        exit_code: status.code(),
        timed_out: timed_out.load(Ordering::Relaxed),
    })
}

fn drain_to_file<R: Read>(mut reader: R, path: &Path) {
    let Ok(mut file) = std::fs::File::create(path) else {
        return;
    };
    let _ = std::io::copy(&mut reader, &mut file);
}

/// Apply the exit-code-to-status mapping table from a completed run.
/// Permission-phrase matching on `stderr_content` is case-insensitive.
pub fn map_exit_code(exit_code: Option<i32>, stderr_content: &str) -> crate::job::JobStatus {
    use crate::job::JobStatus;

    match exit_code {
        Some(0) => JobStatus::Done,
        Some(124) => JobStatus::Timeout,
        Some(_) => {
            let lower = stderr_content.to_lowercase();
            if PERMISSION_PHRASES.iter().any(|p| lower.contains(p)) {
                JobStatus::PermissionError
            } else {
                JobStatus::Failed
            }
        }
        None => {
            let lower = stderr_content.to_lowercase();
            if PERMISSION_PHRASES.iter().any(|p| lower.contains(p)) {
                JobStatus::PermissionError
            } else {
                JobStatus::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    #[test]
    fn exit_zero_is_done() {
        assert_eq!(map_exit_code(Some(0), ""), JobStatus::Done);
    }

    #[test]
    fn exit_124_is_timeout() {
        assert_eq!(map_exit_code(Some(124), ""), JobStatus::Timeout);
    }

    #[test]
    fn nonzero_with_permission_phrase_is_permission_error() {
        assert_eq!(
            map_exit_code(Some(1), "Error: Permission denied for tool Bash"),
            JobStatus::PermissionError
        );
        assert_eq!(
            map_exit_code(Some(1), "operation not allowed"),
            JobStatus::PermissionError
        );
        assert_eq!(
            map_exit_code(Some(1), "UNAUTHORIZED"),
            JobStatus::PermissionError
        );
    }

    #[test]
    fn other_nonzero_is_failed() {
        assert_eq!(map_exit_code(Some(1), "some other error"), JobStatus::Failed);
        assert_eq!(map_exit_code(Some(137), "killed"), JobStatus::Failed);
    }

    #[test]
    fn args_use_skip_permissions_flag_for_bypass_mode() {
        let models = ModelTriplet {
            opus: "o".into(),
            sonnet: "s".into(),
            haiku: "h".into(),
        };
        let input = EngineInput {
            prompt: "do it",
            workdir: Path::new("/tmp"),
            permission_mode: "bypassPermissions",
            models: &models,
            zai_base_url: "https://example.test",
            auth_token: "tok",
            zai_api_timeout_ms: "1000",
            timeout_secs: 0,
        };
        let args = build_args(&input);
        assert!(args.contains(&"--dangerously-skip-permissions".to_string()));
        assert!(!args.contains(&"--permission-mode".to_string()));
        assert_eq!(args.last(), Some(&"do it".to_string()));
    }

    #[test]
    fn args_use_permission_mode_flag_otherwise() {
        let models = ModelTriplet {
            opus: "o".into(),
            sonnet: "s".into(),
            haiku: "h".into(),
        };
        let input = EngineInput {
            prompt: "do it",
            workdir: Path::new("/tmp"),
            permission_mode: "acceptEdits",
            models: &models,
            zai_base_url: "https://example.test",
            auth_token: "tok",
            zai_api_timeout_ms: "1000",
            timeout_secs: 0,
        };
        let args = build_args(&input);
        assert!(args.contains(&"--permission-mode".to_string()));
        assert!(args.contains(&"acceptEdits".to_string()));
    }

    #[test]
    fn dependency_check_fails_on_empty_path() {
        let original = std::env::var_os("PATH");
        // SAFETY: test runs single-threaded with respect to this env var
        // thanks to #[test] isolation per-process in practice; restored below.
        unsafe { std::env::set_var("PATH", "") };
        let result = check_dependency();
        if let Some(p) = original {
            unsafe { std::env::set_var("PATH", p) };
        }
        assert!(result.is_err());
    }
}
