//! Job identity, subagent-root resolution, and job-directory layout.
//!
//! Resolution order for the subagent root:
//!   1. `--root` CLI flag
//!   2. `GOLEM_ROOT` environment variable
//!   3. `$XDG_DATA_HOME/golem`
//!   4. `~/.local/share/golem`

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use rand::RngCore;

use crate::crc::cksum_decimal;

/// Resolve the subagent root directory following the priority chain.
pub fn resolve_root(cli_root: Option<&str>) -> PathBuf {
    if let Some(root) = cli_root {
        return PathBuf::from(root);
    }

    if let Ok(root) = std::env::var("GOLEM_ROOT")
        && !root.is_empty()
    {
        return PathBuf::from(root);
    }

    if let Ok(xdg) = std::env::var("XDG_DATA_HOME")
        && !xdg.is_empty()
    {
        return PathBuf::from(xdg).join("golem");
    }

    if let Some(base_dirs) = BaseDirs::new() {
        #[cfg(windows)]
        let base = base_dirs.data_local_dir().to_path_buf();
        #[cfg(not(windows))]
        let base = base_dirs.home_dir().join(".local").join("share");
        return base.join("golem");
    }

    PathBuf::from("~/.local/share/golem")
}

/// Generate a job ID of the shape `job-YYYYMMDD-HHMMSS-XXXXXXXX`, where the
/// trailing field is 8 lowercase hex characters from 4 cryptographically
/// random bytes. Collisions within the same second are avoided by the
/// random suffix, not by retrying.
pub fn generate_job_id() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (year, month, day, hour, minute, second) = civil_from_epoch_seconds(now);

    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    let suffix = bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();

    format!(
        "job-{year:04}{month:02}{day:02}-{hour:02}{minute:02}{second:02}-{suffix}"
    )
}

fn civil_from_epoch_seconds(secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let ts = crate::timefmt::format_rfc3339(secs);
    // "YYYY-MM-DDTHH:MM:SSZ"
    let year: u64 = ts[0..4].parse().unwrap_or(1970);
    let month: u64 = ts[5..7].parse().unwrap_or(1);
    let day: u64 = ts[8..10].parse().unwrap_or(1);
    let hour: u64 = ts[11..13].parse().unwrap_or(0);
    let minute: u64 = ts[14..16].parse().unwrap_or(0);
    let second: u64 = ts[17..19].parse().unwrap_or(0);
    (year, month, day, hour, minute, second)
}

/// Find the Git working-copy root containing `workdir`, if any, by walking
/// up looking for a `.git` entry (directory or the `gitdir:` file used by
/// worktrees/submodules).
fn git_root(workdir: &Path) -> Option<PathBuf> {
    let mut current = workdir.to_path_buf();
    loop {
        if current.join(".git").exists() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Compute the project ID for `workdir`: `{basename}-{cksum_decimal}` where
/// `basename` is the last path segment of the Git working-copy root (or the
/// absolute `workdir` if it is not inside a Git repository), and
/// `cksum_decimal` is the POSIX-`cksum`-compatible CRC-32 of that path's
/// bytes, printed as a decimal integer.
pub fn resolve_project_id(workdir: &Path) -> String {
    let absolute = std::fs::canonicalize(workdir).unwrap_or_else(|_| workdir.to_path_buf());
    let project_root = git_root(&absolute).unwrap_or_else(|| absolute.clone());

    let basename = project_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| project_root.to_string_lossy().into_owned());

    let checksum = cksum_decimal(project_root.to_string_lossy().as_bytes());
    format!("{basename}-{checksum}")
}

/// Error returned by [`find_job_dir`] when no matching directory exists
/// under any layout.
#[derive(Debug)]
pub struct JobNotFound(pub String);

impl std::fmt::Display for JobNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "err:not_found job {} does not exist", self.0)
    }
}

impl std::error::Error for JobNotFound {}

/// Locate a job's directory under `root`, trying in order:
///   1. `root/current_project_id/job_id/` (current layout)
///   2. `root/job_id/` (legacy flat layout)
///   3. `root/*/job_id/` (any project, current layout)
pub fn find_job_dir(root: &Path, current_project_id: &str, job_id: &str) -> Result<PathBuf, JobNotFound> {
    let scoped = root.join(current_project_id).join(job_id);
    if scoped.is_dir() {
        return Ok(scoped);
    }

    let flat = root.join(job_id);
    if flat.is_dir() {
        return Ok(flat);
    }

    if let Ok(entries) = std::fs::read_dir(root) {
        for entry in entries.flatten() {
            let candidate = entry.path().join(job_id);
            if candidate.is_dir() {
                return Ok(candidate);
            }
        }
    }

    Err(JobNotFound(job_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_root_cli_flag_wins() {
        let root = resolve_root(Some("/tmp/golem-root"));
        assert_eq!(root, PathBuf::from("/tmp/golem-root"));
    }

    #[test]
    fn project_id_is_basename_dash_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let id = resolve_project_id(dir.path());
        let basename = dir.path().file_name().unwrap().to_string_lossy();
        assert!(id.starts_with(&*basename));
        assert!(id.contains('-'));
        let checksum_part = id.rsplit('-').next().unwrap();
        assert!(checksum_part.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn project_id_uses_git_root_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();

        let from_nested = resolve_project_id(&nested);
        let from_root = resolve_project_id(dir.path());
        assert_eq!(from_nested, from_root);
    }

    #[test]
    fn job_ids_are_unique_within_a_process() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_job_id()));
        }
    }

    #[test]
    fn job_id_matches_expected_shape() {
        let id = generate_job_id();
        assert!(id.starts_with("job-"));
        let rest = &id[4..];
        let parts: Vec<&str> = rest.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn find_job_dir_scoped_layout() {
        let root = tempfile::tempdir().unwrap();
        let job_dir = root.path().join("proj-123").join("job-x");
        std::fs::create_dir_all(&job_dir).unwrap();
        let found = find_job_dir(root.path(), "proj-123", "job-x").unwrap();
        assert_eq!(found, job_dir);
    }

    #[test]
    fn find_job_dir_legacy_flat_layout() {
        let root = tempfile::tempdir().unwrap();
        let job_dir = root.path().join("job-legacy");
        std::fs::create_dir_all(&job_dir).unwrap();
        let found = find_job_dir(root.path(), "proj-123", "job-legacy").unwrap();
        assert_eq!(found, job_dir);
    }

    #[test]
    fn find_job_dir_any_project_fallback() {
        let root = tempfile::tempdir().unwrap();
        let job_dir = root.path().join("other-proj").join("job-y");
        std::fs::create_dir_all(&job_dir).unwrap();
        let found = find_job_dir(root.path(), "proj-123", "job-y").unwrap();
        assert_eq!(found, job_dir);
    }

    #[test]
    fn find_job_dir_missing_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path()).unwrap();
        let err = find_job_dir(root.path(), "proj-123", "job-nope").unwrap_err();
        assert_eq!(err.0, "job-nope");
    }
}
