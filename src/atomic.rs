//! Atomic, crash-safe filesystem primitives shared by every subsystem that
//! touches a job directory or the slot counter file.
//!
//! Subprocesses and concurrent readers may inspect the subagent root at any
//! moment, so every write here goes through a temp-file-plus-rename so a
//! reader never observes a torn write.

use std::io;
use std::path::Path;

/// Write `bytes` to `path` such that any concurrent reader sees either the
/// prior content (or absence) or the full new content, never a mixture.
///
/// Writes to a sibling temp file named `{path}.tmp.{pid}` first, then
/// renames it into place. The sibling name includes the current process ID
/// so that two processes racing to write the same path never collide on the
/// temp file itself.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let pid = std::process::id();
    let tmp_path = sibling_tmp_path(path, pid);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let write_once = |tmp_path: &Path| -> io::Result<()> {
        std::fs::write(tmp_path, bytes)?;
        std::fs::rename(tmp_path, path)
    };

    // A single retry absorbs transient I/O hiccups (e.g. EINTR-adjacent
    // failures on loaded hosts) without surfacing an avoidable `internal`
    // error for a write that would have succeeded a moment later.
    match write_once(&tmp_path) {
        Ok(()) => Ok(()),
        Err(_) => write_once(&tmp_path),
    }
}

fn sibling_tmp_path(path: &Path, pid: u32) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{file_name}.tmp.{pid}"))
}

/// Read the full contents of `path`. Absence is represented as `Ok(None)`,
/// never an error — callers that need "file must exist" semantics check
/// for `None` themselves.
pub fn read(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read `path` as a UTF-8 string, trimmed of surrounding whitespace.
/// Absence is `Ok(None)`.
pub fn read_string(path: &Path) -> io::Result<Option<String>> {
    Ok(read(path)?.map(|b| String::from_utf8_lossy(&b).trim().to_string()))
}

/// Recursively remove `path`. A missing path is a no-op, not an error.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status");
        write_atomic(&path, b"running").unwrap();
        assert_eq!(read(&path).unwrap(), Some(b"running".to_vec()));
    }

    #[test]
    fn read_absent_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing");
        assert_eq!(read(&path).unwrap(), None);
    }

    #[test]
    fn remove_tree_missing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-existed");
        assert!(remove_tree(&path).is_ok());
    }

    #[test]
    fn remove_tree_deletes_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("f"), b"x").unwrap();
        remove_tree(&dir.path().join("a")).unwrap();
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn concurrent_writers_never_produce_a_torn_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter");
        write_atomic(&path, b"0000000000").unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let path_a = path.clone();
        let barrier_a = Arc::clone(&barrier);
        let writer = thread::spawn(move || {
            barrier_a.wait();
            for _ in 0..50 {
                write_atomic(&path_a, b"1111111111").unwrap();
                write_atomic(&path_a, b"0000000000").unwrap();
            }
        });

        barrier.wait();
        for _ in 0..200 {
            if let Some(bytes) = read(&path).unwrap() {
                let s = String::from_utf8(bytes).unwrap();
                assert!(
                    s == "0000000000" || s == "1111111111",
                    "observed torn write: {s:?}"
                );
            }
        }
        writer.join().unwrap();
    }
}
