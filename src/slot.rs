//! The cross-host slot counter: a single integer file mutated only while
//! holding an exclusive lock on a sibling lock file.
//!
//! The primary lock mechanism is a POSIX advisory file lock on an open file
//! descriptor (`fs2::FileExt`). If that fails — an unsupported filesystem or
//! platform, most often a network mount that silently ignores `flock` — we
//! fall back to a mkdir-based critical section: creating the lock directory
//! is the atomic step, and a lock directory whose mtime is older than 60
//! seconds is considered abandoned and may be removed by the next acquirer.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::{debug, warn};

use crate::atomic;

const STALE_LOCK_SECS: u64 = 60;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct SlotCounter {
    counter_path: PathBuf,
    lock_path: PathBuf,
    mkdir_lock_path: PathBuf,
}

enum LockGuard {
    Advisory(std::fs::File),
    Mkdir(PathBuf),
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match self {
            LockGuard::Advisory(file) => {
                let _ = FileExt::unlock(file);
            }
            LockGuard::Mkdir(path) => {
                let _ = std::fs::remove_dir(path);
            }
        }
    }
}

impl SlotCounter {
    pub fn new(root: &Path) -> Self {
        SlotCounter {
            counter_path: root.join(".running_count"),
            lock_path: root.join(".counter.lock"),
            mkdir_lock_path: root.join(".counter.lock.d"),
        }
    }

    fn acquire(&self) -> Result<LockGuard> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("create subagent root {}", parent.display())
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)
            .with_context(|| format!("open lock file {}", self.lock_path.display()))?;

        match FileExt::lock_exclusive(&file) {
            Ok(()) => Ok(LockGuard::Advisory(file)),
            Err(e) => {
                debug!(LOCK_FALLBACK = true, error = %e, "advisory lock unavailable; using mkdir fallback");
                Ok(LockGuard::Mkdir(self.acquire_mkdir_lock()?))
            }
        }
    }

    fn acquire_mkdir_lock(&self) -> Result<PathBuf> {
        loop {
            match std::fs::create_dir(&self.mkdir_lock_path) {
                Ok(()) => return Ok(self.mkdir_lock_path.clone()),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if let Ok(meta) = std::fs::metadata(&self.mkdir_lock_path)
                        && let Ok(modified) = meta.modified()
                        && modified.elapsed().map(|d| d.as_secs() >= STALE_LOCK_SECS).unwrap_or(false)
                    {
                        debug!("removing stale mkdir lock directory");
                        let _ = std::fs::remove_dir(&self.mkdir_lock_path);
                        continue;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(e).context("create mkdir lock directory"),
            }
        }
    }

    fn read_counter_locked(&self) -> Result<u64> {
        match atomic::read_string(&self.counter_path)? {
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) if n >= 0 => Ok(n as u64),
                _ => {
                    warn!(raw = %raw, "slot counter file is not a non-negative integer; treating as 0");
                    Ok(0)
                }
            },
            None => Ok(0),
        }
    }

    fn write_counter_locked(&self, value: u64) -> Result<()> {
        atomic::write_atomic(&self.counter_path, value.to_string().as_bytes())
            .context("write slot counter")
    }

    /// Read the counter without taking the lock. Safe because updates go
    /// through atomic rename: a racing reader sees the prior or the next
    /// value, never a torn integer.
    pub fn peek(&self) -> Result<u64> {
        self.read_counter_locked()
    }

    /// Increment the counter by one and return the new value.
    pub fn claim_slot(&self) -> Result<u64> {
        let _guard = self.acquire()?;
        let next = self.read_counter_locked()? + 1;
        self.write_counter_locked(next)?;
        Ok(next)
    }

    /// Decrement the counter by one, clamped at 0, and return the new value.
    pub fn release_slot(&self) -> Result<u64> {
        let _guard = self.acquire()?;
        let current = self.read_counter_locked()?;
        let next = current.saturating_sub(1);
        self.write_counter_locked(next)?;
        Ok(next)
    }

    /// Rewrite the counter to an observed value, used by the reconciler to
    /// reset it to the count of truly-running jobs.
    pub fn reset_to(&self, value: u64) -> Result<()> {
        let _guard = self.acquire()?;
        self.write_counter_locked(value)
    }

    /// Block until a slot is available (or `cap == 0`, meaning unlimited),
    /// then claim it. `cancelled` is polled between attempts; if it becomes
    /// true before a slot is claimed, returns `Ok(false)` without having
    /// incremented the counter.
    pub fn wait_for_slot(&self, cap: u64, cancelled: &AtomicBool) -> Result<bool> {
        loop {
            if cancelled.load(Ordering::Relaxed) {
                return Ok(false);
            }

            let claimed = {
                let _guard = self.acquire()?;
                let current = self.read_counter_locked()?;
                if cap == 0 || current < cap {
                    self.write_counter_locked(current + 1)?;
                    true
                } else {
                    false
                }
            };

            if claimed {
                return Ok(true);
            }

            sleep_interruptible(POLL_INTERVAL, cancelled);
        }
    }
}

/// Sleep for `duration`, checking `cancelled` every 100ms so a cancellation
/// request is observed promptly instead of only after the full interval.
fn sleep_interruptible(duration: Duration, cancelled: &AtomicBool) {
    let step = Duration::from_millis(100);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if cancelled.load(Ordering::Relaxed) {
            return;
        }
        let this_step = step.min(remaining);
        std::thread::sleep(this_step);
        remaining -= this_step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_then_release_restores_counter() {
        let dir = tempfile::tempdir().unwrap();
        let counter = SlotCounter::new(dir.path());
        assert_eq!(counter.peek().unwrap(), 0);
        assert_eq!(counter.claim_slot().unwrap(), 1);
        assert_eq!(counter.release_slot().unwrap(), 0);
    }

    #[test]
    fn release_never_goes_negative() {
        let dir = tempfile::tempdir().unwrap();
        let counter = SlotCounter::new(dir.path());
        atomic::write_atomic(dir.path().join(".running_count").as_path(), b"-2").unwrap();
        assert_eq!(counter.release_slot().unwrap(), 0);
    }

    #[test]
    fn missing_counter_file_is_treated_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let counter = SlotCounter::new(dir.path());
        assert_eq!(counter.peek().unwrap(), 0);
        counter.claim_slot().unwrap();
        assert_eq!(counter.peek().unwrap(), 1);
    }

    #[test]
    fn non_integer_counter_file_is_treated_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".running_count"), b"garbage").unwrap();
        let counter = SlotCounter::new(dir.path());
        assert_eq!(counter.peek().unwrap(), 0);
    }

    #[test]
    fn wait_for_slot_unlimited_cap_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let counter = SlotCounter::new(dir.path());
        for _ in 0..10 {
            counter.claim_slot().unwrap();
        }
        let cancelled = AtomicBool::new(false);
        assert!(counter.wait_for_slot(0, &cancelled).unwrap());
    }

    #[test]
    fn wait_for_slot_under_cap_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let counter = SlotCounter::new(dir.path());
        counter.claim_slot().unwrap();
        let cancelled = AtomicBool::new(false);
        assert!(counter.wait_for_slot(3, &cancelled).unwrap());
        assert_eq!(counter.peek().unwrap(), 2);
    }

    #[test]
    fn wait_for_slot_at_cap_blocks_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let counter = std::sync::Arc::new(SlotCounter::new(dir.path()));
        counter.claim_slot().unwrap(); // counter = 1, cap = 1 -> full

        let waiter_counter = std::sync::Arc::clone(&counter);
        let cancelled = std::sync::Arc::new(AtomicBool::new(false));
        let waiter_cancelled = std::sync::Arc::clone(&cancelled);
        let handle = std::thread::spawn(move || waiter_counter.wait_for_slot(1, &waiter_cancelled));

        std::thread::sleep(Duration::from_millis(200));
        counter.release_slot().unwrap();

        assert!(handle.join().unwrap().unwrap());
    }

    #[test]
    fn cancelling_wait_for_slot_does_not_claim() {
        let dir = tempfile::tempdir().unwrap();
        let counter = std::sync::Arc::new(SlotCounter::new(dir.path()));
        counter.claim_slot().unwrap(); // full at cap=1

        let waiter_counter = std::sync::Arc::clone(&counter);
        let cancelled = std::sync::Arc::new(AtomicBool::new(false));
        let waiter_cancelled = std::sync::Arc::clone(&cancelled);
        let handle = std::thread::spawn(move || waiter_counter.wait_for_slot(1, &waiter_cancelled));

        std::thread::sleep(Duration::from_millis(150));
        cancelled.store(true, Ordering::Relaxed);
        assert!(!handle.join().unwrap().unwrap());
        assert_eq!(counter.peek().unwrap(), 1);
    }
}
