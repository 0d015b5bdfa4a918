//! Process liveness probing and process-group termination.
//!
//! Every job is spawned as the leader of its own process group (`setpgid`)
//! so that killing it also kills anything it forked — a `claude` CLI
//! invocation and its tool subprocesses. Signalling a process group is done
//! by sending to the negative of the PID.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

const GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Probe whether `pid` names a live process, via `kill(pid, 0)`. This sends
/// no signal; it only checks permission and existence.
pub fn is_alive(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }
    // EPERM means the process exists but we lack permission to signal it,
    // which still counts as alive.
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Put the calling process into its own new process group. Must be called
/// from the child side of a fork, i.e. from a `pre_exec` hook, so that the
/// group exists before `exec` replaces the process image.
///
/// # Safety
/// Only safe to call between `fork` and `exec`, per `Command::pre_exec`'s
/// contract: async-signal-safe operations only.
pub unsafe fn set_own_process_group() -> std::io::Result<()> {
    if unsafe { libc::setpgid(0, 0) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Terminate the process group led by `pgid`: send `SIGTERM`, wait up to one
/// second, then escalate to `SIGKILL` if anything in the group is still
/// alive. `pgid` is the leader's PID (a process group is signalled by
/// sending to its negation).
pub fn terminate_process_group(pgid: u32) {
    send_to_group(pgid, libc::SIGTERM);
    thread::sleep(GRACE_PERIOD);
    if is_alive(pgid) {
        debug!(pgid, "process survived SIGTERM; escalating to SIGKILL");
        send_to_group(pgid, libc::SIGKILL);
    }
}

fn send_to_group(pgid: u32, signal: libc::c_int) {
    let rc = unsafe { libc::kill(-(pgid as libc::pid_t), signal) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid, signal, error = %err, "failed to signal process group");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn arbitrary_huge_pid_is_not_alive() {
        assert!(!is_alive(0x7fff_fffe));
    }
}
