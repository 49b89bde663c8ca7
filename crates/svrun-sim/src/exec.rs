//! Bounded subprocess execution
//!
//! Simulator toolchains occasionally hang (an unconstrained testbench, a
//! license daemon stall), so every invocation runs in its own process group
//! under an optional wall-clock bound. On expiry the whole group receives
//! SIGKILL, which also takes down any child processes the toolchain forked,
//! and the outcome is reported as timed out regardless of partial output.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Captured result of a completed subprocess
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of a bounded invocation
#[derive(Debug)]
pub enum Bounded {
    Completed(CapturedOutput),
    TimedOut { limit: Duration, pid: Option<u32> },
}

/// Spawn `cmd` in its own process group and wait for it, bounded by `limit`
/// when given. The caller gets captured stdout/stderr on completion; on
/// timeout the process group is forcibly terminated and reaped.
pub async fn run_bounded(mut cmd: Command, limit: Option<Duration>) -> std::io::Result<Bounded> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    let pid = child.id();
    let wait = child.wait_with_output();

    let output = match limit {
        None => wait.await?,
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(output) => output?,
            Err(_) => {
                // The dropped child handle already got SIGKILL via
                // kill_on_drop; the group signal reaches grandchildren.
                kill_process_group(pid);
                return Ok(Bounded::TimedOut { limit, pid });
            }
        },
    };

    Ok(Bounded::Completed(CapturedOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }))
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => tracing::debug!(pid, "killed simulator process group"),
        // ESRCH means the group already exited between timeout and signal
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, "failed to kill simulator process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
