//! Per-case session handle
//!
//! A [`Session`] owns the spawned backend process for the duration of one
//! test case. The process runs in its own process group so that helpers it
//! spawns (browsers, `adb` shells) are terminated with it. Dropping a session
//! that was not released kills the group and runs the backend's cleanup
//! command, so the next case always starts from a clean UI surface.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{HarnessResult, InfrastructureError};

/// Upper bound for the backend cleanup command
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

const CLEANUP_POLL: Duration = Duration::from_millis(20);

/// Handle to a running backend process
pub struct Session {
    id: String,
    child: Child,
    pgid: Option<i32>,
    cleanup: Vec<String>,
    grace: Duration,
    released: bool,
}

impl Session {
    pub fn new(id: impl Into<String>, child: Child, cleanup: Vec<String>, grace: Duration) -> Self {
        let pgid = child.id().map(|pid| pid as i32);
        Self {
            id: id.into(),
            child,
            pgid,
            cleanup,
            grace,
            released: false,
        }
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the process to exit on its own
    pub async fn wait(&mut self) -> HarnessResult<ExitStatus> {
        self.child.wait().await.map_err(|e| {
            InfrastructureError::Session {
                id: self.id.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Stop the process group: SIGTERM, then SIGKILL after the grace period
    pub async fn terminate(&mut self) {
        info!("Terminating `{}` (pid: {:?})", self.id, self.pgid);

        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            if self.signal_group(Signal::SIGTERM) {
                if let Ok(Ok(_)) = tokio::time::timeout(self.grace, self.child.wait()).await {
                    // Leader exited; sweep anything left in the group
                    self.signal_group(Signal::SIGKILL);
                    return;
                }
            }
            self.signal_group(Signal::SIGKILL);
        }

        // Force kill if still running
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }

    /// Finish the session: sweep leftover group members and run the
    /// backend cleanup so the next case starts on a released UI surface.
    pub async fn release(mut self) {
        self.released = true;

        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGKILL);

        run_cleanup(&self.id, &self.cleanup).await;
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> bool {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        match self.pgid {
            Some(pgid) => killpg(Pid::from_raw(pgid), signal).is_ok(),
            None => false,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        warn!("Session for `{}` dropped without release; killing process group", self.id);

        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGKILL);
        let _ = self.child.start_kill();

        run_cleanup_blocking(&self.id, &self.cleanup, CLEANUP_TIMEOUT);
    }
}

/// Cleanup from `Drop`, where nothing can be awaited. Polls the child so a
/// hung cleanup holds the thread for at most `timeout`.
fn run_cleanup_blocking(id: &str, cleanup: &[String], timeout: Duration) {
    let Some((program, args)) = cleanup.split_first() else {
        return;
    };

    let mut child = match std::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!("Cleanup for `{}` failed: {}", id, e);
            return;
        }
    };

    let deadline = std::time::Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return,
            Ok(Some(status)) => {
                warn!("Cleanup for `{}` exited with {}", id, status);
                return;
            }
            Ok(None) if std::time::Instant::now() >= deadline => {
                warn!("Cleanup for `{}` timed out after {:?}", id, timeout);
                let _ = child.kill();
                let _ = child.wait();
                return;
            }
            Ok(None) => std::thread::sleep(CLEANUP_POLL),
            Err(e) => {
                warn!("Cleanup for `{}` failed: {}", id, e);
                return;
            }
        }
    }
}

async fn run_cleanup(id: &str, cleanup: &[String]) {
    let Some((program, args)) = cleanup.split_first() else {
        return;
    };

    debug!("Running cleanup for `{}`: {} {:?}", id, program, args);

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(CLEANUP_TIMEOUT, status).await {
        Ok(Ok(status)) if status.success() => {}
        Ok(Ok(status)) => warn!("Cleanup for `{}` exited with {}", id, status),
        Ok(Err(e)) => warn!("Cleanup for `{}` failed: {}", id, e),
        Err(_) => warn!("Cleanup for `{}` timed out after {:?}", id, CLEANUP_TIMEOUT),
    }
}
