//! Language-server subprocess supervision.
//!
//! Spawning with piped stdio, stderr draining, and guaranteed teardown.
//! The protocol-level `shutdown`/`exit` exchange happens in `server.rs`
//! before [`stop`] runs; this module only deals in process lifetimes.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::error::LspError;
use crate::types::ServerConfig;

/// Spawn the configured server with piped stdin/stdout/stderr.
///
/// The command is resolved against PATH; absolute paths pass through
/// unchanged. `kill_on_drop` backstops teardown if the client is dropped
/// without `stop_server`.
pub(crate) fn spawn_server(
    config: &ServerConfig,
) -> Result<(Child, ChildStdin, ChildStdout, ChildStderr), LspError> {
    let resolved = which::which(&config.command).map_err(|source| LspError::NotFound {
        command: config.command.clone(),
        source,
    })?;

    let mut child = Command::new(&resolved)
        .args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LspError::Spawn {
            command: config.command.clone(),
            source,
        })?;

    let stdin = child.stdin.take().ok_or_else(|| pipe_error(config, "stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| pipe_error(config, "stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| pipe_error(config, "stderr"))?;

    Ok((child, stdin, stdout, stderr))
}

fn pipe_error(config: &ServerConfig, pipe: &str) -> LspError {
    LspError::Spawn {
        command: config.command.clone(),
        source: std::io::Error::other(format!("child {pipe} not captured")),
    }
}

/// Drain stderr into the log so a chatty server cannot block on a full
/// pipe.
pub(crate) async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(stream = "stderr", "{line}");
    }
}

/// Ensure the child is gone: wait up to `graceful` for natural exit, then
/// terminate, wait `terminate_wait`, then force-kill.
///
/// Idempotent, and the process is dead one way or another on return. The
/// escalation is logged, never surfaced to the caller.
pub(crate) async fn stop(child: &mut Child, graceful: Duration, terminate_wait: Duration) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }

    if tokio::time::timeout(graceful, child.wait()).await.is_ok() {
        return;
    }

    tracing::warn!("language server did not exit within {graceful:?}, terminating");
    terminate(child);

    if tokio::time::timeout(terminate_wait, child.wait())
        .await
        .is_err()
    {
        tracing::warn!("language server ignored terminate, killing");
        if let Err(e) = child.kill().await {
            tracing::warn!("failed to kill language server: {e}");
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        // SIGTERM first; SIGKILL follows if the bound elapses.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &Child) {
    // No TERM equivalent; stop() escalates straight to kill.
    let _ = child;
}
