//! Typed error taxonomy for the LSP client (§7).
//!
//! Startup failures (`NotFound`/`Spawn`) are fatal to the instance;
//! `NotRunning` guards operations attempted outside the `Ready` state;
//! `Rpc` surfaces a protocol error object distinctly from `Timeout`
//! (retriable); `ServerExited` reports requests pending at process death.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`crate::LspClient`] operations.
#[derive(Debug, Error)]
pub enum LspError {
    /// The configured server executable could not be resolved on `PATH`.
    #[error("language server executable `{command}` not found")]
    NotFound {
        command: String,
        #[source]
        source: which::Error,
    },

    /// The server process could not be spawned or its pipes captured.
    #[error("failed to spawn language server `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An operation was attempted while no server was running.
    #[error("no language server is running")]
    NotRunning,

    /// The server replied to `method` with a JSON-RPC error object.
    #[error("language server returned error {code} for `{method}`: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },

    /// The request for `method` did not complete within its deadline.
    #[error("request `{method}` timed out after {timeout:?}")]
    Timeout {
        method: &'static str,
        timeout: Duration,
    },

    /// The server process exited with the request for `method` in flight.
    #[error("language server exited with request `{method}` pending")]
    ServerExited { method: &'static str },
}
