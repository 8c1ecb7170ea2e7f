//! LSP client for driving an external language server over stdio.
//!
//! JSON-RPC 2.0 with `Content-Length` framing, a request broker with
//! per-operation deadlines, and supervised process lifecycle. The editor
//! UI consumes [`LspClient`]'s operations, supplying document text and
//! zero-based positions, and drains [`LspEvent`]s for diagnostics.

pub mod codec;
pub mod types;
pub mod uri;

pub(crate) mod process;
pub(crate) mod protocol;
pub(crate) mod router;
pub(crate) mod server;

mod client;
mod error;

pub use client::LspClient;
pub use error::LspError;
pub use types::{
    DiagnosticSeverity, LspEvent, MessageLevel, PyxisDiagnostic, ServerConfig, ServerStopReason,
    Timeouts,
};
