//! Public types consumed by the embedding editor.
//!
//! The editor constructs a [`ServerConfig`], owns an [`LspClient`] built
//! from it, and drains [`LspEvent`]s for diagnostics and server status.
//!
//! [`LspClient`]: crate::LspClient

use std::time::Duration;

use serde::Deserialize;

fn default_command() -> String {
    "basedpyright-langserver".to_string()
}

fn default_args() -> Vec<String> {
    vec!["--stdio".to_string()]
}

/// Configuration for the language-server subprocess.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Executable: a PATH-resolved name or an absolute path (e.g. resolved
    /// from a chosen interpreter's install directory).
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments passed to the command.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
        }
    }
}

/// Per-operation deadlines. Values are policy, not protocol; callers tune
/// them via [`LspClient::with_timeouts`].
///
/// [`LspClient::with_timeouts`]: crate::LspClient::with_timeouts
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// The `initialize` handshake; servers may index on startup.
    pub initialize: Duration,
    pub completion: Duration,
    pub hover: Duration,
    pub signature_help: Duration,
    /// Definition, declaration, and references lookups.
    pub navigation: Duration,
    /// `prepareRename` and `rename`.
    pub rename: Duration,
    /// The protocol-level `shutdown` request during `stop_server`.
    pub shutdown_request: Duration,
    /// How long to wait for natural process exit before terminating.
    pub graceful_exit: Duration,
    /// How long to wait after terminate before force-killing.
    pub terminate_wait: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            initialize: Duration::from_secs(30),
            completion: Duration::from_secs(30),
            hover: Duration::from_secs(5),
            signature_help: Duration::from_secs(5),
            navigation: Duration::from_secs(10),
            rename: Duration::from_secs(10),
            shutdown_request: Duration::from_secs(2),
            graceful_exit: Duration::from_secs(5),
            terminate_wait: Duration::from_secs(2),
        }
    }
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info,
    /// 4=Hint). Returns `None` outside the defined range; boundary code
    /// decides the fallback.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// Level of a `window/logMessage` or `window/showMessage` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Error = 1,
    Warning = 2,
    Info = 3,
    Log = 4,
}

impl MessageLevel {
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Info),
            4 => Some(Self::Log),
            _ => None,
        }
    }
}

/// A single diagnostic published by the language server.
///
/// Fields are private; construction is restricted to the crate boundary.
/// Positions are zero-based, matching the protocol.
#[derive(Debug, Clone)]
pub struct PyxisDiagnostic {
    severity: DiagnosticSeverity,
    message: String,
    /// 0-indexed line number.
    line: u32,
    /// 0-indexed column.
    col: u32,
    /// Source of the diagnostic (e.g. "basedpyright").
    source: String,
}

impl PyxisDiagnostic {
    #[must_use]
    pub fn new(
        severity: DiagnosticSeverity,
        message: String,
        line: u32,
        col: u32,
        source: String,
    ) -> Self {
        Self {
            severity,
            message,
            line,
            col,
            source,
        }
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 0-indexed line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 0-indexed column.
    #[must_use]
    pub fn col(&self) -> u32 {
        self.col
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// An event emitted by the LSP subsystem on the facade's event channel.
#[derive(Debug)]
pub enum LspEvent {
    /// Diagnostics published for a document. An empty `items` list clears
    /// previously published diagnostics for the URI.
    Diagnostics {
        uri: String,
        items: Vec<PyxisDiagnostic>,
    },
    /// A `window/logMessage` or `window/showMessage` from the server.
    LogMessage {
        level: MessageLevel,
        message: String,
    },
    /// The read loop terminated: the server exited or the transport failed.
    ServerStopped { reason: ServerStopReason },
}

/// Why a server's read loop terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStopReason {
    /// Clean EOF on stdout.
    Exited,
    /// Transport failure.
    Failed(String),
}
