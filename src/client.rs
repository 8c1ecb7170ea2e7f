//! LspClient facade — the public API consumed by the editor.
//!
//! One instance per language-server process, explicitly owned by the
//! embedding application. To change the underlying executable (e.g. when
//! the user selects a different interpreter), stop this client and
//! construct a new one; there is no shared global to mutate.
//!
//! All positions are zero-based `(line, character)` pairs, matching the
//! protocol. UI-space one-based coordinates must be converted by the
//! caller.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::mpsc;

use crate::error::LspError;
use crate::protocol;
use crate::router::NotificationRouter;
use crate::server::RunningServer;
use crate::types::{LspEvent, ServerConfig, Timeouts};

/// Channel capacity for events pushed from the reader task.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Client for one language-server subprocess.
///
/// State-as-location: a running server is `Some`, a stopped one is
/// `None`. Request-style operations without a running server fail with
/// [`LspError::NotRunning`].
pub struct LspClient {
    config: ServerConfig,
    timeouts: Timeouts,
    /// Shared with the transport so ids stay unique for the lifetime of
    /// this instance, across restarts.
    next_id: Arc<AtomicU64>,
    event_tx: mpsc::Sender<LspEvent>,
    event_rx: Option<mpsc::Receiver<LspEvent>>,
    server: Option<RunningServer>,
}

impl LspClient {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            timeouts: Timeouts::default(),
            next_id: Arc::new(AtomicU64::new(1)),
            event_tx,
            event_rx: Some(event_rx),
            server: None,
        }
    }

    /// Override the default per-operation deadlines.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Take the event receiver (diagnostics, server log messages, stop
    /// notices). Yields `Some` exactly once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<LspEvent>> {
        self.event_rx.take()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }

    /// Spawn the server process, start the I/O tasks, and complete the
    /// `initialize`/`initialized` handshake. No-op when already running.
    ///
    /// Spawn failures are fatal: the caller should discard this client
    /// and construct a new one.
    pub async fn start_server(&mut self) -> Result<(), LspError> {
        if self.server.is_some() {
            tracing::debug!("start_server called while already running");
            return Ok(());
        }

        let router = NotificationRouter::new(self.event_tx.clone());
        let server = RunningServer::start(
            &self.config,
            &self.timeouts,
            router,
            self.next_id.clone(),
        )
        .await?;
        tracing::info!(command = %self.config.command, "language server started");
        self.server = Some(server);
        Ok(())
    }

    /// Protocol-level `shutdown`/`exit`, then process teardown, then a
    /// deterministic join of the I/O tasks.
    ///
    /// Idempotent and infallible: the client is stopped on return even if
    /// the server had to be killed.
    pub async fn stop_server(&mut self) {
        if let Some(server) = self.server.take() {
            server.stop(&self.timeouts).await;
            tracing::info!("language server stopped");
        }
    }

    /// `textDocument/didOpen` at version 1.
    pub async fn open_document(
        &mut self,
        uri: &str,
        content: &str,
        language_id: &str,
    ) -> Result<(), LspError> {
        let server = self.server.as_mut().ok_or(LspError::NotRunning)?;
        server.open_document(uri, content, language_id).await
    }

    /// `textDocument/didClose`.
    pub async fn close_document(&mut self, uri: &str) -> Result<(), LspError> {
        let server = self.server.as_mut().ok_or(LspError::NotRunning)?;
        server.close_document(uri).await
    }

    /// Completion items at a position. Bare-list and `{items: [...]}`
    /// response shapes both normalize to a list; null becomes empty.
    pub async fn get_completions(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Vec<serde_json::Value>, LspError> {
        let result = self
            .running()?
            .request(
                "textDocument/completion",
                protocol::position_params(uri, line, character),
                self.timeouts.completion,
            )
            .await?;
        Ok(protocol::completion_items(result))
    }

    /// Hover documentation, or `None` when the server has nothing to say.
    pub async fn get_hover_info(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Option<serde_json::Value>, LspError> {
        let result = self
            .running()?
            .request(
                "textDocument/hover",
                protocol::position_params(uri, line, character),
                self.timeouts.hover,
            )
            .await?;
        Ok(protocol::non_null(result))
    }

    /// Signature help, typically requested on `(` or `,`.
    pub async fn get_signature_help(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Option<serde_json::Value>, LspError> {
        let result = self
            .running()?
            .request(
                "textDocument/signatureHelp",
                protocol::position_params(uri, line, character),
                self.timeouts.signature_help,
            )
            .await?;
        Ok(protocol::non_null(result))
    }

    /// Declaration sites for the symbol at a position. A single-object
    /// response becomes a one-element list, null an empty one.
    pub async fn get_declaration(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Vec<serde_json::Value>, LspError> {
        let result = self
            .running()?
            .request(
                "textDocument/declaration",
                protocol::position_params(uri, line, character),
                self.timeouts.navigation,
            )
            .await?;
        Ok(protocol::Locations::parse(result).into_vec())
    }

    /// Definition sites for the symbol at a position, normalized like
    /// [`get_declaration`](Self::get_declaration).
    pub async fn get_definition(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Vec<serde_json::Value>, LspError> {
        let result = self
            .running()?
            .request(
                "textDocument/definition",
                protocol::position_params(uri, line, character),
                self.timeouts.navigation,
            )
            .await?;
        Ok(protocol::Locations::parse(result).into_vec())
    }

    /// All references to the symbol at a position.
    pub async fn get_references(
        &self,
        uri: &str,
        line: u32,
        character: u32,
        include_declaration: bool,
    ) -> Result<Vec<serde_json::Value>, LspError> {
        let result = self
            .running()?
            .request(
                "textDocument/references",
                protocol::references_params(uri, line, character, include_declaration),
                self.timeouts.navigation,
            )
            .await?;
        Ok(protocol::Locations::parse(result).into_vec())
    }

    /// The range of the symbol a rename would touch, or `None` when
    /// renaming is not possible there. Calling this before
    /// [`rename_symbol`](Self::rename_symbol) is the caller's convention;
    /// the client does not enforce the order.
    pub async fn prepare_rename(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Option<serde_json::Value>, LspError> {
        let result = self
            .running()?
            .request(
                "textDocument/prepareRename",
                protocol::position_params(uri, line, character),
                self.timeouts.rename,
            )
            .await?;
        Ok(protocol::non_null(result))
    }

    /// Rename the symbol at a position. Returns the WorkspaceEdit
    /// describing the changes, or `None` when the server declines.
    pub async fn rename_symbol(
        &self,
        uri: &str,
        line: u32,
        character: u32,
        new_name: &str,
    ) -> Result<Option<serde_json::Value>, LspError> {
        let result = self
            .running()?
            .request(
                "textDocument/rename",
                protocol::rename_params(uri, line, character, new_name),
                self.timeouts.rename,
            )
            .await?;
        Ok(protocol::non_null(result))
    }

    fn running(&self) -> Result<&RunningServer, LspError> {
        self.server.as_ref().ok_or(LspError::NotRunning)
    }
}
