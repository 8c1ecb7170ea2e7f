//! Transport and request broker for a running language server.
//!
//! [`Transport`] owns the reader/writer tasks and the pending-request
//! map; [`RunningServer`] couples a transport to the child process and
//! the set of open documents. The facade in `client.rs` drives both.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::codec::{FrameReader, FrameWriter};
use crate::error::LspError;
use crate::process;
use crate::protocol::{self, RpcError};
use crate::router::NotificationRouter;
use crate::types::{ServerConfig, ServerStopReason, Timeouts};

const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Bound on joining the I/O tasks during shutdown. The reader normally
/// exits on EOF once the process is gone; the abort is a backstop.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

/// What a pending request resolves to.
#[derive(Debug)]
enum ServerReply {
    Result(serde_json::Value),
    Error(RpcError),
    /// Transport teardown; the response will never arrive.
    Exited,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<ServerReply>>>>;

enum IncomingFrame {
    Response {
        id: u64,
        result: serde_json::Value,
        error: Option<RpcError>,
    },
    ServerRequest {
        id: serde_json::Value,
        method: String,
    },
    Notification {
        method: String,
        params: Option<serde_json::Value>,
    },
}

/// Classify an incoming frame by shape: an `id` plus `result`/`error` is
/// a response, an `id` plus `method` a server-initiated request, a bare
/// `method` a notification. A method name alone never resolves a pending
/// request, even if it matches one in flight.
fn parse_incoming(mut frame: serde_json::Value) -> Option<IncomingFrame> {
    let obj = frame.as_object_mut()?;
    let method = obj
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from);
    let id = obj.remove("id");
    let has_result_or_error = obj.contains_key("result") || obj.contains_key("error");

    match (id, method, has_result_or_error) {
        (Some(id_val), None, true) => Some(IncomingFrame::Response {
            id: id_val.as_u64()?,
            error: obj
                .remove("error")
                .and_then(|e| serde_json::from_value(e).ok()),
            result: obj.remove("result").unwrap_or(serde_json::Value::Null),
        }),
        (Some(id_val), Some(method), _) => Some(IncomingFrame::ServerRequest {
            id: id_val,
            method,
        }),
        (None, Some(method), _) => Some(IncomingFrame::Notification {
            method,
            params: obj.remove("params"),
        }),
        _ => None,
    }
}

/// Request broker bound to one server's stdio.
///
/// Concurrent callers share the id counter and the pending map; a single
/// writer task serializes frames onto stdin so partial frames never
/// interleave, and a single reader task is the sole consumer of stdout.
#[derive(Debug)]
pub(crate) struct Transport {
    writer_tx: mpsc::Sender<WriterCommand>,
    next_id: Arc<AtomicU64>,
    pending: PendingMap,
    reader_handle: tokio::task::JoinHandle<()>,
    writer_handle: tokio::task::JoinHandle<()>,
}

impl Transport {
    /// Spawn the reader and writer tasks over the given streams.
    ///
    /// `next_id` is shared with the owning client so request ids stay
    /// unique across server restarts within one client instance.
    pub fn spawn<R, W>(
        stdout: R,
        stdin: W,
        router: NotificationRouter,
        next_id: Arc<AtomicU64>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("LSP write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_writer_tx = writer_tx.clone();
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        dispatch_frame(frame, &reader_pending, &router, &reader_writer_tx).await;
                    }
                    Ok(None) => {
                        tracing::info!("language server closed stdout");
                        router.server_stopped(ServerStopReason::Exited);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("LSP reader error: {e}");
                        router.server_stopped(ServerStopReason::Failed(e.to_string()));
                        break;
                    }
                }
            }
            // Requests still pending will never get a response; fail them
            // now instead of letting each wait out its own deadline.
            fail_pending(&reader_pending).await;
        });

        Self {
            writer_tx,
            next_id,
            pending,
            reader_handle,
            writer_handle,
        }
    }

    /// Send a request and await its response, up to `timeout`.
    pub async fn send_request(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, LspError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = protocol::request_frame(id, method, params);
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            // Writer gone: don't leak the pending entry.
            self.pending.lock().await.remove(&id);
            return Err(LspError::NotRunning);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(ServerReply::Result(result))) => Ok(result),
            Ok(Ok(ServerReply::Error(e))) => Err(LspError::Rpc {
                method,
                code: e.code,
                message: e.message,
            }),
            Ok(Ok(ServerReply::Exited)) => Err(LspError::ServerExited { method }),
            Ok(Err(_)) => {
                // Sender dropped without a reply; the reader is gone.
                self.pending.lock().await.remove(&id);
                Err(LspError::ServerExited { method })
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                tracing::debug!(method, ?timeout, "request timed out");
                Err(LspError::Timeout { method, timeout })
            }
        }
    }

    /// Send a notification: no id, no awaited response.
    pub async fn send_notification(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<(), LspError> {
        let frame = protocol::notification_frame(method, params);
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| LspError::NotRunning)
    }

    /// Stop the writer task and join both I/O tasks deterministically.
    pub async fn shutdown(mut self) {
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        if tokio::time::timeout(JOIN_TIMEOUT, &mut self.reader_handle)
            .await
            .is_err()
        {
            self.reader_handle.abort();
            let _ = self.reader_handle.await;
        }
        if tokio::time::timeout(JOIN_TIMEOUT, &mut self.writer_handle)
            .await
            .is_err()
        {
            self.writer_handle.abort();
            let _ = self.writer_handle.await;
        }

        // Backstop: if the reader was aborted mid-dispatch, entries may
        // remain.
        fail_pending(&self.pending).await;
    }
}

async fn dispatch_frame(
    frame: serde_json::Value,
    pending: &Mutex<HashMap<u64, oneshot::Sender<ServerReply>>>,
    router: &NotificationRouter,
    writer_tx: &mpsc::Sender<WriterCommand>,
) {
    let Some(incoming) = parse_incoming(frame) else {
        tracing::trace!("ignoring malformed JSON-RPC frame");
        return;
    };

    match incoming {
        IncomingFrame::Response { id, result, error } => {
            let sender = pending.lock().await.remove(&id);
            let Some(tx) = sender else {
                // Already timed out, or a duplicate; late responses are
                // dropped.
                tracing::debug!(id, "response with no pending request");
                return;
            };
            let reply = match error {
                Some(e) => ServerReply::Error(e),
                None => ServerReply::Result(result),
            };
            let _ = tx.send(reply);
        }
        IncomingFrame::ServerRequest { id, method } => {
            // Servers send client/registerCapability, workspace/configuration,
            // etc. and may block until they get an answer.
            tracing::debug!(%method, "replying method-not-found to server request");
            let response = serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": -32601,
                    "message": format!("Method not found: {method}")
                }
            });
            let _ = writer_tx.send(WriterCommand::Send(response)).await;
        }
        IncomingFrame::Notification { method, params } => {
            router.dispatch(&method, params);
        }
    }
}

async fn fail_pending(pending: &Mutex<HashMap<u64, oneshot::Sender<ServerReply>>>) {
    for (_, tx) in pending.lock().await.drain() {
        let _ = tx.send(ServerReply::Exited);
    }
}

/// A live language server: child process, transport, open documents.
#[derive(Debug)]
pub(crate) struct RunningServer {
    child: Child,
    transport: Transport,
    stderr_handle: tokio::task::JoinHandle<()>,
    /// URIs we've sent `didOpen` for.
    open_docs: HashSet<String>,
}

impl RunningServer {
    /// Spawn the process, start the I/O tasks, and run the initialize
    /// handshake. The server is ready for requests on return.
    pub async fn start(
        config: &ServerConfig,
        timeouts: &Timeouts,
        router: NotificationRouter,
        next_id: Arc<AtomicU64>,
    ) -> Result<Self, LspError> {
        let (child, stdin, stdout, stderr) = process::spawn_server(config)?;
        let stderr_handle = tokio::spawn(process::log_stderr(stderr));
        let transport = Transport::spawn(stdout, stdin, router, next_id);

        let server = Self {
            child,
            transport,
            stderr_handle,
            open_docs: HashSet::new(),
        };
        initialize_handshake(&server.transport, timeouts).await?;
        Ok(server)
    }

    pub async fn request(
        &self,
        method: &'static str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, LspError> {
        self.transport.send_request(method, Some(params), timeout).await
    }

    /// `didOpen` at version 1. Re-opening an open document closes it
    /// first so the server replaces its copy wholesale; this client never
    /// sends incremental `didChange` updates.
    pub async fn open_document(
        &mut self,
        uri: &str,
        content: &str,
        language_id: &str,
    ) -> Result<(), LspError> {
        if !self.open_docs.insert(uri.to_string()) {
            self.transport
                .send_notification("textDocument/didClose", Some(protocol::did_close_params(uri)))
                .await?;
        }
        self.transport
            .send_notification(
                "textDocument/didOpen",
                Some(protocol::did_open_params(uri, language_id, content)),
            )
            .await
    }

    pub async fn close_document(&mut self, uri: &str) -> Result<(), LspError> {
        self.open_docs.remove(uri);
        self.transport
            .send_notification("textDocument/didClose", Some(protocol::did_close_params(uri)))
            .await
    }

    /// Protocol-level shutdown, then process teardown, then task join.
    /// Never fails: the process is guaranteed gone on return.
    pub async fn stop(mut self, timeouts: &Timeouts) {
        if let Err(e) = self
            .transport
            .send_request("shutdown", None, timeouts.shutdown_request)
            .await
        {
            tracing::debug!("shutdown request failed: {e}");
        }
        let _ = self.transport.send_notification("exit", None).await;

        process::stop(
            &mut self.child,
            timeouts.graceful_exit,
            timeouts.terminate_wait,
        )
        .await;
        self.transport.shutdown().await;
        self.stderr_handle.abort();
    }
}

/// Exactly one `initialize` request, then exactly one `initialized`
/// notification, in that order, before the server is handed out.
async fn initialize_handshake(transport: &Transport, timeouts: &Timeouts) -> Result<(), LspError> {
    transport
        .send_request(
            "initialize",
            Some(protocol::initialize_params()),
            timeouts.initialize,
        )
        .await?;
    transport
        .send_notification("initialized", Some(serde_json::json!({})))
        .await
}
