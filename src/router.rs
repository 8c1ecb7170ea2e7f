//! Routing for server-initiated, id-less messages.
//!
//! Diagnostics and log notifications do not belong to any pending
//! request; they become [`LspEvent`]s for the embedding application.
//! Unknown methods are dropped at trace level. Events are pushed with
//! `try_send` so a slow consumer can never stall the protocol reader.

use tokio::sync::mpsc;

use crate::protocol::{LogMessageParams, PublishDiagnosticsParams};
use crate::types::{LspEvent, MessageLevel, ServerStopReason};

pub(crate) struct NotificationRouter {
    event_tx: mpsc::Sender<LspEvent>,
}

impl NotificationRouter {
    pub fn new(event_tx: mpsc::Sender<LspEvent>) -> Self {
        Self { event_tx }
    }

    /// Dispatch one server notification by method name.
    pub fn dispatch(&self, method: &str, params: Option<serde_json::Value>) {
        match method {
            "textDocument/publishDiagnostics" => self.publish_diagnostics(params),
            "window/logMessage" | "window/showMessage" => self.log_message(method, params),
            _ => tracing::trace!(method, "ignoring server notification"),
        }
    }

    /// Reader-loop termination is reported through the same hook.
    pub fn server_stopped(&self, reason: ServerStopReason) {
        self.emit(LspEvent::ServerStopped { reason });
    }

    fn publish_diagnostics(&self, params: Option<serde_json::Value>) {
        let Some(params) = params else { return };
        match serde_json::from_value::<PublishDiagnosticsParams>(params) {
            Ok(diag_params) => {
                let items: Vec<_> = diag_params
                    .diagnostics
                    .iter()
                    .map(crate::protocol::LspDiagnostic::to_diagnostic)
                    .collect();
                tracing::debug!(uri = %diag_params.uri, count = items.len(), "diagnostics updated");
                self.emit(LspEvent::Diagnostics {
                    uri: diag_params.uri,
                    items,
                });
            }
            Err(e) => tracing::debug!("failed to parse publishDiagnostics: {e}"),
        }
    }

    fn log_message(&self, method: &str, params: Option<serde_json::Value>) {
        let Some(params) = params else { return };
        match serde_json::from_value::<LogMessageParams>(params) {
            Ok(log) => {
                let level = MessageLevel::from_lsp(log.kind).unwrap_or(MessageLevel::Log);
                match level {
                    MessageLevel::Error | MessageLevel::Warning => {
                        tracing::warn!(method, "server: {}", log.message);
                    }
                    MessageLevel::Info | MessageLevel::Log => {
                        tracing::debug!(method, "server: {}", log.message);
                    }
                }
                self.emit(LspEvent::LogMessage {
                    level,
                    message: log.message,
                });
            }
            Err(e) => tracing::trace!(method, "unparseable log notification: {e}"),
        }
    }

    fn emit(&self, event: LspEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::warn!("dropping LSP event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::DiagnosticSeverity;

    fn test_router() -> (NotificationRouter, mpsc::Receiver<LspEvent>) {
        let (event_tx, event_rx) = mpsc::channel(32);
        (NotificationRouter::new(event_tx), event_rx)
    }

    #[tokio::test]
    async fn test_publish_diagnostics_becomes_event() {
        let (router, mut event_rx) = test_router();

        router.dispatch(
            "textDocument/publishDiagnostics",
            Some(serde_json::json!({
                "uri": "file:///test.py",
                "diagnostics": [{
                    "range": { "start": { "line": 5, "character": 0 }, "end": { "line": 5, "character": 10 } },
                    "severity": 1,
                    "source": "basedpyright",
                    "message": "\"foo\" is not defined"
                }]
            })),
        );

        match event_rx.try_recv().unwrap() {
            LspEvent::Diagnostics { uri, items } => {
                assert_eq!(uri, "file:///test.py");
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].message(), "\"foo\" is not defined");
                assert!(items[0].severity().is_error());
            }
            other => panic!("expected Diagnostics event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_diagnostics_still_emitted() {
        // Servers clear diagnostics by publishing an empty array; the
        // event must pass through so the editor can clear its markers.
        let (router, mut event_rx) = test_router();

        router.dispatch(
            "textDocument/publishDiagnostics",
            Some(serde_json::json!({ "uri": "file:///test.py", "diagnostics": [] })),
        );

        match event_rx.try_recv().unwrap() {
            LspEvent::Diagnostics { items, .. } => assert!(items.is_empty()),
            other => panic!("expected Diagnostics event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_log_message_becomes_event() {
        let (router, mut event_rx) = test_router();

        router.dispatch(
            "window/logMessage",
            Some(serde_json::json!({"type": 1, "message": "out of memory"})),
        );

        match event_rx.try_recv().unwrap() {
            LspEvent::LogMessage { level, message } => {
                assert_eq!(level, MessageLevel::Error);
                assert_eq!(message, "out of memory");
            }
            other => panic!("expected LogMessage event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_notification_ignored() {
        let (router, mut event_rx) = test_router();
        router.dispatch(
            "$/progress",
            Some(serde_json::json!({"token": 1, "value": {}})),
        );
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_diagnostics_params_dropped() {
        let (router, mut event_rx) = test_router();
        router.dispatch(
            "textDocument/publishDiagnostics",
            Some(serde_json::json!({"nope": true})),
        );
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_params_dropped() {
        let (router, mut event_rx) = test_router();
        router.dispatch("textDocument/publishDiagnostics", None);
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_server_stopped_event() {
        let (router, mut event_rx) = test_router();
        router.server_stopped(ServerStopReason::Exited);
        match event_rx.try_recv().unwrap() {
            LspEvent::ServerStopped { reason } => assert_eq!(reason, ServerStopReason::Exited),
            other => panic!("expected ServerStopped event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_severity_falls_back_to_warning() {
        let (router, mut event_rx) = test_router();

        router.dispatch(
            "textDocument/publishDiagnostics",
            Some(serde_json::json!({
                "uri": "file:///test.py",
                "diagnostics": [{
                    "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } },
                    "severity": 7,
                    "message": "odd severity"
                }]
            })),
        );

        match event_rx.try_recv().unwrap() {
            LspEvent::Diagnostics { items, .. } => {
                assert_eq!(items[0].severity(), DiagnosticSeverity::Warning);
            }
            other => panic!("expected Diagnostics event, got {other:?}"),
        }
    }
}
