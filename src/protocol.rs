//! JSON-RPC frame builders, LSP parameter builders, and response-shape
//! normalization.

use serde::Deserialize;

use crate::types::{DiagnosticSeverity, PyxisDiagnostic};

/// Build a request frame. `params` is omitted entirely when `None`, never
/// serialized as `null`.
pub(crate) fn request_frame(
    id: u64,
    method: &str,
    params: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut frame = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
    });
    if let Some(params) = params {
        frame["params"] = params;
    }
    frame
}

/// Build a notification frame: no id, no expected response.
pub(crate) fn notification_frame(
    method: &str,
    params: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut frame = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
    });
    if let Some(params) = params {
        frame["params"] = params;
    }
    frame
}

/// JSON-RPC error object carried by a response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

pub(crate) fn initialize_params() -> serde_json::Value {
    serde_json::json!({
        "processId": std::process::id(),
        "clientInfo": { "name": "pyxis", "version": env!("CARGO_PKG_VERSION") },
        "rootUri": null,
        "capabilities": {
            "textDocument": {
                "completion": {
                    "completionItem": {
                        "snippetSupport": true,
                        "documentationFormat": ["markdown", "plaintext"]
                    }
                },
                "hover": { "contentFormat": ["markdown", "plaintext"] },
                "references": { "dynamicRegistration": false },
                "declaration": { "dynamicRegistration": false, "linkSupport": true }
            }
        },
        "workspaceFolders": null
    })
}

/// `{textDocument, position}` params shared by the positional requests.
pub(crate) fn position_params(uri: &str, line: u32, character: u32) -> serde_json::Value {
    serde_json::json!({
        "textDocument": { "uri": uri },
        "position": { "line": line, "character": character }
    })
}

/// `didOpen` params. Version is always 1: this client re-opens documents
/// instead of incremental sync.
pub(crate) fn did_open_params(uri: &str, language_id: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": 1,
            "text": text
        }
    })
}

pub(crate) fn did_close_params(uri: &str) -> serde_json::Value {
    serde_json::json!({ "textDocument": { "uri": uri } })
}

pub(crate) fn references_params(
    uri: &str,
    line: u32,
    character: u32,
    include_declaration: bool,
) -> serde_json::Value {
    let mut params = position_params(uri, line, character);
    params["context"] = serde_json::json!({ "includeDeclaration": include_declaration });
    params
}

pub(crate) fn rename_params(
    uri: &str,
    line: u32,
    character: u32,
    new_name: &str,
) -> serde_json::Value {
    let mut params = position_params(uri, line, character);
    params["newName"] = serde_json::Value::String(new_name.to_string());
    params
}

/// Shape-normalized result of a location-style request.
///
/// Servers answer definition/declaration/references with a single
/// Location, a list of Locations (or LocationLinks), or null. Callers
/// always want a list, so the three shapes are made explicit here and
/// flattened exactly once, at the boundary.
#[derive(Debug, PartialEq)]
pub(crate) enum Locations {
    None,
    Single(serde_json::Value),
    Many(Vec<serde_json::Value>),
}

impl Locations {
    pub fn parse(result: serde_json::Value) -> Self {
        match result {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Array(items) => Self::Many(items),
            other => Self::Single(other),
        }
    }

    pub fn into_vec(self) -> Vec<serde_json::Value> {
        match self {
            Self::None => Vec::new(),
            Self::Single(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

/// Completion results arrive either as a bare item list or as a
/// CompletionList `{isIncomplete, items}`. Null and unknown shapes
/// normalize to empty.
pub(crate) fn completion_items(result: serde_json::Value) -> Vec<serde_json::Value> {
    match result {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("items") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Null results become `None`; anything else passes through.
pub(crate) fn non_null(result: serde_json::Value) -> Option<serde_json::Value> {
    match result {
        serde_json::Value::Null => None,
        other => Some(other),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<LspDiagnostic>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LspDiagnostic {
    pub range: LspRange,
    pub severity: Option<u64>,
    pub source: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LspRange {
    pub start: LspPosition,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LspPosition {
    pub line: u32,
    pub character: u32,
}

impl LspDiagnostic {
    pub fn to_diagnostic(&self) -> PyxisDiagnostic {
        PyxisDiagnostic::new(
            self.severity
                .and_then(DiagnosticSeverity::from_lsp)
                .unwrap_or(DiagnosticSeverity::Warning),
            self.message.clone(),
            self.range.start.line,
            self.range.start.character,
            self.source
                .clone()
                .unwrap_or_else(|| String::from("unknown")),
        )
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogMessageParams {
    #[serde(rename = "type")]
    pub kind: u64,
    pub message: String,
}
