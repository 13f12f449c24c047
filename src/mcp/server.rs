//! MCP JSON-RPC 2.0 server: reads requests from stdin, writes responses to stdout.
//!
//! The MCP protocol uses newline-delimited JSON over STDIO.
//! Tracing output goes to stderr so it doesn't interfere with the protocol.

use std::io::{self, BufRead, Write};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::tools;
use super::types::*;
use crate::backend::CrmBackend;

/// Name reported in `initialize`.
pub const SERVER_NAME: &str = "personal-crm";

/// Run the MCP server loop on stdin/stdout until stdin closes.
pub fn run(backend: &dyn CrmBackend) {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(backend, stdin.lock(), stdout.lock());
}

/// Serve requests from `input`, writing one response line per request.
pub fn serve<R: BufRead, W: Write>(backend: &dyn CrmBackend, input: R, mut output: W) {
    info!(backend = %backend.kind(), "MCP server starting");

    for line in input.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!(request = %trimmed, "received request");

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "invalid JSON-RPC request");
                let response =
                    JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e));
                write_response(&mut output, &response);
                continue;
            }
        };

        if let Some(response) = handle_request(backend, &request) {
            write_response(&mut output, &response);
        }
    }

    info!("MCP server shutting down");
}

/// Handle a single JSON-RPC request and return a response (or None for notifications).
fn handle_request(backend: &dyn CrmBackend, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    let id = request.id.clone();

    match request.method.as_str() {
        "initialize" => {
            info!("client initializing");
            let result = InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: ServerCapabilities {
                    tools: ToolCapability {},
                },
                server_info: ServerInfo {
                    name: SERVER_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
            };
            Some(JsonRpcResponse::success(id, result))
        }

        "notifications/initialized" => {
            info!("client initialized");
            None
        }

        "tools/list" => {
            debug!("listing tools");
            let result = ToolsListResult {
                tools: tools::list_tools(backend.kind()),
            };
            Some(JsonRpcResponse::success(id, result))
        }

        "tools/call" => {
            let params: ToolsCallParams = match serde_json::from_value(request.params.clone()) {
                Ok(p) => p,
                Err(e) => {
                    return Some(JsonRpcResponse::error(
                        id,
                        INVALID_PARAMS,
                        format!("Invalid params: {}", e),
                    ));
                }
            };

            debug!(tool = %params.name, "calling tool");
            let result = tools::call_tool(backend, &params.name, &params.arguments);
            Some(JsonRpcResponse::success(id, result))
        }

        "ping" => Some(JsonRpcResponse::success(
            id,
            Value::Object(Default::default()),
        )),

        // other notifications (cancelled, progress, ...) are ignored
        _ if request.is_notification() => {
            debug!(method = %request.method, "ignoring notification");
            None
        }

        _ => {
            warn!(method = %request.method, "unknown method");
            Some(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ))
        }
    }
}

/// Write a JSON-RPC response (newline-delimited).
fn write_response(output: &mut impl Write, response: &JsonRpcResponse) {
    let json = serde_json::to_string(response).unwrap_or_default();
    debug!(response = %json, "sending response");
    if let Err(e) = writeln!(output, "{}", json).and_then(|_| output.flush()) {
        error!(error = %e, "failed to write response");
    }
}
