//! MCP over HTTP: one JSON-RPC message per `POST /mcp`.

pub mod protocol;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{bridge::ToolBridge, tools::Tool};
use protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ToolsListResult, INVALID_REQUEST, JSONRPC_VERSION,
    MCP_PROTOCOL_VERSION,
};

const INSTRUCTIONS: &str = "Searches the caller's Google Drive. Send X-Client-ID with every request; \
when a tool answers with status authentication_required, open authorization_url and retry once \
check_authentication_status reports authenticated.";

/// Dispatch one JSON-RPC message. Notifications get `None`.
pub async fn handle_message(
    bridge: &ToolBridge,
    client_id: Option<&str>,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let Some(id) = request.id.clone() else {
        debug!(method = %request.method, "MCP notification");
        return None;
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return Some(JsonRpcResponse::failure(
            id,
            JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        ));
    }

    let result = match request.method.as_str() {
        "initialize" => Ok(initialize()),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(list_tools()),
        "tools/call" => call_tool(bridge, client_id, request.params).await,
        method => {
            warn!(method, "Unknown MCP method");
            Err(JsonRpcError::method_not_found(method))
        }
    };

    Some(match result {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

fn initialize() -> Value {
    json!(InitializeResult {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: json!({ "tools": { "listChanged": false } }),
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        instructions: INSTRUCTIONS.to_string(),
    })
}

fn list_tools() -> Value {
    json!(ToolsListResult {
        tools: Tool::definitions(),
    })
}

async fn call_tool(
    bridge: &ToolBridge,
    client_id: Option<&str>,
    params: Value,
) -> Result<Value, JsonRpcError> {
    let params: CallToolParams = serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;

    let response = bridge.call(client_id, &params.name, params.arguments).await;
    Ok(json!(CallToolResult::from(response)))
}
