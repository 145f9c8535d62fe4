use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::debug;

use super::google::client_id_from;
use crate::{
    mcp::{
        handle_message,
        protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST, PARSE_ERROR},
    },
    state::AppState,
};

/// `POST /mcp`: one JSON-RPC message in, one response out (202 for
/// notifications).
pub async fn mcp_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let client_id = client_id_from(&headers, None);

    let value: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(err) => {
            return Json(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(PARSE_ERROR, format!("Parse error: {err}")),
            ))
            .into_response()
        }
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(err) => {
            return Json(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {err}")),
            ))
            .into_response()
        }
    };

    debug!(method = %request.method, client_id = ?client_id, "MCP request");

    match handle_message(&state.bridge, client_id.as_deref(), request).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
