use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use super::error::ClientError;
use crate::{
    bridge::ToolResponse,
    mcp::protocol::{
        CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse, ToolsListResult,
        MCP_PROTOCOL_VERSION,
    },
    routes::google::CLIENT_ID_HEADER,
    tools::{ToolDefinition, CHECK_AUTHENTICATION_STATUS},
};

/// MCP over HTTP, identifying itself with `X-Client-ID` on every request.
pub struct McpHttpClient {
    http: reqwest::Client,
    server_url: String,
    client_id: String,
    next_id: AtomicU64,
}

impl McpHttpClient {
    pub fn new(http: reqwest::Client, server_url: &str, client_id: String) -> Self {
        Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
            client_id,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Browser entry point that starts consent for this client.
    pub fn login_url(&self) -> String {
        format!(
            "{}/authorize?client_id={}",
            self.server_url,
            urlencoding::encode(&self.client_id)
        )
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, "MCP request");

        let response: JsonRpcResponse = self
            .http
            .post(format!("{}/mcp", self.server_url))
            .header(CLIENT_ID_HEADER, &self.client_id)
            .json(&JsonRpcRequest::new(id, method, params))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| ClientError::Protocol(format!("{method} returned no result")))?;
        serde_json::from_value(result).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    pub async fn initialize(&self) -> Result<InitializeResult, ClientError> {
        self.request(
            "initialize",
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "drive-chat", "version": env!("CARGO_PKG_VERSION") }
            }),
        )
        .await
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ClientError> {
        let result: ToolsListResult = self.request("tools/list", json!({})).await?;
        Ok(result.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResponse, ClientError> {
        let result: CallToolResult = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        Ok(result.structured_content)
    }

    /// True once the broker holds a credential for this client.
    pub async fn is_authenticated(&self) -> Result<bool, ClientError> {
        match self.call_tool(CHECK_AUTHENTICATION_STATUS, json!({})).await? {
            ToolResponse::Ok { content } => Ok(content == "authenticated"),
            other => Err(ClientError::Protocol(format!(
                "unexpected status response: {other:?}"
            ))),
        }
    }
}
