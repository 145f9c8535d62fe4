//! Terminal-side orchestration for `drive-chat`.
//!
//! The orchestrator relays between the user, a [`gemini::ChatModel`] and the
//! broker's MCP endpoint. When a tool answers `authentication_required` it
//! hands the consent URL to an [`AuthPrompt`], polls the broker until the
//! client is authenticated, then retries the call once.

pub mod error;
pub mod gemini;
pub mod mcp_client;
pub mod settings;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{bridge::ToolResponse, tools::ToolDefinition};
pub use error::ClientError;
use gemini::{ChatModel, Content, Part};
use mcp_client::McpHttpClient;

/// Most model turns that may request tools before the loop gives up.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// How the user is told about consent.
#[async_trait]
pub trait AuthPrompt: Send + Sync {
    /// The user must open `url` in a browser.
    async fn authorization_required(&self, url: &str);

    async fn still_waiting(&self) {}

    async fn authenticated(&self) {}
}

pub struct Orchestrator<M> {
    mcp: McpHttpClient,
    model: M,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl<M: ChatModel> Orchestrator<M> {
    pub fn new(mcp: McpHttpClient, model: M, poll_interval: Duration, wait_timeout: Duration) -> Self {
        Self {
            mcp,
            model,
            poll_interval,
            wait_timeout,
        }
    }

    pub fn mcp(&self) -> &McpHttpClient {
        &self.mcp
    }

    /// Make sure the broker holds a credential for us, sending the user
    /// through consent if it does not.
    pub async fn ensure_authenticated(&self, prompt: &dyn AuthPrompt) -> Result<(), ClientError> {
        if self.mcp.is_authenticated().await? {
            info!("Already authenticated with Google Drive");
            prompt.authenticated().await;
            return Ok(());
        }

        prompt.authorization_required(&self.mcp.login_url()).await;
        self.wait_for_authentication(prompt).await
    }

    /// Poll `check_authentication_status` until it reports authenticated or
    /// the wait times out.
    pub async fn wait_for_authentication(&self, prompt: &dyn AuthPrompt) -> Result<(), ClientError> {
        let deadline = tokio::time::Instant::now() + self.wait_timeout;

        loop {
            if self.mcp.is_authenticated().await? {
                prompt.authenticated().await;
                return Ok(());
            }

            if tokio::time::Instant::now() + self.poll_interval > deadline {
                return Err(ClientError::AuthTimeout(self.wait_timeout));
            }

            prompt.still_waiting().await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ClientError> {
        self.mcp.list_tools().await
    }

    /// Answer one user query, running whatever tools the model asks for.
    pub async fn query(&self, text: &str, prompt: &dyn AuthPrompt) -> Result<String, ClientError> {
        let tools = self.mcp.list_tools().await?;
        let mut contents = vec![Content::user(vec![Part::text(text)])];
        let mut answer = Vec::new();

        for round in 0..=MAX_TOOL_ROUNDS {
            let parts = self.model.generate(&contents, &tools).await?;

            answer.extend(parts.iter().filter_map(|part| part.text.clone()));
            let calls: Vec<_> = parts
                .iter()
                .filter_map(|part| part.function_call.clone())
                .collect();

            if calls.is_empty() {
                return Ok(answer.join("\n"));
            }

            if round == MAX_TOOL_ROUNDS {
                warn!(rounds = MAX_TOOL_ROUNDS, "Model kept requesting tools; stopping");
                answer.push(format!(
                    "(stopped after {MAX_TOOL_ROUNDS} rounds of tool calls)"
                ));
                break;
            }

            contents.push(Content::model(parts));

            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                debug!(tool = %call.name, "Model requested tool");
                let output = self.call_tool(&call.name, call.args, prompt).await?;
                responses.push(Part::function_response(&call.name, output));
            }
            contents.push(Content::user(responses));
        }

        Ok(answer.join("\n"))
    }

    /// Run one tool, taking the user through consent and retrying once if
    /// the broker asks for it.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        prompt: &dyn AuthPrompt,
    ) -> Result<String, ClientError> {
        let arguments = if arguments.is_null() {
            Value::Object(Default::default())
        } else {
            arguments
        };

        let response = self.mcp.call_tool(name, arguments.clone()).await?;
        let ToolResponse::AuthenticationRequired {
            authorization_url, ..
        } = &response
        else {
            return Ok(response.text());
        };

        prompt.authorization_required(authorization_url).await;
        self.wait_for_authentication(prompt).await?;

        Ok(self.mcp.call_tool(name, arguments).await?.text())
    }
}
