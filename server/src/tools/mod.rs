//! The closed set of tools the broker exposes.

pub mod drive;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const SEARCH_DRIVE_FILES: &str = "search_drive_files";
pub const CHECK_AUTHENTICATION_STATUS: &str = "check_authentication_status";

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum Tool {
    /// Search the client's Drive with a Drive `q` expression.
    SearchDriveFiles { query: String },
    CheckAuthenticationStatus {},
}

#[derive(Debug, Error, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

/// Advertised shape of a tool, in MCP `tools/list` form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl Tool {
    /// Parse a tool call by name. Missing or `null` arguments count as `{}`.
    pub fn parse(name: &str, arguments: Option<Value>) -> Result<Self, ToolError> {
        if ![SEARCH_DRIVE_FILES, CHECK_AUTHENTICATION_STATUS].contains(&name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }

        let arguments = match arguments {
            None | Some(Value::Null) => json!({}),
            Some(arguments) => arguments,
        };

        let tool: Tool = serde_json::from_value(json!({ "name": name, "arguments": arguments }))
            .map_err(|e| ToolError::InvalidArguments {
                tool: name.to_string(),
                message: e.to_string(),
            })?;

        if let Tool::SearchDriveFiles { query } = &tool {
            if query.trim().is_empty() {
                return Err(ToolError::InvalidArguments {
                    tool: name.to_string(),
                    message: "query must not be empty".to_string(),
                });
            }
        }

        Ok(tool)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::SearchDriveFiles { .. } => SEARCH_DRIVE_FILES,
            Tool::CheckAuthenticationStatus {} => CHECK_AUTHENTICATION_STATUS,
        }
    }

    /// Whether the tool touches the client's Google data.
    pub fn requires_credential(&self) -> bool {
        match self {
            Tool::SearchDriveFiles { .. } => true,
            Tool::CheckAuthenticationStatus {} => false,
        }
    }

    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: SEARCH_DRIVE_FILES.to_string(),
                description: "Search for files in the user's Google Drive. Requires the user to \
                              have authorized access; if not, an authorization URL is returned."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Google Drive search query, e.g. \"name contains 'report'\" or \"mimeType = 'application/pdf'\""
                        }
                    },
                    "required": ["query"]
                }),
            },
            ToolDefinition {
                name: CHECK_AUTHENTICATION_STATUS.to_string(),
                description: "Check whether this client has authorized access to Google Drive."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
        ]
    }
}
