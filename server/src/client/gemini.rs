//! Gemini `generateContent` with function calling.
//!
//! The API key goes in the `key` query parameter. Conversation turns are
//! `contents[]` entries of role `user` or `model`, each holding `parts`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{error::ClientError, settings::GenerationSettings};
use crate::tools::ToolDefinition;

/// One piece of a turn: text, a function call from the model, or our answer
/// to one.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn function_response(name: &str, content: String) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.to_string(),
                response: json!({ "content": content }),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    /// "user" or "model"
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".to_string(),
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: "model".to_string(),
            parts,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
}

/// A model that may answer with text or ask for tool calls.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Parts of the model's next turn.
    async fn generate(
        &self,
        contents: &[Content],
        tools: &[ToolDefinition],
    ) -> Result<Vec<Part>, ClientError>;
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    generation: GenerationSettings,
}

impl GeminiClient {
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        api_key: String,
        model: String,
        generation: GenerationSettings,
    ) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            generation,
        }
    }

    /// MCP tool definitions as Gemini function declarations. Gemini's schema
    /// dialect wants upper-case type names.
    fn convert_tools(tools: &[ToolDefinition]) -> Vec<GeminiTool> {
        if tools.is_empty() {
            return vec![];
        }

        let function_declarations = tools
            .iter()
            .map(|tool| FunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: convert_schema(&tool.input_schema),
            })
            .collect();

        vec![GeminiTool {
            function_declarations,
        }]
    }
}

fn convert_schema(schema: &Value) -> Value {
    let mut properties = Map::new();

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, details) in props {
            let kind = details
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("string")
                .to_uppercase();
            let description = details
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            properties.insert(
                name.clone(),
                json!({ "type": kind, "description": description }),
            );
        }
    }

    let mut parameters = json!({ "type": "OBJECT", "properties": properties });
    if let Some(required) = schema.get("required") {
        parameters["required"] = required.clone();
    }
    parameters
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(
        &self,
        contents: &[Content],
        tools: &[ToolDefinition],
    ) -> Result<Vec<Part>, ClientError> {
        let url = format!("{}/models/{}:generateContent", self.api_url, self.model);

        let request = GenerateContentRequest {
            contents,
            tools: Self::convert_tools(tools),
            generation_config: GenerationConfig {
                temperature: self.generation.temperature,
                top_p: self.generation.top_p,
                max_output_tokens: self.generation.max_output_tokens,
            },
        };

        debug!(model = %self.model, turns = contents.len(), "Calling Gemini");

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Model(format!("Gemini returned {status}: {body}")));
        }

        let response: GenerateContentResponse = response.json().await?;
        Ok(response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;

    #[test]
    fn test_convert_tools_uppercases_types() {
        let converted = GeminiClient::convert_tools(&Tool::definitions());
        let declarations = &converted[0].function_declarations;

        assert_eq!(declarations[0].name, "search_drive_files");
        assert_eq!(
            declarations[0].parameters,
            json!({
                "type": "OBJECT",
                "properties": {
                    "query": {
                        "type": "STRING",
                        "description": "Google Drive search query, e.g. \"name contains 'report'\" or \"mimeType = 'application/pdf'\""
                    }
                },
                "required": ["query"]
            })
        );
        assert_eq!(
            declarations[1].parameters,
            json!({ "type": "OBJECT", "properties": {} })
        );
    }

    #[test]
    fn test_no_tools_means_no_tools_field() {
        assert!(GeminiClient::convert_tools(&[]).is_empty());

        let contents = vec![Content::user(vec![Part::text("hi")])];
        let request = GenerateContentRequest {
            contents: &contents,
            tools: vec![],
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 0.95,
                max_output_tokens: 1000,
            },
        };
        let json = serde_json::to_value(&request).unwrap();

        assert!(json.get("tools").is_none());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1000);
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_parse_function_call_part() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "functionCall": { "name": "search_drive_files", "args": { "query": "q" } } }]
                }
            }]
        }))
        .unwrap();

        let part = &response.candidates[0].content.as_ref().unwrap().parts[0];
        assert_eq!(part.function_call.as_ref().unwrap().name, "search_drive_files");
        assert!(part.text.is_none());
    }
}
