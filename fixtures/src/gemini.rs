//! Scripted stand-in for the Gemini `generateContent` endpoint.
//!
//! The script is deliberately dumb:
//!
//! 1. If the last turn carries a `functionResponse`, answer with text that
//!    quotes the tool output.
//! 2. Otherwise, if a `search_drive_files` declaration was offered, ask for it
//!    with `name contains '<last user text>'`.
//! 3. Otherwise echo the user text back.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tracing::info;

#[derive(Clone, Default)]
pub struct GeminiFixture {
    requests: Arc<AtomicUsize>,
}

impl GeminiFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1beta/models/:target", post(generate_content))
            .with_state(self.clone())
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

fn text_reply(text: String) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

fn offers_function(body: &Value, name: &str) -> bool {
    body["tools"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|tool| tool["functionDeclarations"].as_array())
        .flatten()
        .any(|decl| decl["name"] == name)
}

async fn generate_content(
    State(fixture): State<GeminiFixture>,
    Path(target): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    fixture.requests.fetch_add(1, Ordering::SeqCst);

    if !target.ends_with(":generateContent") {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "message": "unknown method", "status": "NOT_FOUND" } })),
        )
            .into_response();
    }

    let last_parts = body["contents"]
        .as_array()
        .and_then(|contents| contents.last())
        .and_then(|content| content["parts"].as_array())
        .cloned()
        .unwrap_or_default();

    if let Some(response) = last_parts
        .iter()
        .find_map(|part| part.get("functionResponse"))
    {
        let output = response["response"]["content"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| response["response"].to_string());
        info!("GEMINI: summarising tool output");
        return Json(text_reply(format!("Here is what I found:\n{output}"))).into_response();
    }

    let user_text = last_parts
        .iter()
        .find_map(|part| part["text"].as_str())
        .unwrap_or_default()
        .to_string();

    if offers_function(&body, "search_drive_files") {
        info!("GEMINI: requesting search_drive_files");
        return Json(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "functionCall": {
                            "name": "search_drive_files",
                            "args": { "query": format!("name contains '{user_text}'") }
                        }
                    }]
                },
                "finishReason": "STOP"
            }]
        }))
        .into_response();
    }

    Json(text_reply(user_text)).into_response()
}
