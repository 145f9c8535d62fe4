use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use drive_broker::{
    client::{
        gemini::GeminiClient, mcp_client::McpHttpClient, settings::GenerationSettings,
        AuthPrompt, Orchestrator,
    },
    routes,
    state::{AppState, GoogleOAuthConfig, ServerSettings},
};
use fixtures::{
    gemini::GeminiFixture,
    google::{GoogleFixture, DEFAULT_EMAIL},
};
use serde_json::{json, Value};

struct Broker {
    google: GoogleFixture,
    url: String,
    http: reqwest::Client,
}

async fn start_broker() -> Broker {
    let google = GoogleFixture::new();
    let google_url = fixtures::spawn(google.router()).await.unwrap();

    // Bind first so the redirect URI points at the real port.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let mut config =
        GoogleOAuthConfig::with_credentials("test-client".to_string(), "test-secret".to_string());
    config.auth_uri = format!("{google_url}/o/oauth2/v2/auth");
    config.token_uri = format!("{google_url}/token");
    config.revoke_uri = format!("{google_url}/revoke");
    config.userinfo_uri = format!("{google_url}/oauth2/v2/userinfo");
    config.drive_api_url = format!("{google_url}/drive/v3");

    let state = AppState::new(ServerSettings::for_public_url(&url), config).unwrap();
    tokio::spawn(routes::serve(listener, state));

    Broker {
        google,
        url,
        http: reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap(),
    }
}

impl Broker {
    async fn rpc(&self, client_id: Option<&str>, method: &str, params: Value) -> Value {
        let mut request = self.http.post(format!("{}/mcp", self.url)).json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        }));
        if let Some(client_id) = client_id {
            request = request.header("x-client-id", client_id);
        }

        let response = request.send().await.unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }

    /// `tools/call` result for `client_id`.
    async fn call(&self, client_id: Option<&str>, name: &str, arguments: Value) -> Value {
        let response = self
            .rpc(
                client_id,
                "tools/call",
                json!({ "name": name, "arguments": arguments }),
            )
            .await;
        response["result"].clone()
    }

    async fn search(&self, client_id: &str, query: &str) -> Value {
        self.call(Some(client_id), "search_drive_files", json!({ "query": query }))
            .await
    }

    async fn auth_status(&self, client_id: &str) -> String {
        let result = self
            .call(Some(client_id), "check_authentication_status", json!({}))
            .await;
        result["structuredContent"]["content"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn http_status(&self, client_id: &str) -> Value {
        self.http
            .get(format!("{}/status", self.url))
            .query(&[("client_id", client_id)])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Walk the consent screen, returning the broker callback URL it
    /// redirects to without visiting it.
    async fn consent(&self, authorization_url: &str) -> String {
        let response = self.http.get(authorization_url).send().await.unwrap();
        assert_eq!(response.status(), 303);
        let location = response.headers()["location"].to_str().unwrap().to_string();
        assert!(location.starts_with(&format!("{}/oauth2callback", self.url)));
        location
    }

    async fn visit(&self, url: &str) -> (u16, String) {
        let response = self.http.get(url).send().await.unwrap();
        (response.status().as_u16(), response.text().await.unwrap())
    }

    /// Search until consent is needed, then grant it.
    async fn authenticate(&self, client_id: &str) {
        let result = self.search(client_id, "name contains 'anything'").await;
        let url = authorization_url(&result);
        let callback = self.consent(&url).await;
        let (status, body) = self.visit(&callback).await;
        assert_eq!(status, 200, "{body}");
    }
}

fn authorization_url(result: &Value) -> String {
    assert_eq!(result["structuredContent"]["status"], "authentication_required");
    result["structuredContent"]["authorization_url"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_search_after_consent_finds_quarterly_report() {
    let broker = start_broker().await;

    assert_eq!(broker.auth_status("c1").await, "not authenticated");

    let first = broker.search("c1", "name contains 'quarterly'").await;
    assert_eq!(first["isError"], false);
    let url = authorization_url(&first);
    assert!(url.contains("state="));
    assert!(url.contains("code_challenge_method=S256"));
    assert_eq!(broker.google.drive_requests(), 0);

    assert_eq!(broker.auth_status("c1").await, "pending");
    assert_eq!(broker.http_status("c1").await["state"], "pending");

    let callback = broker.consent(&url).await;
    let (status, body) = broker.visit(&callback).await;
    assert_eq!(status, 200);
    assert!(body.contains(&format!("Authentication successful for user: {DEFAULT_EMAIL}")));

    assert_eq!(broker.auth_status("c1").await, "authenticated");

    let found = broker.search("c1", "name contains 'quarterly'").await;
    assert_eq!(found["isError"], false);
    assert_eq!(found["structuredContent"]["status"], "ok");
    let text = found["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Files found:"));
    assert!(text.contains("Quarterly Report Q1"));
    assert!(!text.contains("Team Budget"));
    assert_eq!(broker.google.drive_requests(), 1);
}

#[tokio::test]
async fn test_pending_search_reuses_authorization_url() {
    let broker = start_broker().await;

    let first = authorization_url(&broker.search("c1", "name contains 'a'").await);
    let second = authorization_url(&broker.search("c1", "name contains 'b'").await);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_authorize_route_redirects_to_consent() {
    let broker = start_broker().await;

    let response = broker
        .http
        .get(format!("{}/authorize", broker.url))
        .query(&[("client_id", "browser-client")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303);
    let location = response.headers()["location"].to_str().unwrap().to_string();

    let callback = broker.consent(&location).await;
    let (status, _) = broker.visit(&callback).await;
    assert_eq!(status, 200);
    assert_eq!(broker.http_status("browser-client").await["state"], "authenticated");

    let (status, body) = broker
        .visit(&format!("{}/authorize?client_id=browser-client", broker.url))
        .await;
    assert_eq!(status, 200);
    assert!(body.contains(&format!("Already authenticated as {DEFAULT_EMAIL}")));
}

#[tokio::test]
async fn test_authorize_route_requires_client_id() {
    let broker = start_broker().await;

    let (status, _) = broker.visit(&format!("{}/authorize", broker.url)).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_callback_cannot_be_replayed() {
    let broker = start_broker().await;

    let url = authorization_url(&broker.search("c1", "name contains 'x'").await);
    let callback = broker.consent(&url).await;
    assert_eq!(broker.visit(&callback).await.0, 200);

    let (status, _) = broker.visit(&callback).await;
    assert_eq!(status, 400);
    assert_eq!(broker.auth_status("c1").await, "authenticated");
    assert_eq!(broker.google.token_requests(), 1);
}

#[tokio::test]
async fn test_unknown_state_is_rejected() {
    let broker = start_broker().await;
    let _ = broker.search("c1", "name contains 'x'").await;

    let (status, _) = broker
        .visit(&format!(
            "{}/oauth2callback?code=stolen&state=not-a-real-nonce",
            broker.url
        ))
        .await;
    assert_eq!(status, 400);
    assert_eq!(broker.auth_status("c1").await, "pending");
    assert_eq!(broker.google.token_requests(), 0);
}

#[tokio::test]
async fn test_callback_without_code_is_rejected() {
    let broker = start_broker().await;

    let (status, _) = broker
        .visit(&format!("{}/oauth2callback?state=abc", broker.url))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_denied_consent_returns_client_to_unauthenticated() {
    let broker = start_broker().await;

    let url = authorization_url(&broker.search("c1", "name contains 'x'").await);
    let callback = broker.consent(&format!("{url}&login_hint=deny")).await;
    assert!(callback.contains("error=access_denied"));

    let (status, body) = broker.visit(&callback).await;
    assert_eq!(status, 400);
    assert!(body.contains("access_denied"));
    assert_eq!(broker.auth_status("c1").await, "not authenticated");
}

#[tokio::test]
async fn test_failed_exchange_returns_client_to_unauthenticated() {
    let broker = start_broker().await;

    let url = authorization_url(&broker.search("c1", "name contains 'x'").await);
    let callback = broker.consent(&url).await;

    broker.google.set_token_endpoint_down(true);
    let (status, _) = broker.visit(&callback).await;
    assert_eq!(status, 502);
    assert_eq!(broker.auth_status("c1").await, "not authenticated");

    // A fresh attempt succeeds once Google is back.
    broker.google.set_token_endpoint_down(false);
    broker.authenticate("c1").await;
    assert_eq!(broker.auth_status("c1").await, "authenticated");
}

#[tokio::test]
async fn test_clients_are_isolated() {
    let broker = start_broker().await;
    broker.authenticate("c1").await;

    let other = broker.search("c2", "name contains 'quarterly'").await;
    authorization_url(&other);
    assert_eq!(broker.auth_status("c1").await, "authenticated");
    assert_eq!(broker.auth_status("c2").await, "pending");
    assert_eq!(broker.google.drive_requests(), 0);
}

#[tokio::test]
async fn test_expired_credential_is_refreshed() {
    let broker = start_broker().await;
    // Inside the expiry margin: the broker refreshes, Google still accepts.
    broker.google.set_token_lifetime(10);
    broker.authenticate("c1").await;
    assert_eq!(broker.google.token_requests(), 1);

    let found = broker.search("c1", "name contains 'budget'").await;
    assert_eq!(found["structuredContent"]["status"], "ok");
    assert!(found["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Team Budget"));
    assert_eq!(broker.google.token_requests(), 2);
}

#[tokio::test]
async fn test_failed_refresh_requires_consent_again() {
    let broker = start_broker().await;
    broker.google.set_token_lifetime(10);
    broker.authenticate("c1").await;

    broker.google.revoke_all_refresh_tokens();
    let result = broker.search("c1", "name contains 'budget'").await;
    authorization_url(&result);
    assert_eq!(broker.auth_status("c1").await, "pending");
}

#[tokio::test]
async fn test_rejected_credential_requires_consent_again() {
    let broker = start_broker().await;
    broker.authenticate("c1").await;

    broker.google.revoke_all_access_tokens();
    let result = broker.search("c1", "name contains 'quarterly'").await;
    authorization_url(&result);
    assert_eq!(broker.google.drive_requests(), 1);
    assert_eq!(broker.auth_status("c1").await, "pending");
}

#[tokio::test]
async fn test_revoke_endpoint_drops_credential() {
    let broker = start_broker().await;
    broker.authenticate("c1").await;

    let response: Value = broker
        .http
        .post(format!("{}/revoke", broker.url))
        .header("x-client-id", "c1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["revoked"], true);
    assert_eq!(broker.auth_status("c1").await, "not authenticated");

    let again: Value = broker
        .http
        .post(format!("{}/revoke?client_id=c1", broker.url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["revoked"], false);
}

#[tokio::test]
async fn test_tool_call_without_client_id() {
    let broker = start_broker().await;

    let result = broker
        .call(None, "search_drive_files", json!({ "query": "name contains 'x'" }))
        .await;
    assert_eq!(result["isError"], true);
    assert_eq!(
        result["content"][0]["text"],
        "No client_id provided for authentication."
    );
}

#[tokio::test]
async fn test_unknown_tool_and_method() {
    let broker = start_broker().await;

    let result = broker.call(Some("c1"), "delete_everything", json!({})).await;
    assert_eq!(result["isError"], true);
    assert_eq!(result["content"][0]["text"], "Unknown tool: delete_everything");

    let response = broker.rpc(Some("c1"), "resources/list", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn test_tools_list_over_http() {
    let broker = start_broker().await;

    let response = broker.rpc(None, "tools/list", json!({})).await;
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["search_drive_files", "check_authentication_status"]);
}

#[tokio::test]
async fn test_malformed_mcp_body() {
    let broker = start_broker().await;

    let response: Value = broker
        .http
        .post(format!("{}/mcp", broker.url))
        .body("{not json")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], -32700);
}

/// Grants consent as soon as it is asked, the way a user clicking the link
/// would.
struct ClickThrough {
    http: reqwest::Client,
    prompted: Mutex<Vec<String>>,
}

#[async_trait]
impl AuthPrompt for ClickThrough {
    async fn authorization_required(&self, url: &str) {
        self.prompted.lock().unwrap().push(url.to_string());
        let response = self.http.get(url).send().await.unwrap();
        assert!(response.status().is_success());
    }
}

#[tokio::test]
async fn test_orchestrator_walks_user_through_consent() {
    let broker = start_broker().await;
    let gemini = GeminiFixture::new();
    let gemini_url = fixtures::spawn(gemini.router()).await.unwrap();

    let http = reqwest::Client::new();
    let mcp = McpHttpClient::new(http.clone(), &broker.url, "chat-user".to_string());
    let model = GeminiClient::new(
        http.clone(),
        &format!("{gemini_url}/v1beta"),
        "test-key".to_string(),
        "gemini-test".to_string(),
        GenerationSettings::default(),
    );
    let orchestrator = Orchestrator::new(
        mcp,
        model,
        Duration::from_millis(20),
        Duration::from_secs(5),
    );

    let prompt = Arc::new(ClickThrough {
        http,
        prompted: Mutex::new(Vec::new()),
    });

    let answer = orchestrator.query("quarterly", prompt.as_ref()).await.unwrap();
    assert!(answer.starts_with("Here is what I found:"), "{answer}");
    assert!(answer.contains("Quarterly Report Q1"));
    assert_eq!(prompt.prompted.lock().unwrap().len(), 1);
    assert_eq!(gemini.requests(), 2);

    // Already authenticated: no second prompt.
    orchestrator.ensure_authenticated(prompt.as_ref()).await.unwrap();
    assert_eq!(prompt.prompted.lock().unwrap().len(), 1);
    assert!(orchestrator.mcp().is_authenticated().await.unwrap());
}
