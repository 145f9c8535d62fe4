//! Gatekeeper between tool calls and the client's Google credential.
//!
//! A tool that needs Google data only runs with an AUTHENTICATED client's
//! credential. Anything else comes back as `authentication_required` with a
//! consent URL, and the Drive API is never contacted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    oauth::{token::OAuthTokenSet, AuthError, Authorizer, ClientId},
    tools::{
        drive::{format_file_list, DriveApi, DriveError},
        Tool,
    },
};

pub const AUTH_REQUIRED_MESSAGE: &str =
    "Authentication with Google Drive is required. Open the authorization URL to grant access, then try again.";

/// Outcome of a tool call as the caller sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResponse {
    Ok {
        content: String,
    },
    AuthenticationRequired {
        authorization_url: String,
        message: String,
    },
    Error {
        message: String,
    },
}

impl ToolResponse {
    fn error(message: impl Into<String>) -> Self {
        ToolResponse::Error {
            message: message.into(),
        }
    }

    /// Human readable text for the MCP `content` block.
    pub fn text(&self) -> String {
        match self {
            ToolResponse::Ok { content } => content.clone(),
            ToolResponse::AuthenticationRequired {
                authorization_url,
                message,
            } => format!("{message}\n{authorization_url}"),
            ToolResponse::Error { message } => message.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResponse::Error { .. })
    }
}

pub struct ToolBridge {
    authorizer: Authorizer,
    drive: Arc<dyn DriveApi>,
}

impl ToolBridge {
    pub fn new(authorizer: Authorizer, drive: Arc<dyn DriveApi>) -> Self {
        Self { authorizer, drive }
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// Run `name` on behalf of `client_id`.
    #[tracing::instrument(skip(self, arguments))]
    pub async fn call(
        &self,
        client_id: Option<&str>,
        name: &str,
        arguments: Option<Value>,
    ) -> ToolResponse {
        let tool = match Tool::parse(name, arguments) {
            Ok(tool) => tool,
            Err(err) => return ToolResponse::error(err.to_string()),
        };

        let Some(raw) = client_id.filter(|raw| !raw.trim().is_empty()) else {
            return ToolResponse::error("No client_id provided for authentication.");
        };
        let client_id = match ClientId::parse(raw) {
            Ok(client_id) => client_id,
            Err(err) => return ToolResponse::error(err.to_string()),
        };

        let credential = if tool.requires_credential() {
            match self.authorizer.usable_credential(&client_id).await {
                Some(tokens) => Some(tokens),
                None => return self.authentication_required(&client_id).await,
            }
        } else {
            None
        };

        match (tool, credential) {
            (Tool::CheckAuthenticationStatus {}, _) => ToolResponse::Ok {
                content: self.authorizer.status(&client_id).describe().to_string(),
            },
            (Tool::SearchDriveFiles { query }, Some(tokens)) => {
                self.search(&client_id, &tokens, &query).await
            }
            (Tool::SearchDriveFiles { .. }, None) => self.authentication_required(&client_id).await,
        }
    }

    async fn search(&self, client_id: &ClientId, tokens: &OAuthTokenSet, query: &str) -> ToolResponse {
        match self.drive.search_files(&tokens.access_token, query).await {
            Ok(files) => ToolResponse::Ok {
                content: format_file_list(&files),
            },
            Err(DriveError::Unauthorized(status)) => {
                warn!(client_id = %client_id, %status, "Drive rejected credential; reauthorization needed");
                self.authorizer.invalidate(client_id, &tokens.access_token);
                self.authentication_required(client_id).await
            }
            Err(err) => ToolResponse::error(format!("Error searching files: {err}")),
        }
    }

    async fn authentication_required(&self, client_id: &ClientId) -> ToolResponse {
        match self.authorizer.pending_or_begin(client_id) {
            Ok(request) => {
                info!(client_id = %client_id, "Tool call needs authorization");
                ToolResponse::AuthenticationRequired {
                    authorization_url: request.authorization_url,
                    message: AUTH_REQUIRED_MESSAGE.to_string(),
                }
            }
            // A callback finished between the credential check and now
            Err(AuthError::AlreadyAuthenticated) => {
                ToolResponse::error("Authentication just completed; please retry the request.")
            }
            Err(err) => ToolResponse::error(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        oauth::{
            provider::OAuthProvider, store::MemorySessionStore, token::OAuthTokenSet,
            ExchangeError, Nonce,
        },
        tools::drive::DriveFile,
    };
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    struct StaticProvider;

    #[async_trait]
    impl OAuthProvider for StaticProvider {
        fn authorize_url(&self, state: &Nonce, _code_challenge: &str) -> String {
            format!("https://accounts.example.com/auth?state={}", state.as_str())
        }

        async fn exchange_code(
            &self,
            code: &str,
            _code_verifier: &str,
        ) -> Result<OAuthTokenSet, ExchangeError> {
            Ok(OAuthTokenSet {
                access_token: format!("access-{code}"),
                token_type: "Bearer".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
                refresh_token: None,
                scope: "openid".to_string(),
                email: Some("user@example.com".to_string()),
            })
        }

        async fn refresh(&self, _tokens: &OAuthTokenSet) -> Result<OAuthTokenSet, ExchangeError> {
            Err(ExchangeError::InvalidGrant("no refresh".to_string()))
        }

        async fn revoke(&self, _token: &str) -> Result<(), ExchangeError> {
            Ok(())
        }
    }

    enum DriveScript {
        Files(Vec<DriveFile>),
        Unauthorized,
        Down,
    }

    struct FakeDrive {
        calls: AtomicUsize,
        tokens_seen: Mutex<Vec<String>>,
        script: DriveScript,
    }

    impl FakeDrive {
        fn new(script: DriveScript) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                tokens_seen: Mutex::new(vec![]),
                script,
            })
        }
    }

    #[async_trait]
    impl DriveApi for FakeDrive {
        async fn search_files(
            &self,
            access_token: &str,
            _query: &str,
        ) -> Result<Vec<DriveFile>, DriveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens_seen
                .lock()
                .unwrap()
                .push(access_token.to_string());
            match &self.script {
                DriveScript::Files(files) => Ok(files.clone()),
                DriveScript::Unauthorized => Err(DriveError::Unauthorized(StatusCode::UNAUTHORIZED)),
                DriveScript::Down => Err(DriveError::Api {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "backendError".to_string(),
                }),
            }
        }
    }

    fn bridge(drive: Arc<FakeDrive>) -> ToolBridge {
        let authorizer = Authorizer::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(StaticProvider),
            Duration::seconds(600),
        );
        ToolBridge::new(authorizer, drive)
    }

    async fn authenticate(bridge: &ToolBridge, id: &str, code: &str) {
        let client_id = ClientId::parse(id).unwrap();
        let request = bridge.authorizer().begin(&client_id).unwrap();
        bridge
            .authorizer()
            .complete(request.nonce.as_str(), code)
            .await
            .unwrap();
    }

    fn report() -> DriveFile {
        DriveFile {
            id: "1".to_string(),
            name: "Quarterly Report".to_string(),
            mime_type: "application/pdf".to_string(),
            web_view_link: Some("https://drive.example.com/1".to_string()),
        }
    }

    fn search_args() -> Option<Value> {
        Some(json!({ "query": "name contains 'quarterly report'" }))
    }

    #[tokio::test]
    async fn test_unauthenticated_search_never_reaches_drive() {
        let drive = FakeDrive::new(DriveScript::Files(vec![report()]));
        let bridge = bridge(drive.clone());

        let response = bridge
            .call(Some("c1"), "search_drive_files", search_args())
            .await;

        let ToolResponse::AuthenticationRequired {
            authorization_url,
            message,
        } = response
        else {
            panic!("expected authentication_required, got {response:?}");
        };
        assert!(authorization_url.starts_with("https://accounts.example.com/auth?state="));
        assert_eq!(message, AUTH_REQUIRED_MESSAGE);
        assert_eq!(drive.calls.load(Ordering::SeqCst), 0);

        let client_id = ClientId::parse("c1").unwrap();
        assert_eq!(
            bridge.authorizer().status(&client_id),
            crate::oauth::AuthState::Pending
        );
    }

    #[tokio::test]
    async fn test_repeated_calls_while_pending_reuse_url() {
        let drive = FakeDrive::new(DriveScript::Files(vec![]));
        let bridge = bridge(drive.clone());

        let first = bridge
            .call(Some("c1"), "search_drive_files", search_args())
            .await;
        let second = bridge
            .call(Some("c1"), "search_drive_files", search_args())
            .await;

        assert_eq!(first, second);
        assert_eq!(drive.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_authenticated_search_uses_own_credential() {
        let drive = FakeDrive::new(DriveScript::Files(vec![report()]));
        let bridge = bridge(drive.clone());
        authenticate(&bridge, "a", "alpha").await;
        authenticate(&bridge, "b", "beta").await;

        let response = bridge
            .call(Some("a"), "search_drive_files", search_args())
            .await;

        assert_eq!(
            response,
            ToolResponse::Ok {
                content: "Files found:\n- Quarterly Report (application/pdf)\n  Link: https://drive.example.com/1".to_string()
            }
        );
        assert_eq!(
            *drive.tokens_seen.lock().unwrap(),
            vec!["access-alpha".to_string()]
        );
    }

    #[tokio::test]
    async fn test_downstream_unauthorized_forces_reauthorization() {
        let drive = FakeDrive::new(DriveScript::Unauthorized);
        let bridge = bridge(drive.clone());
        authenticate(&bridge, "c1", "xyz").await;

        let response = bridge
            .call(Some("c1"), "search_drive_files", search_args())
            .await;

        assert!(matches!(response, ToolResponse::AuthenticationRequired { .. }));
        let client_id = ClientId::parse("c1").unwrap();
        assert_eq!(
            bridge.authorizer().status(&client_id),
            crate::oauth::AuthState::Pending
        );
    }

    #[tokio::test]
    async fn test_other_drive_errors_pass_through() {
        let drive = FakeDrive::new(DriveScript::Down);
        let bridge = bridge(drive.clone());
        authenticate(&bridge, "c1", "xyz").await;

        let response = bridge
            .call(Some("c1"), "search_drive_files", search_args())
            .await;

        let ToolResponse::Error { message } = response else {
            panic!("expected error, got {response:?}");
        };
        assert!(message.starts_with("Error searching files:"));
        let client_id = ClientId::parse("c1").unwrap();
        assert_eq!(
            bridge.authorizer().status(&client_id),
            crate::oauth::AuthState::Authenticated
        );
    }

    #[tokio::test]
    async fn test_missing_client_id() {
        let bridge = bridge(FakeDrive::new(DriveScript::Files(vec![])));

        for client_id in [None, Some(""), Some("   ")] {
            let response = bridge
                .call(client_id, "search_drive_files", search_args())
                .await;
            assert_eq!(
                response,
                ToolResponse::Error {
                    message: "No client_id provided for authentication.".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let bridge = bridge(FakeDrive::new(DriveScript::Files(vec![])));

        let response = bridge.call(Some("c1"), "format_disk", None).await;

        assert_eq!(response, ToolResponse::error("Unknown tool: format_disk"));
        assert!(response.is_error());
    }

    async fn status(bridge: &ToolBridge) -> String {
        bridge
            .call(Some("c1"), "check_authentication_status", None)
            .await
            .text()
    }

    #[tokio::test]
    async fn test_status_tool_reports_each_state() {
        let bridge = bridge(FakeDrive::new(DriveScript::Files(vec![])));

        assert_eq!(status(&bridge).await, "not authenticated");
        bridge
            .call(Some("c1"), "search_drive_files", search_args())
            .await;
        assert_eq!(status(&bridge).await, "pending");
        let client_id = ClientId::parse("c1").unwrap();
        let pending = bridge.authorizer().session(&client_id).unwrap();
        let nonce = pending.oauth_state_nonce().unwrap().clone();
        bridge
            .authorizer()
            .complete(nonce.as_str(), "xyz")
            .await
            .unwrap();
        assert_eq!(status(&bridge).await, "authenticated");
    }

    #[test]
    fn test_response_wire_shape() {
        let json = serde_json::to_value(ToolResponse::AuthenticationRequired {
            authorization_url: "https://x".to_string(),
            message: "m".to_string(),
        })
        .unwrap();

        assert_eq!(
            json,
            json!({ "status": "authentication_required", "authorization_url": "https://x", "message": "m" })
        );
    }

    /// Re-authenticates the client while a search with the old token is in
    /// flight, then rejects that old token.
    struct ReauthenticatingDrive {
        authorizer: Authorizer,
    }

    #[async_trait]
    impl DriveApi for ReauthenticatingDrive {
        async fn search_files(
            &self,
            _access_token: &str,
            _query: &str,
        ) -> Result<Vec<DriveFile>, DriveError> {
            let client_id = ClientId::parse("c1").unwrap();
            self.authorizer.revoke(&client_id).await.unwrap();
            let request = self.authorizer.begin(&client_id).unwrap();
            self.authorizer
                .complete(request.nonce.as_str(), "new")
                .await
                .unwrap();
            Err(DriveError::Unauthorized(StatusCode::UNAUTHORIZED))
        }
    }

    #[tokio::test]
    async fn test_stale_rejection_keeps_newer_credential() {
        let authorizer = Authorizer::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(StaticProvider),
            Duration::seconds(600),
        );
        let drive = Arc::new(ReauthenticatingDrive {
            authorizer: authorizer.clone(),
        });
        let bridge = ToolBridge::new(authorizer, drive);
        authenticate(&bridge, "c1", "old").await;

        let response = bridge
            .call(Some("c1"), "search_drive_files", search_args())
            .await;

        assert!(!matches!(response, ToolResponse::AuthenticationRequired { .. }));
        let client_id = ClientId::parse("c1").unwrap();
        let session = bridge.authorizer().session(&client_id).unwrap();
        assert_eq!(session.state(), crate::oauth::AuthState::Authenticated);
        assert_eq!(session.credential().unwrap().access_token, "access-new");
    }

    #[tokio::test]
    async fn test_status_tool_never_starts_authorization() {
        let drive = FakeDrive::new(DriveScript::Files(vec![]));
        let bridge = bridge(drive.clone());

        let response = bridge
            .call(Some("c1"), "check_authentication_status", None)
            .await;

        assert_eq!(
            response,
            ToolResponse::Ok {
                content: "not authenticated".to_string()
            }
        );
        let client_id = ClientId::parse("c1").unwrap();
        assert_eq!(
            bridge.authorizer().status(&client_id),
            crate::oauth::AuthState::Unauthenticated
        );
        assert_eq!(drive.calls.load(Ordering::SeqCst), 0);
    }
}
