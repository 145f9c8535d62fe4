//! Google fixture: OAuth consent + token + revoke + userinfo, and Drive `files.list`.
//!
//! Paths mirror the real endpoints so the broker only needs its base URLs
//! pointed here:
//!
//! * `GET  /o/oauth2/v2/auth`
//! * `POST /token`
//! * `POST /revoke`
//! * `GET  /oauth2/v2/userinfo`
//! * `GET  /drive/v3/files`

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use uuid::Uuid;

/// The account every consent is granted for unless `login_hint` says otherwise.
pub const DEFAULT_EMAIL: &str = "fixture-user@example.com";

/// A `login_hint` that makes the consent screen answer `error=access_denied`.
pub const DENY_LOGIN_HINT: &str = "deny";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

impl DriveFile {
    pub fn new(name: &str, mime_type: &str) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            web_view_link: Some(format!("https://drive.example.com/file/d/{id}/view")),
            id,
            name: name.to_string(),
            mime_type: mime_type.to_string(),
        }
    }
}

struct Grant {
    email: String,
    scope: String,
    redirect_uri: String,
    code_challenge: Option<String>,
}

struct IssuedToken {
    email: String,
    expires_at: u64,
}

struct Inner {
    codes: HashMap<String, Grant>,
    access_tokens: HashMap<String, IssuedToken>,
    refresh_tokens: HashMap<String, String>,
    files: Vec<DriveFile>,
    token_lifetime_secs: u64,
    token_endpoint_down: bool,
    token_requests: usize,
    drive_requests: usize,
}

/// Shared handle to the fake Google. Clone freely; all clones see the same state.
#[derive(Clone)]
pub struct GoogleFixture {
    inner: Arc<Mutex<Inner>>,
}

impl Default for GoogleFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleFixture {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                codes: HashMap::new(),
                access_tokens: HashMap::new(),
                refresh_tokens: HashMap::new(),
                files: vec![
                    DriveFile::new("Quarterly Report Q1", "application/pdf"),
                    DriveFile::new(
                        "quarterly report notes",
                        "application/vnd.google-apps.document",
                    ),
                    DriveFile::new("Team Budget", "application/vnd.google-apps.spreadsheet"),
                ],
                token_lifetime_secs: 3600,
                token_endpoint_down: false,
                token_requests: 0,
                drive_requests: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking handler only poisons fixture state; keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/o/oauth2/v2/auth", get(authorize))
            .route("/token", post(token))
            .route("/revoke", post(revoke))
            .route("/oauth2/v2/userinfo", get(userinfo))
            .route("/drive/v3/files", get(list_files))
            .route("/", get(|| async { "Google Fixture Server" }))
            .with_state(self.clone())
    }

    /// Lifetime handed out in `expires_in` for new access tokens. `0` issues
    /// tokens that are already expired.
    pub fn set_token_lifetime(&self, secs: u64) {
        self.lock().token_lifetime_secs = secs;
    }

    /// Make `POST /token` answer 503 until switched back.
    pub fn set_token_endpoint_down(&self, down: bool) {
        self.lock().token_endpoint_down = down;
    }

    /// Forget every access token, as if the user revoked access in their
    /// Google account. Refresh tokens survive.
    pub fn revoke_all_access_tokens(&self) {
        self.lock().access_tokens.clear();
    }

    /// Forget refresh tokens too.
    pub fn revoke_all_refresh_tokens(&self) {
        self.lock().refresh_tokens.clear();
    }

    pub fn token_requests(&self) -> usize {
        self.lock().token_requests
    }

    pub fn drive_requests(&self) -> usize {
        self.lock().drive_requests
    }

    pub fn active_access_tokens(&self) -> usize {
        self.lock().access_tokens.len()
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn oauth_error(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        Json(json!({ "error": error, "error_description": description })),
    )
        .into_response()
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": { "code": status.as_u16(), "message": message }
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct AuthorizeQuery {
    redirect_uri: String,
    state: Option<String>,
    scope: Option<String>,
    code_challenge: Option<String>,
    login_hint: Option<String>,
}

#[derive(Serialize)]
struct RedirectParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

/// Consent screen that approves immediately.
async fn authorize(
    State(fixture): State<GoogleFixture>,
    Query(params): Query<AuthorizeQuery>,
) -> Response {
    let login_hint = params.login_hint.as_deref().unwrap_or(DEFAULT_EMAIL);

    if login_hint == DENY_LOGIN_HINT {
        info!("GOOGLE: consent denied");
        return redirect_with(
            &params.redirect_uri,
            &RedirectParams {
                code: None,
                error: Some("access_denied"),
                state: params.state.as_deref(),
            },
        );
    }

    let code = format!("fixture_auth_code_{}", Uuid::new_v4());
    fixture.lock().codes.insert(
        code.clone(),
        Grant {
            email: login_hint.to_string(),
            scope: params.scope.clone().unwrap_or_default(),
            redirect_uri: params.redirect_uri.clone(),
            code_challenge: params.code_challenge.clone(),
        },
    );
    info!("GOOGLE: issued authorization code for {login_hint}");

    redirect_with(
        &params.redirect_uri,
        &RedirectParams {
            code: Some(&code),
            error: None,
            state: params.state.as_deref(),
        },
    )
}

fn redirect_with(redirect_uri: &str, params: &RedirectParams<'_>) -> Response {
    match serde_urlencoded::to_string(params) {
        Ok(query) => Redirect::to(&format!("{redirect_uri}?{query}")).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn issue_access_token(inner: &mut Inner, email: &str) -> (String, u64) {
    let access_token = format!("ya29.fixture-{}", Uuid::new_v4().simple());
    let lifetime = inner.token_lifetime_secs;
    inner.access_tokens.insert(
        access_token.clone(),
        IssuedToken {
            email: email.to_string(),
            expires_at: now() + lifetime,
        },
    );
    (access_token, lifetime)
}

async fn token(
    State(fixture): State<GoogleFixture>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let mut inner = fixture.lock();
    inner.token_requests += 1;

    if inner.token_endpoint_down {
        return oauth_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "temporarily_unavailable",
            "The token endpoint is down",
        );
    }

    match params.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            let code = params.get("code").cloned().unwrap_or_default();
            // Codes are single use: remove before validating anything else.
            let Some(grant) = inner.codes.remove(&code) else {
                return oauth_error(StatusCode::BAD_REQUEST, "invalid_grant", "Malformed auth code.");
            };

            if params.get("redirect_uri") != Some(&grant.redirect_uri) {
                return oauth_error(StatusCode::BAD_REQUEST, "redirect_uri_mismatch", "Bad Request");
            }

            if let Some(challenge) = &grant.code_challenge {
                let verifier = params.get("code_verifier").cloned().unwrap_or_default();
                let computed = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
                if &computed != challenge {
                    return oauth_error(
                        StatusCode::BAD_REQUEST,
                        "invalid_grant",
                        "Invalid code verifier.",
                    );
                }
            }

            let (access_token, expires_in) = issue_access_token(&mut inner, &grant.email);
            let refresh_token = format!("1//fixture-{}", Uuid::new_v4().simple());
            inner
                .refresh_tokens
                .insert(refresh_token.clone(), grant.email.clone());

            info!("GOOGLE: exchanged code for {}", grant.email);
            Json(json!({
                "access_token": access_token,
                "expires_in": expires_in,
                "refresh_token": refresh_token,
                "scope": grant.scope,
                "token_type": "Bearer"
            }))
            .into_response()
        }
        Some("refresh_token") => {
            let refresh_token = params.get("refresh_token").cloned().unwrap_or_default();
            let Some(email) = inner.refresh_tokens.get(&refresh_token).cloned() else {
                return oauth_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_grant",
                    "Token has been expired or revoked.",
                );
            };

            let (access_token, expires_in) = issue_access_token(&mut inner, &email);
            info!("GOOGLE: refreshed access token for {email}");
            Json(json!({
                "access_token": access_token,
                "expires_in": expires_in,
                "scope": "",
                "token_type": "Bearer"
            }))
            .into_response()
        }
        _ => oauth_error(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            "Invalid grant_type",
        ),
    }
}

async fn revoke(
    State(fixture): State<GoogleFixture>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let token = params.get("token").cloned().unwrap_or_default();
    let mut inner = fixture.lock();

    let removed = inner.access_tokens.remove(&token).is_some()
        || inner.refresh_tokens.remove(&token).is_some();

    if removed {
        Json(json!({})).into_response()
    } else {
        oauth_error(StatusCode::BAD_REQUEST, "invalid_token", "Bad Request")
    }
}

/// Resolve a bearer token to its account, rejecting unknown or expired tokens.
fn authenticate(inner: &Inner, headers: &HeaderMap) -> Option<String> {
    let token = bearer(headers)?;
    let issued = inner.access_tokens.get(token)?;
    (issued.expires_at > now()).then(|| issued.email.clone())
}

async fn userinfo(State(fixture): State<GoogleFixture>, headers: HeaderMap) -> Response {
    let inner = fixture.lock();
    match authenticate(&inner, &headers) {
        Some(email) => Json(json!({
            "id": "1234567890",
            "email": email,
            "verified_email": true,
            "name": "Fixture User"
        }))
        .into_response(),
        None => api_error(StatusCode::UNAUTHORIZED, "Invalid Credentials"),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFilesQuery {
    q: Option<String>,
    page_size: Option<usize>,
}

/// Pull the first single-quoted literal out of a Drive query, e.g.
/// `name contains 'report'` -> `report`.
fn quoted_literal(q: &str) -> Option<&str> {
    let start = q.find('\'')? + 1;
    let len = q[start..].find('\'')?;
    Some(&q[start..start + len])
}

async fn list_files(
    State(fixture): State<GoogleFixture>,
    headers: HeaderMap,
    Query(params): Query<ListFilesQuery>,
) -> Response {
    let mut inner = fixture.lock();
    inner.drive_requests += 1;

    if authenticate(&inner, &headers).is_none() {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }

    let needle = params
        .q
        .as_deref()
        .and_then(quoted_literal)
        .map(str::to_lowercase);

    let files: Vec<&DriveFile> = inner
        .files
        .iter()
        .filter(|f| match &needle {
            Some(needle) => {
                f.name.to_lowercase().contains(needle) || f.mime_type.to_lowercase() == *needle
            }
            None => true,
        })
        .take(params.page_size.unwrap_or(100))
        .collect();

    Json(json!({ "files": files })).into_response()
}
