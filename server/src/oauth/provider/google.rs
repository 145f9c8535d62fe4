//! Google OAuth 2.0 (authorization code + PKCE)

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::OAuthProvider;
use crate::{
    oauth::{
        error::{ExchangeError, ProviderErrorBody},
        session::Nonce,
        token::{OAuthTokenSet, TokenResponse},
    },
    state::GoogleOAuthConfig,
};

#[derive(Serialize)]
struct AuthUrlParams<'a> {
    client_id: &'a str,
    redirect_uri: &'a str,
    response_type: &'static str,
    scope: &'a str,
    state: &'a str,
    access_type: &'static str,
    include_granted_scopes: &'static str,
    prompt: &'static str,
    code_challenge: &'a str,
    code_challenge_method: &'static str,
}

#[derive(Deserialize)]
struct UserInfo {
    email: Option<String>,
}

/// Talks to Google's authorization, token, revoke and userinfo endpoints.
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    config: GoogleOAuthConfig,
    redirect_uri: String,
}

impl GoogleOAuthClient {
    pub fn new(http: reqwest::Client, config: GoogleOAuthConfig, redirect_uri: String) -> Self {
        Self {
            http,
            config,
            redirect_uri,
        }
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    fn scope(&self) -> String {
        self.config.scopes.join(" ")
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, ExchangeError> {
        let response = self
            .http
            .post(&self.config.token_uri)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ProviderErrorBody>(&body) {
                Ok(error) => error.into_exchange_error(status),
                Err(_) => ExchangeError::Provider {
                    status,
                    message: body,
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| ExchangeError::MalformedResponse(e.to_string()))
    }

    /// Email of the account behind `access_token`.
    pub async fn fetch_email(&self, access_token: &str) -> Result<Option<String>, ExchangeError> {
        let response = self
            .http
            .get(&self.config.userinfo_uri)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Provider { status, message });
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| ExchangeError::MalformedResponse(e.to_string()))?;
        Ok(info.email)
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthClient {
    fn authorize_url(&self, state: &Nonce, code_challenge: &str) -> String {
        let scope = self.scope();
        let params = AuthUrlParams {
            client_id: &self.config.client_id,
            redirect_uri: &self.redirect_uri,
            response_type: "code",
            scope: &scope,
            state: state.as_str(),
            access_type: "offline",
            include_granted_scopes: "true",
            prompt: "consent",
            code_challenge,
            code_challenge_method: "S256",
        };

        // Plain strings only; serde_urlencoded cannot fail on this struct
        let query = serde_urlencoded::to_string(&params).unwrap_or_default();
        format!("{}?{}", self.config.auth_uri, query)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuthTokenSet, ExchangeError> {
        info!("Exchanging authorization code for tokens");

        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.redirect_uri),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("code_verifier", code_verifier),
            ])
            .await?;

        if response.refresh_token.is_none() {
            warn!("Google did not return a refresh token; the credential cannot be refreshed");
        }

        let mut tokens = OAuthTokenSet::from_response(response, &self.scope(), Utc::now());

        match self.fetch_email(&tokens.access_token).await {
            Ok(email) => tokens.email = email,
            Err(err) => warn!(error = %err, "Failed to fetch Google account email"),
        }

        debug!(?tokens, "Token exchange succeeded");
        Ok(tokens)
    }

    async fn refresh(&self, tokens: &OAuthTokenSet) -> Result<OAuthTokenSet, ExchangeError> {
        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            return Err(ExchangeError::InvalidGrant(
                "credential has no refresh token".to_string(),
            ));
        };

        info!("Refreshing Google access token");

        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
            ])
            .await?;

        Ok(tokens.refreshed(response, Utc::now()))
    }

    async fn revoke(&self, token: &str) -> Result<(), ExchangeError> {
        info!("Revoking token at Google");

        let response = self
            .http
            .post(&self.config.revoke_uri)
            .form(&[("token", token)])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ProviderErrorBody>(&body) {
            Ok(error) => error.into_exchange_error(status),
            Err(_) => ExchangeError::Provider {
                status,
                message: body,
            },
        })
    }
}
