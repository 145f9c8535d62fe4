//! OAuth provider abstraction
//!
//! The state machine only talks to this trait, so tests can swap in a scripted
//! provider and production uses [`google::GoogleOAuthClient`].

pub mod google;

use async_trait::async_trait;

use crate::oauth::{error::ExchangeError, session::Nonce, token::OAuthTokenSet};

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Build the consent URL for an attempt. Pure; no network.
    fn authorize_url(&self, state: &Nonce, code_challenge: &str) -> String;

    /// Exchange an authorization code for a credential.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuthTokenSet, ExchangeError>;

    /// Mint a fresh access token from the credential's refresh token.
    async fn refresh(&self, tokens: &OAuthTokenSet) -> Result<OAuthTokenSet, ExchangeError>;

    /// Revoke a token at the provider.
    async fn revoke(&self, token: &str) -> Result<(), ExchangeError>;
}
