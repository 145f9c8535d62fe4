use reqwest::StatusCode;
use thiserror::Error;

/// Failures of the per-client authorization state machine.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid client id: {0}")]
    InvalidClientId(String),

    /// The callback carried a nonce that is unknown, already used, superseded
    /// or past its pending lifetime.
    #[error("OAuth state is unknown, expired or already used")]
    InvalidOAuthState,

    #[error("client is already authenticated")]
    AlreadyAuthenticated,

    #[error("authorization was denied by the provider: {0}")]
    AuthorizationDenied(String),

    #[error("token exchange failed: {0}")]
    ExchangeFailure(#[from] ExchangeError),
}

/// Failures talking to the OAuth provider's token, revoke and userinfo
/// endpoints.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The code or refresh token was rejected (`invalid_grant`).
    #[error("grant rejected by provider: {0}")]
    InvalidGrant(String),

    #[error("could not reach provider: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {message}")]
    Provider { status: StatusCode, message: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ExchangeError {
    /// Worth retrying the same grant later; the grant itself was not judged.
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::Transport(_) => true,
            ExchangeError::Provider { status, .. } => status.is_server_error(),
            ExchangeError::InvalidGrant(_) | ExchangeError::MalformedResponse(_) => false,
        }
    }
}

/// Standard OAuth error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ProviderErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ProviderErrorBody {
    pub(crate) fn into_exchange_error(self, status: StatusCode) -> ExchangeError {
        let message = match self.error_description {
            Some(description) => format!("{}: {}", self.error, description),
            None => self.error.clone(),
        };

        if self.error == "invalid_grant" {
            ExchangeError::InvalidGrant(message)
        } else {
            ExchangeError::Provider { status, message }
        }
    }
}
