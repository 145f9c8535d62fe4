use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::oauth::{error::AuthError, token::OAuthTokenSet, utils::random_token};

/// Longest client identifier accepted from callers.
pub const MAX_CLIENT_ID_LEN: usize = 128;

/// Opaque, caller-chosen identifier that partitions credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(AuthError::InvalidClientId("client id is empty".to_string()));
        }
        if trimmed.len() > MAX_CLIENT_ID_LEN {
            return Err(AuthError::InvalidClientId(format!(
                "client id is longer than {MAX_CLIENT_ID_LEN} bytes"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(AuthError::InvalidClientId(
                "client id contains control characters".to_string(),
            ));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Fresh random identifier for clients that did not bring their own.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClientId {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClientId> for String {
    fn from(value: ClientId) -> Self {
        value.0
    }
}

/// Unguessable value sent as the OAuth `state` parameter.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    pub fn generate() -> Self {
        Self(random_token(32))
    }

    /// Wrap the `state` echoed back on the callback. Whether it is known is
    /// for the store to decide.
    pub fn from_callback(state: &str) -> Self {
        Self(state.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix that is safe to put in logs.
    pub fn fingerprint(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({}..)", self.fingerprint())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Pending,
    Authenticated,
}

impl AuthState {
    /// Wording used by the `check_authentication_status` tool.
    pub fn describe(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "not authenticated",
            AuthState::Pending => "pending",
            AuthState::Authenticated => "authenticated",
        }
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthState::Unauthenticated => "UNAUTHENTICATED",
            AuthState::Pending => "PENDING",
            AuthState::Authenticated => "AUTHENTICATED",
        };
        f.write_str(s)
    }
}

/// An authorization attempt waiting for the provider callback.
#[derive(Clone, Debug)]
pub struct PendingAuthorization {
    pub nonce: Nonce,
    /// PKCE code verifier, sent with the code exchange
    pub code_verifier: String,
    /// Consent URL handed to the user
    pub authorization_url: String,
    pub created_at: DateTime<Utc>,
    /// Set once the callback has consumed the nonce and the exchange is in
    /// flight
    pub claimed: bool,
}

impl PendingAuthorization {
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now >= self.created_at + ttl
    }
}

/// Where a client is in the authorization flow. The data each state needs
/// lives inside it, so a credential without `Authenticated` or a nonce
/// without `Pending` cannot be represented.
#[derive(Clone, Debug, Default)]
pub enum Phase {
    #[default]
    Unauthenticated,
    Pending(PendingAuthorization),
    Authenticated(OAuthTokenSet),
}

/// Everything the broker knows about one client.
#[derive(Clone, Debug)]
pub struct ClientSession {
    pub client_id: ClientId,
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClientSession {
    pub fn new(client_id: ClientId) -> Self {
        let now = Utc::now();
        Self {
            client_id,
            phase: Phase::Unauthenticated,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> AuthState {
        match self.phase {
            Phase::Unauthenticated => AuthState::Unauthenticated,
            Phase::Pending(_) => AuthState::Pending,
            Phase::Authenticated(_) => AuthState::Authenticated,
        }
    }

    pub fn credential(&self) -> Option<&OAuthTokenSet> {
        match &self.phase {
            Phase::Authenticated(tokens) => Some(tokens),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&PendingAuthorization> {
        match &self.phase {
            Phase::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    /// The OAuth `state` this client is waiting on, if any.
    pub fn oauth_state_nonce(&self) -> Option<&Nonce> {
        self.pending().map(|pending| &pending.nonce)
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }
}
