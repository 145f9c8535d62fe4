use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::oauth::{
    error::AuthError,
    provider::OAuthProvider,
    session::{AuthState, ClientId, ClientSession, Nonce, PendingAuthorization, Phase},
    store::SessionStore,
    token::OAuthTokenSet,
    utils::generate_pkce_pair,
};

/// A consent URL issued for one authorization attempt.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub client_id: ClientId,
    pub nonce: Nonce,
    pub authorization_url: String,
}

#[derive(Debug, Clone)]
pub struct CompletedAuthorization {
    pub client_id: ClientId,
    pub email: Option<String>,
}

/// Drives each client through UNAUTHENTICATED -> PENDING -> AUTHENTICATED.
///
/// AUTHENTICATED is only reachable from PENDING via [`Authorizer::complete`]
/// with the matching nonce and a successful code exchange.
/// How long a claimed attempt may sit in its code exchange before the sweep
/// treats it as abandoned.
pub const DEFAULT_EXCHANGE_GRACE_SECS: i64 = 30;

#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn OAuthProvider>,
    pending_ttl: Duration,
    exchange_grace: Duration,
}

impl Authorizer {
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn OAuthProvider>,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            pending_ttl,
            exchange_grace: Duration::seconds(DEFAULT_EXCHANGE_GRACE_SECS),
        }
    }

    /// Extra time a claimed attempt gets on top of the pending lifetime,
    /// normally the HTTP timeout of the token exchange.
    pub fn with_exchange_grace(mut self, grace: Duration) -> Self {
        self.exchange_grace = grace;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn session(&self, client_id: &ClientId) -> Option<ClientSession> {
        self.store.get(client_id)
    }

    /// Unknown clients are unauthenticated.
    pub fn status(&self, client_id: &ClientId) -> AuthState {
        self.store
            .get(client_id)
            .map(|session| session.state())
            .unwrap_or(AuthState::Unauthenticated)
    }

    /// Start a new authorization attempt.
    ///
    /// From PENDING this supersedes the previous attempt; its nonce stops
    /// being accepted. Refused for a client that is already authenticated.
    #[tracing::instrument(skip(self, client_id), fields(client_id = %client_id))]
    pub fn begin(&self, client_id: &ClientId) -> Result<AuthorizationRequest, AuthError> {
        let nonce = Nonce::generate();
        let (code_verifier, code_challenge) = generate_pkce_pair();
        let authorization_url = self.provider.authorize_url(&nonce, &code_challenge);

        self.store.upsert(client_id, &mut |session| {
            if session.state() == AuthState::Authenticated {
                return Err(AuthError::AlreadyAuthenticated);
            }

            session.set_phase(Phase::Pending(PendingAuthorization {
                nonce: nonce.clone(),
                code_verifier: code_verifier.clone(),
                authorization_url: authorization_url.clone(),
                created_at: Utc::now(),
                claimed: false,
            }));
            Ok(())
        })?;

        info!(nonce = ?nonce, "Authorization attempt started");

        Ok(AuthorizationRequest {
            client_id: client_id.clone(),
            nonce,
            authorization_url,
        })
    }

    /// The consent URL of the client's live attempt, or a new attempt when
    /// there is none. Repeated calls while PENDING hand back the same URL.
    pub fn pending_or_begin(
        &self,
        client_id: &ClientId,
    ) -> Result<AuthorizationRequest, AuthError> {
        let now = Utc::now();

        if let Some(pending) = self
            .store
            .get(client_id)
            .and_then(|session| session.pending().cloned())
        {
            if !pending.claimed && !pending.is_expired_at(self.pending_ttl, now) {
                return Ok(AuthorizationRequest {
                    client_id: client_id.clone(),
                    nonce: pending.nonce,
                    authorization_url: pending.authorization_url,
                });
            }
        }

        self.begin(client_id)
    }

    /// Finish an attempt from the provider callback.
    ///
    /// The nonce is consumed before the exchange starts, so a replayed or
    /// concurrent callback with the same `state` is rejected without
    /// contacting the provider.
    #[tracing::instrument(skip_all)]
    pub async fn complete(
        &self,
        state: &str,
        code: &str,
    ) -> Result<CompletedAuthorization, AuthError> {
        let nonce = Nonce::from_callback(state);
        let client_id = self.claim(&nonce)?;
        let now = Utc::now();

        let mut verifier = None;
        self.store.upsert(&client_id, &mut |session| {
            let Some(pending) = session.pending() else {
                return Err(AuthError::InvalidOAuthState);
            };
            if pending.nonce != nonce || pending.claimed {
                return Err(AuthError::InvalidOAuthState);
            }

            if pending.is_expired_at(self.pending_ttl, now) {
                session.set_phase(Phase::Unauthenticated);
                return Ok(());
            }

            let mut claimed = pending.clone();
            claimed.claimed = true;
            verifier = Some(claimed.code_verifier.clone());
            session.set_phase(Phase::Pending(claimed));
            Ok(())
        })
        .inspect_err(|_| {
            warn!(target: "security", client_id = %client_id, nonce = ?nonce, "Callback nonce does not match the pending attempt");
        })?;

        let Some(verifier) = verifier else {
            warn!(target: "security", client_id = %client_id, nonce = ?nonce, "Callback arrived after the pending attempt expired");
            return Err(AuthError::InvalidOAuthState);
        };

        match self.provider.exchange_code(code, &verifier).await {
            Ok(tokens) => {
                let email = tokens.email.clone();
                // A newer attempt may have started while the exchange was in
                // flight; the successful exchange still wins.
                self.store.upsert(&client_id, &mut |session| {
                    session.set_phase(Phase::Authenticated(tokens.clone()));
                    Ok(())
                })?;

                info!(client_id = %client_id, email = ?email, "Client authenticated");
                Ok(CompletedAuthorization { client_id, email })
            }
            Err(err) => {
                warn!(client_id = %client_id, error = %err, "Token exchange failed");
                self.revert_if_current(&client_id, &nonce)?;
                Err(AuthError::ExchangeFailure(err))
            }
        }
    }

    /// The provider redirected back with `error=...` instead of a code.
    #[tracing::instrument(skip(self, state))]
    pub fn cancel(&self, state: &str, reason: &str) -> Result<ClientId, AuthError> {
        let nonce = Nonce::from_callback(state);
        let client_id = self.claim(&nonce)?;

        self.revert_if_current(&client_id, &nonce)?;
        info!(client_id = %client_id, "Authorization attempt cancelled by provider");
        Ok(client_id)
    }

    /// A credential fit for an API call, refreshing it when it has expired.
    ///
    /// Returns `None` when the client is not authenticated, or when its
    /// credential expired and could not be refreshed (the client is reverted
    /// to UNAUTHENTICATED in that case).
    pub async fn usable_credential(&self, client_id: &ClientId) -> Option<OAuthTokenSet> {
        let tokens = self.store.get(client_id)?.credential()?.clone();

        if !tokens.is_expired() {
            return Some(tokens);
        }

        if !tokens.can_refresh() {
            info!(client_id = %client_id, "Credential expired without a refresh token");
            self.invalidate_credential(client_id, &tokens.access_token);
            return None;
        }

        match self.provider.refresh(&tokens).await {
            Ok(refreshed) => {
                let result = self.store.upsert(client_id, &mut |session| {
                    match session.credential() {
                        Some(current) if current.access_token == tokens.access_token => {
                            session.set_phase(Phase::Authenticated(refreshed.clone()));
                            Ok(())
                        }
                        // Revoked or re-authenticated meanwhile
                        _ => Err(AuthError::InvalidOAuthState),
                    }
                });

                match result {
                    Ok(_) => {
                        debug!(client_id = %client_id, "Credential refreshed");
                        Some(refreshed)
                    }
                    Err(_) => self
                        .store
                        .get(client_id)
                        .and_then(|session| session.credential().cloned()),
                }
            }
            Err(err) => {
                warn!(client_id = %client_id, error = %err, "Credential refresh failed");
                self.invalidate_credential(client_id, &tokens.access_token);
                None
            }
        }
    }

    /// The provider rejected `access_token`. Drops the client's credential
    /// only if it is still that token; a credential refreshed or re-issued in
    /// the meantime survives. Returns whether anything was dropped.
    pub fn invalidate(&self, client_id: &ClientId, access_token: &str) -> bool {
        self.invalidate_credential(client_id, access_token)
    }

    /// Drop the client's credential and revoke it at the provider.
    ///
    /// Provider revocation is best effort; the local credential is gone either
    /// way. Returns whether a credential was held.
    #[tracing::instrument(skip(self, client_id), fields(client_id = %client_id))]
    pub async fn revoke(&self, client_id: &ClientId) -> Result<bool, AuthError> {
        let mut revoked = None;
        self.store.upsert(client_id, &mut |session| {
            revoked = session.credential().cloned();
            if revoked.is_some() {
                session.set_phase(Phase::Unauthenticated);
            }
            Ok(())
        })?;

        let Some(tokens) = revoked else {
            return Ok(false);
        };

        let token = tokens
            .refresh_token
            .as_deref()
            .unwrap_or(&tokens.access_token);
        if let Err(err) = self.provider.revoke(token).await {
            warn!(error = %err, "Provider revocation failed; local credential dropped anyway");
        }

        info!("Credential revoked");
        Ok(true)
    }

    /// Revert every PENDING attempt older than the pending lifetime. Returns
    /// how many were reverted.
    ///
    /// A claimed attempt is mid-exchange, so it gets the exchange grace on
    /// top. One still here after that lost its callback request.
    pub fn sweep_expired_pending(&self, now: DateTime<Utc>) -> usize {
        let mut swept = 0;
        let claimed_ttl = self.pending_ttl + self.exchange_grace;

        for client_id in self.store.client_ids() {
            let result = self.store.upsert(&client_id, &mut |session| {
                let Some(pending) = session.pending() else {
                    return Err(AuthError::InvalidOAuthState);
                };
                let ttl = if pending.claimed {
                    claimed_ttl
                } else {
                    self.pending_ttl
                };
                if !pending.is_expired_at(ttl, now) {
                    return Err(AuthError::InvalidOAuthState);
                }

                session.set_phase(Phase::Unauthenticated);
                Ok(())
            });

            if result.is_ok() {
                debug!(client_id = %client_id, "Expired pending authorization");
                swept += 1;
            }
        }

        swept
    }

    fn claim(&self, nonce: &Nonce) -> Result<ClientId, AuthError> {
        self.store.claim_nonce(nonce).ok_or_else(|| {
            warn!(target: "security", nonce = ?nonce, "Callback with unknown, replayed or superseded state");
            AuthError::InvalidOAuthState
        })
    }

    fn revert_if_current(&self, client_id: &ClientId, nonce: &Nonce) -> Result<(), AuthError> {
        self.store.upsert(client_id, &mut |session| {
            if session.oauth_state_nonce() == Some(nonce) {
                session.set_phase(Phase::Unauthenticated);
            }
            Ok(())
        })?;
        Ok(())
    }

    fn invalidate_credential(&self, client_id: &ClientId, access_token: &str) -> bool {
        let mut dropped = false;
        let result = self.store.upsert(client_id, &mut |session| {
            dropped = session
                .credential()
                .is_some_and(|tokens| tokens.access_token == access_token);
            if dropped {
                session.set_phase(Phase::Unauthenticated);
            }
            Ok(())
        });

        if result.is_ok() && dropped {
            info!(client_id = %client_id, "Credential invalidated");
            true
        } else {
            debug!(client_id = %client_id, "Credential already replaced; nothing to invalidate");
            false
        }
    }
}
