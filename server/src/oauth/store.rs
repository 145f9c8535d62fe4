use dashmap::DashMap;

use crate::oauth::{
    error::AuthError,
    session::{ClientId, ClientSession, Nonce},
};

/// A mutation applied to a copy of a session. The copy is only written back
/// when the mutation returns `Ok`.
pub type Mutation<'a> = &'a mut dyn FnMut(&mut ClientSession) -> Result<(), AuthError>;

/// Storage for per-client sessions and the nonce index that routes callbacks
/// back to their client.
///
/// Implementations must apply `upsert` atomically per client and keep the
/// nonce index consistent with each session's pending nonce.
pub trait SessionStore: Send + Sync {
    fn get(&self, client_id: &ClientId) -> Option<ClientSession>;

    /// Apply `mutation` to the client's session, creating an unauthenticated
    /// one on first contact. Returns the committed session.
    fn upsert(&self, client_id: &ClientId, mutation: Mutation<'_>)
        -> Result<ClientSession, AuthError>;

    fn remove(&self, client_id: &ClientId) -> Option<ClientSession>;

    /// Remove `nonce` from the index and return the client it was issued to.
    /// Only one caller can ever claim a given nonce.
    fn claim_nonce(&self, nonce: &Nonce) -> Option<ClientId>;

    fn client_ids(&self) -> Vec<ClientId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store. Sessions do not survive a restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<ClientId, ClientSession>,
    nonces: DashMap<Nonce, ClientId>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, client_id: &ClientId) -> Option<ClientSession> {
        self.sessions.get(client_id).map(|entry| entry.value().clone())
    }

    fn upsert(
        &self,
        client_id: &ClientId,
        mutation: Mutation<'_>,
    ) -> Result<ClientSession, AuthError> {
        // The entry guard holds the shard lock for the whole read-modify-write
        let mut entry = self
            .sessions
            .entry(client_id.clone())
            .or_insert_with(|| ClientSession::new(client_id.clone()));

        let mut draft = entry.value().clone();
        mutation(&mut draft)?;

        let previous = entry.oauth_state_nonce().cloned();
        let next = draft.oauth_state_nonce().cloned();
        if previous != next {
            if let Some(previous) = previous {
                self.nonces.remove(&previous);
            }
            if let Some(next) = next {
                self.nonces.insert(next, client_id.clone());
            }
        }

        *entry.value_mut() = draft;
        Ok(entry.value().clone())
    }

    fn remove(&self, client_id: &ClientId) -> Option<ClientSession> {
        let (_, session) = self.sessions.remove(client_id)?;
        if let Some(nonce) = session.oauth_state_nonce() {
            self.nonces.remove(nonce);
        }
        Some(session)
    }

    fn claim_nonce(&self, nonce: &Nonce) -> Option<ClientId> {
        self.nonces.remove(nonce).map(|(_, client_id)| client_id)
    }

    fn client_ids(&self) -> Vec<ClientId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
