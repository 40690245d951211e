//! In-flight OAuth authorization requests, keyed by `state`

use std::fmt;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};

use super::error::{Result, TokenStoreError};

/// How long a login may take between redirect and callback
pub const DEFAULT_STATE_LIFETIME: Duration = Duration::from_secs(600);

/// Pending authorization for one federated source
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationState {
    pub source_id: String,
    pub client_id: String,
    pub secret: String,
    pub discovery_url: String,
    pub expires_at: Instant,
}

impl fmt::Debug for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationState")
            .field("source_id", &self.source_id)
            .field("client_id", &self.client_id)
            .field("discovery_url", &self.discovery_url)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl AuthorizationState {
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Concurrent `state -> AuthorizationState` map
///
/// Never persisted. Lookups drop expired entries before answering.
#[derive(Debug)]
pub struct AuthorizationStateMap {
    states: DashMap<String, AuthorizationState>,
    lifetime: Duration,
    rng: SystemRandom,
}

impl Default for AuthorizationStateMap {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_LIFETIME)
    }
}

impl AuthorizationStateMap {
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            states: DashMap::new(),
            lifetime,
            rng: SystemRandom::new(),
        }
    }

    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Register a pending authorization under a fresh random `state`
    pub fn issue(
        &self,
        source_id: impl Into<String>,
        client_id: impl Into<String>,
        secret: impl Into<String>,
        discovery_url: impl Into<String>,
    ) -> Result<String> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| TokenStoreError::Crypto("system random source failed".into()))?;
        let state = URL_SAFE_NO_PAD.encode(bytes);

        self.put(
            state.clone(),
            AuthorizationState {
                source_id: source_id.into(),
                client_id: client_id.into(),
                secret: secret.into(),
                discovery_url: discovery_url.into(),
                expires_at: Instant::now() + self.lifetime,
            },
        );
        Ok(state)
    }

    pub fn put(&self, state: impl Into<String>, value: AuthorizationState) {
        self.states.insert(state.into(), value);
    }

    /// Unexpired entry for `state`, left in place
    #[must_use]
    pub fn get(&self, state: &str) -> Option<AuthorizationState> {
        self.sweep();
        self.states.get(state).map(|entry| entry.value().clone())
    }

    /// Remove and return the unexpired entry for `state`
    #[must_use]
    pub fn take(&self, state: &str) -> Option<AuthorizationState> {
        self.sweep();
        self.states.remove(state).map(|(_, value)| value)
    }

    /// Drop expired entries, returning how many went
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.states.len();
        self.states.retain(|_, value| !value.is_expired(now));
        let removed = before.saturating_sub(self.states.len());
        if removed > 0 {
            tracing::debug!(removed, "Swept expired authorization states");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
