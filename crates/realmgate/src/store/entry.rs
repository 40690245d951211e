//! Stored token records

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tokens for one federated source
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEntry {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub discovery_url: String,
    /// Access token expiry, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl fmt::Debug for TokenEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEntry")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("discovery_url", &self.discovery_url)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl TokenEntry {
    pub fn new(access_token: impl Into<String>, discovery_url: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            discovery_url: discovery_url.into(),
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Unknown expiry counts as not expired
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Every source's tokens for one user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenInformation {
    /// Hashed username, also the storage file name
    pub id: String,
    pub token_entries: BTreeMap<String, TokenEntry>,
}

impl TokenInformation {
    #[must_use]
    pub fn entry(&self, source_id: &str) -> Option<&TokenEntry> {
        self.token_entries.get(source_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token_entries.is_empty()
    }
}
