//! Request authentication
//!
//! [`Authenticator`] ties the pieces together: resolve the request path to
//! a policy bin, try each acceptable credential kind in the bin's order,
//! validate the first credential found, enforce required attributes, and
//! keep OIDC tokens for later federated calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::constants::{SOURCE_ID_PARAM, STATE_PARAM};
use crate::credential::{CredentialKind, RawCredential};
use crate::error::{Error, Result};
use crate::extract::{Extraction, RequestEnvelope, extract};
use crate::oidc::{OidcProviderClient, unix_now};
use crate::policy::{ContextPolicyEngine, RequiredAttributes, Resolution};
use crate::store::{AuthorizationStateMap, EncryptedTokenStore, TokenEntry};
use crate::validation::{
    ErrorKind, IssuedTokens, Principal, ValidationContext, ValidatorRegistry,
};

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub principal: Principal,
    pub realm: String,
    pub kind: CredentialKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Path is on the whitelist
    Whitelisted,
    /// No policy covers the path
    Unprotected,
    Authenticated(Subject),
    /// `reason` is `None` when no acceptable credential was presented
    Unauthorized { reason: Option<ErrorKind> },
}

impl AuthDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        !matches!(self, Self::Unauthorized { .. })
    }

    #[must_use]
    pub const fn subject(&self) -> Option<&Subject> {
        match self {
            Self::Authenticated(subject) => Some(subject),
            _ => None,
        }
    }
}

/// Federated OIDC source tokens can be refreshed against
#[derive(Debug, Clone)]
pub struct OidcSource {
    pub discovery_url: String,
    pub provider: Arc<dyn OidcProviderClient>,
}

/// Long-lived resources shared by every request
#[derive(Debug)]
pub struct SecurityContext {
    pub policy: Arc<ContextPolicyEngine>,
    pub validators: ValidatorRegistry,
    pub token_store: Option<Arc<EncryptedTokenStore>>,
    pub states: Arc<AuthorizationStateMap>,
    pub oidc_sources: HashMap<String, OidcSource>,
}

impl SecurityContext {
    #[must_use]
    pub fn new(policy: Arc<ContextPolicyEngine>, validators: ValidatorRegistry) -> Self {
        Self {
            policy,
            validators,
            token_store: None,
            states: Arc::new(AuthorizationStateMap::default()),
            oidc_sources: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_token_store(mut self, store: Arc<EncryptedTokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_states(mut self, states: Arc<AuthorizationStateMap>) -> Self {
        self.states = states;
        self
    }

    #[must_use]
    pub fn with_oidc_source(mut self, source_id: impl Into<String>, source: OidcSource) -> Self {
        self.oidc_sources.insert(source_id.into(), source);
        self
    }

    fn token_store(&self) -> Result<&EncryptedTokenStore> {
        self.token_store
            .as_deref()
            .ok_or_else(|| Error::Config("no token store configured".into()))
    }
}

/// Federated source an OIDC login is for
struct SourceBinding {
    source_id: String,
    discovery_url: Option<String>,
}

/// Each required attribute must be present with an equal value
fn satisfies(principal: &Principal, required: &RequiredAttributes) -> bool {
    required
        .iter()
        .all(|(key, value)| principal.attribute(key) == Some(value.as_str()))
}

#[derive(Clone)]
pub struct Authenticator {
    context: Arc<SecurityContext>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("validators", &self.context.validators.kinds())
            .field("has_token_store", &self.context.token_store.is_some())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    #[must_use]
    pub const fn new(context: Arc<SecurityContext>) -> Self {
        Self { context }
    }

    #[must_use]
    pub fn context(&self) -> &SecurityContext {
        &self.context
    }

    /// Decide whether `envelope` may proceed
    ///
    /// A presented but invalid credential ends processing with
    /// `Unauthorized`; only when a kind's credential is absent does the
    /// next kind get a turn. `Err` means the system is misconfigured.
    pub async fn authenticate(&self, envelope: &RequestEnvelope) -> Result<AuthDecision> {
        let bin = match self.context.policy.resolve(&envelope.path) {
            Resolution::Bin(bin) => bin,
            Resolution::Whitelisted => return Ok(AuthDecision::Whitelisted),
            Resolution::Unprotected => return Ok(AuthDecision::Unprotected),
        };
        let validation_context = ValidationContext::for_realm(bin.realm.clone());

        for kind in bin.credential_kinds() {
            let credential = match extract(kind, envelope) {
                Extraction::Absent => continue,
                Extraction::Malformed(reason) => {
                    tracing::warn!(path = %envelope.path, kind = %kind, reason = %reason, "Malformed credential");
                    return Ok(AuthDecision::Unauthorized {
                        reason: Some(reason),
                    });
                }
                Extraction::Found(credential) => credential,
            };

            let Some(validator) = self.context.validators.get(kind) else {
                tracing::warn!(kind = %kind, "No validator registered for credential kind");
                continue;
            };
            if !validator.can_handle(&credential) {
                tracing::debug!(kind = %kind, credential = credential.type_name(), "Validator cannot handle credential");
                continue;
            }

            let (credential, binding) = self.bind_source(credential, envelope);
            let outcome = validator.validate(&credential, &validation_context).await?;

            #[cfg(feature = "metrics")]
            crate::observability::record_validation(kind.as_str(), outcome.is_valid());

            if !outcome.is_valid() {
                tracing::warn!(
                    path = %envelope.path,
                    kind = %kind,
                    reason = ?outcome.error,
                    "Credential rejected"
                );
                return Ok(AuthDecision::Unauthorized {
                    reason: Some(outcome.error.unwrap_or(ErrorKind::CredentialRejected)),
                });
            }

            let Some(principal) = outcome.principal else {
                return Ok(AuthDecision::Unauthorized {
                    reason: Some(ErrorKind::CredentialRejected),
                });
            };

            let realm = outcome.realm.unwrap_or_else(|| bin.realm.clone());
            if realm != bin.realm {
                tracing::warn!(realm = %realm, required = %bin.realm, kind = %kind, "Credential validated in another realm");
                return Ok(AuthDecision::Unauthorized {
                    reason: Some(ErrorKind::RealmNotFound),
                });
            }

            if !satisfies(&principal, &bin.required_attributes) {
                tracing::warn!(
                    principal = %principal.name,
                    required = ?bin.required_attributes.keys().collect::<Vec<_>>(),
                    "Principal lacks required attributes"
                );
                return Ok(AuthDecision::Unauthorized {
                    reason: Some(ErrorKind::ClaimsInvalid),
                });
            }

            if let (Some(tokens), Some(binding)) = (outcome.tokens, binding) {
                self.persist_tokens(&principal.name, &binding, tokens)?;
            }

            tracing::info!(principal = %principal.name, realm = %realm, kind = %kind, "Request authenticated");
            return Ok(AuthDecision::Authenticated(Subject {
                principal,
                realm,
                kind,
            }));
        }

        tracing::debug!(path = %envelope.path, realm = %bin.realm, "No acceptable credential presented");
        Ok(AuthDecision::Unauthorized { reason: None })
    }

    /// Attach the federated source an OIDC credential belongs to, taken
    /// from a pending authorization `state` or an explicit source parameter
    fn bind_source(
        &self,
        credential: RawCredential,
        envelope: &RequestEnvelope,
    ) -> (RawCredential, Option<SourceBinding>) {
        let RawCredential::Oidc(mut oidc) = credential else {
            return (credential, None);
        };

        let binding = if let Some(pending) = envelope
            .param(STATE_PARAM)
            .and_then(|state| self.context.states.take(state))
        {
            Some(SourceBinding {
                source_id: pending.source_id,
                discovery_url: Some(pending.discovery_url),
            })
        } else {
            oidc.source_id
                .clone()
                .or_else(|| envelope.param(SOURCE_ID_PARAM).map(str::to_string))
                .map(|source_id| SourceBinding {
                    source_id,
                    discovery_url: None,
                })
        };

        if let Some(binding) = &binding {
            oidc.source_id = Some(binding.source_id.clone());
        }
        (RawCredential::Oidc(oidc), binding)
    }

    fn persist_tokens(
        &self,
        username: &str,
        binding: &SourceBinding,
        tokens: IssuedTokens,
    ) -> Result<()> {
        let Some(store) = self.context.token_store.as_deref() else {
            tracing::debug!(source_id = %binding.source_id, "No token store; tokens not kept");
            return Ok(());
        };

        let discovery_url = binding
            .discovery_url
            .clone()
            .or_else(|| {
                self.context
                    .oidc_sources
                    .get(&binding.source_id)
                    .map(|s| s.discovery_url.clone())
            })
            .unwrap_or_default();

        let mut entry = TokenEntry::new(tokens.access_token, discovery_url);
        entry.refresh_token = tokens.refresh_token;
        entry.expires_at = tokens.expires_at;
        store.create(username, &binding.source_id, entry)?;
        Ok(())
    }

    /// Stored tokens for `source_id`, refreshed first when the access token
    /// has expired and a refresh token is available
    pub async fn refresh_tokens(&self, username: &str, source_id: &str) -> Result<TokenEntry> {
        let store = self.context.token_store()?;
        let entry = store.read_source(username, source_id)?;

        let now = unix_now();
        if !entry.is_expired(now) {
            return Ok(entry);
        }
        let Some(refresh_token) = entry.refresh_token.as_deref() else {
            tracing::warn!(source_id, "Access token expired and no refresh token stored");
            return Ok(entry);
        };

        let source = self.context.oidc_sources.get(source_id).ok_or_else(|| {
            Error::Config(format!("no OIDC provider configured for source '{source_id}'"))
        })?;

        let response = source.provider.refresh(refresh_token).await?;
        let expires_at = response.expires_at(now);
        let refreshed = TokenEntry {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or_else(|| entry.refresh_token.clone()),
            discovery_url: entry.discovery_url.clone(),
            expires_at,
        };
        store.create(username, source_id, refreshed.clone())?;

        tracing::info!(source_id, "Refreshed stored access token");
        Ok(refreshed)
    }
}
