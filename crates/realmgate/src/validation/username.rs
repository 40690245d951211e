//! Username/password validator with realm fallthrough and result caching

use std::sync::Arc;

use async_trait::async_trait;

use super::{ErrorKind, Principal, Result, TokenValidator, ValidationContext, ValidationOutcome};
use crate::cache::{CachedToken, CredentialHash, ValidationCache};
use crate::credential::{CredentialKind, RawCredential};
use crate::trust::RealmLogin;

/// Checks username/password credentials against an ordered list of realms
///
/// The first realm that accepts wins. Successful validations are cached by
/// a hash of `(username, password, nonce, created)`, so an identical
/// credential inside the cache horizon never reaches a realm again.
#[derive(Debug, Clone)]
pub struct UsernamePasswordValidator {
    realms: Vec<Arc<dyn RealmLogin>>,
    cache: Arc<ValidationCache>,
}

impl UsernamePasswordValidator {
    pub fn new(realms: Vec<Arc<dyn RealmLogin>>, cache: Arc<ValidationCache>) -> Self {
        Self { realms, cache }
    }

    #[must_use]
    pub fn realm_names(&self) -> Vec<&str> {
        self.realms.iter().map(|r| r.name()).collect()
    }

    #[must_use]
    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }
}

#[async_trait]
impl TokenValidator for UsernamePasswordValidator {
    fn kind(&self) -> CredentialKind {
        CredentialKind::UsernamePassword
    }

    fn can_handle(&self, credential: &RawCredential) -> bool {
        matches!(credential, RawCredential::UsernamePassword(_))
    }

    async fn validate(
        &self,
        credential: &RawCredential,
        context: &ValidationContext,
    ) -> Result<ValidationOutcome> {
        let RawCredential::UsernamePassword(upt) = credential else {
            return Ok(ValidationOutcome::invalid(ErrorKind::DecodeError));
        };

        let hash = CredentialHash::username_token(
            &upt.username,
            upt.password.as_deref(),
            upt.nonce.as_deref(),
            upt.created.as_deref(),
        );

        if let Some(cached) = self.cache.get(hash)
            && let Some(realm) = cached
                .realm()
                .filter(|realm| context.realm.as_deref().is_none_or(|wanted| wanted == *realm))
        {
            tracing::debug!(username = %upt.username, realm = %realm, "Username token served from cache");
            return Ok(
                ValidationOutcome::valid(
                    Principal::new(cached.token.clone()).with_attributes(cached.attributes.clone()),
                    realm,
                )
                .from_cache(),
            );
        }

        let Some(password) = upt.password.as_deref() else {
            tracing::warn!(username = %upt.username, "Username token without password");
            return Ok(ValidationOutcome::invalid(ErrorKind::CredentialRejected));
        };

        let candidates: Vec<&Arc<dyn RealmLogin>> = self
            .realms
            .iter()
            .filter(|r| context.serves(r.name()))
            .collect();

        if candidates.is_empty() {
            tracing::warn!(realm = ?context.realm, "No matching realm configured for username token");
            return Ok(ValidationOutcome::invalid(ErrorKind::RealmNotFound));
        }

        for realm in candidates {
            match realm.login(&upt.username, password) {
                Ok(Some(attributes)) => {
                    tracing::info!(username = %upt.username, realm = %realm.name(), "Username token validated");
                    self.cache.insert_if_absent(
                        CachedToken::new(hash, upt.username.clone(), realm.name())
                            .with_attributes(attributes.clone()),
                    );
                    let principal = Principal::new(upt.username.clone()).with_attributes(attributes);
                    return Ok(ValidationOutcome::valid(principal, realm.name()));
                }
                Ok(None) => {
                    tracing::debug!(username = %upt.username, realm = %realm.name(), "Realm rejected credential");
                }
                Err(e) => {
                    tracing::warn!(realm = %realm.name(), error = %e, "Realm login failed, trying next realm");
                }
            }
        }

        tracing::warn!(username = %upt.username, "No realm accepted username token");
        Ok(ValidationOutcome::invalid(ErrorKind::CredentialRejected))
    }
}
