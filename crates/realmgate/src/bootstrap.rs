//! Building the long-lived security context from configuration

use std::sync::Arc;

use crate::cache::ValidationCache;
use crate::config::{Config, OidcConfig, PolicyConfig, RealmsConfig, TokenStoreConfig};
use crate::error::{Error, Result};
use crate::oidc::{HttpOidcProvider, JwksCache, OidcProviderClient, OidcValidator};
use crate::orchestrator::{OidcSource, SecurityContext};
use crate::policy::{ContextPolicyEngine, FileConfigStore};
use crate::store::{AesGcmEncryptor, AuthorizationStateMap, EncryptedTokenStore};
use crate::trust::{
    HttpTicketValidationClient, RealmLogin, StaticRealm, TicketClientConfig, TrustStoreVerifier,
};
use crate::validation::{
    CertificateValidator, CertificateValidatorConfig, TicketValidator, UsernamePasswordValidator,
    ValidatorError, ValidatorRegistry,
};

/// Open the encrypted token store, creating the key on first use
pub fn create_token_store(config: &TokenStoreConfig) -> Result<EncryptedTokenStore> {
    let encryptor = AesGcmEncryptor::load_or_generate(&config.key_file)?;
    Ok(EncryptedTokenStore::new(&config.base_dir, Arc::new(encryptor))?)
}

#[must_use]
pub fn create_policy_store(config: &PolicyConfig) -> FileConfigStore {
    FileConfigStore::new(&config.file)
}

pub fn create_policy_engine(store: &FileConfigStore) -> Result<ContextPolicyEngine> {
    Ok(ContextPolicyEngine::from_store(store)?)
}

fn static_realms(config: &RealmsConfig) -> Vec<Arc<dyn RealmLogin>> {
    config
        .ordered_names()
        .into_iter()
        .map(|name| {
            let users = config.users.get(name).into_iter().flatten();
            let realm = users.fold(StaticRealm::new(name), |realm, (user, password)| {
                realm.with_user(user, password)
            });
            Arc::new(realm) as Arc<dyn RealmLogin>
        })
        .collect()
}

async fn create_oidc(config: &OidcConfig) -> Result<(OidcValidator, OidcSource)> {
    let validator_config = config.validator_config();
    let provider =
        HttpOidcProvider::discover(&config.issuer, validator_config.clone(), config.http_timeout)
            .await?;
    let provider: Arc<dyn OidcProviderClient> = Arc::new(provider);
    let keys = JwksCache::with_timeout(config.jwks_ttl, config.http_timeout)?;

    let source = OidcSource {
        discovery_url: config.issuer.clone(),
        provider: Arc::clone(&provider),
    };
    Ok((
        OidcValidator::new(validator_config, provider, Arc::new(keys)),
        source,
    ))
}

/// Register one validator per configured credential kind
///
/// OIDC discovery runs here, so an unreachable issuer fails startup.
pub async fn create_security_context(
    config: &Config,
    policy: Arc<ContextPolicyEngine>,
) -> Result<SecurityContext> {
    let cache = Arc::new(ValidationCache::new(config.cache));
    let mut registry = ValidatorRegistry::new();
    let mut oidc_source = None;

    if let Some(ticket) = &config.ticket {
        let client = HttpTicketValidationClient::new(
            TicketClientConfig::new(&ticket.validation_url)
                .with_tls(ticket.tls.clone())
                .with_timeout(ticket.timeout),
        );
        registry.register(Arc::new(TicketValidator::new(
            Arc::new(client),
            &ticket.service_url,
            &ticket.realm,
        )));
    }

    if let Some(certificate) = &config.certificate {
        let trust = TrustStoreVerifier::load(&certificate.trust_store)
            .map_err(|e| ValidatorError::TrustStore(e.to_string()))?;
        let validator_config = certificate.subject_constraints.iter().fold(
            CertificateValidatorConfig::new(&certificate.realm),
            |acc, pattern| acc.with_subject_constraint(pattern),
        );
        registry.register(Arc::new(CertificateValidator::new(
            Arc::new(trust),
            validator_config,
        )?));
    }

    let realms = static_realms(&config.realms);
    if !realms.is_empty() {
        registry.register(Arc::new(UsernamePasswordValidator::new(realms, cache)));
    }

    if let Some(oidc) = &config.oidc {
        let (validator, source) = create_oidc(oidc).await?;
        registry.register(Arc::new(validator));
        oidc_source = Some((oidc.source_id.clone(), source));
    }

    if registry.is_empty() {
        return Err(Error::Config("no credential validators configured".into()));
    }

    let store = create_token_store(&config.token_store)?;
    let mut context = SecurityContext::new(policy, registry)
        .with_token_store(Arc::new(store))
        .with_states(Arc::new(AuthorizationStateMap::new(
            config.token_store.state_ttl,
        )));
    if let Some((source_id, source)) = oidc_source {
        context = context.with_oidc_source(source_id, source);
    }

    tracing::info!(
        validators = ?context.validators.kinds(),
        token_store = %config.token_store.base_dir.display(),
        "Security context ready"
    );
    Ok(context)
}
