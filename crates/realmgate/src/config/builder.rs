//! Configuration builder

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Error;
use crate::cache::ValidationCacheConfig;
use crate::constants::TOKEN_STORE_DIR;
use crate::oidc::{DEFAULT_CLOCK_SKEW, DEFAULT_JWKS_TTL, OidcValidatorConfig, ResponseType};
use crate::store::DEFAULT_STATE_LIFETIME;
use crate::trust::{DEFAULT_HTTP_TIMEOUT, TlsMaterial};

const DEFAULT_POLICY_FILE: &str = "realmgate-policy.toml";
const DEFAULT_KEY_FILE: &str = "token.key";
const DEFAULT_OIDC_SOURCE: &str = "default";

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub token_store: TokenStoreConfig,
    pub cache: ValidationCacheConfig,
    pub ticket: Option<TicketConfig>,
    pub certificate: Option<CertificateConfig>,
    pub realms: RealmsConfig,
    pub oidc: Option<OidcConfig>,
    pub policy: PolicyConfig,
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Encrypted token store location and OAuth state lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStoreConfig {
    pub base_dir: PathBuf,
    pub key_file: PathBuf,
    pub state_ttl: Duration,
}

impl TokenStoreConfig {
    fn with_base_dir(base_dir: PathBuf, key_file: Option<PathBuf>, state_ttl: Duration) -> Self {
        let key_file = key_file.unwrap_or_else(|| base_dir.join(DEFAULT_KEY_FILE));
        Self {
            base_dir,
            key_file,
            state_ttl,
        }
    }
}

/// CAS-style ticket server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketConfig {
    pub validation_url: String,
    /// Service URL the tickets were issued for
    pub service_url: String,
    pub realm: String,
    pub tls: TlsMaterial,
    pub timeout: Duration,
}

/// Certificate-chain validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateConfig {
    /// PEM or DER anchor file, or a directory of them
    pub trust_store: PathBuf,
    pub realm: String,
    pub subject_constraints: Vec<String>,
}

/// Username/password realms, tried in `order`
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RealmsConfig {
    pub order: Vec<String>,
    /// realm -> username -> password
    pub users: BTreeMap<String, BTreeMap<String, String>>,
}

impl fmt::Debug for RealmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let users: BTreeMap<&str, usize> = self
            .users
            .iter()
            .map(|(realm, users)| (realm.as_str(), users.len()))
            .collect();
        f.debug_struct("RealmsConfig")
            .field("order", &self.order)
            .field("user_counts", &users)
            .finish()
    }
}

impl RealmsConfig {
    /// Realm names in login order: `order` first, then any other realm
    /// that has users
    #[must_use]
    pub fn ordered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.order.iter().map(String::as_str).collect();
        for realm in self.users.keys() {
            if !names.contains(&realm.as_str()) {
                names.push(realm);
            }
        }
        names
    }
}

/// OIDC relying party
#[derive(Clone, PartialEq, Eq)]
pub struct OidcConfig {
    /// Issuer used for discovery
    pub issuer: String,
    /// Name tokens from this provider are stored under
    pub source_id: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub realm: String,
    pub response_type: ResponseType,
    pub check_nonce: bool,
    pub clock_skew: Duration,
    pub jwks_ttl: Duration,
    pub http_timeout: Duration,
}

impl fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcConfig")
            .field("issuer", &self.issuer)
            .field("source_id", &self.source_id)
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("realm", &self.realm)
            .field("response_type", &self.response_type)
            .field("check_nonce", &self.check_nonce)
            .finish_non_exhaustive()
    }
}

impl OidcConfig {
    #[must_use]
    pub fn validator_config(&self) -> OidcValidatorConfig {
        let mut config = OidcValidatorConfig::new(&self.client_id)
            .with_realm(&self.realm)
            .with_response_type(self.response_type)
            .with_nonce_check(self.check_nonce)
            .with_clock_skew(self.clock_skew);
        if let Some(secret) = &self.client_secret {
            config = config.with_client_secret(secret);
        }
        if let Some(uri) = &self.redirect_uri {
            config = config.with_redirect_uri(uri);
        }
        config
    }
}

/// Where the context policy is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub file: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Partially specified ticket section
#[derive(Debug, Clone, Default)]
pub struct TicketSettings {
    pub validation_url: Option<String>,
    pub service_url: Option<String>,
    pub realm: Option<String>,
    pub trust_store: Option<PathBuf>,
    pub identity: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

/// Partially specified certificate section
#[derive(Debug, Clone, Default)]
pub struct CertificateSettings {
    pub trust_store: Option<PathBuf>,
    pub realm: Option<String>,
    pub subject_constraints: Vec<String>,
}

/// Partially specified OIDC section
#[derive(Clone, Default)]
pub struct OidcSettings {
    pub issuer: Option<String>,
    pub source_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub realm: Option<String>,
    pub response_type: Option<ResponseType>,
    pub check_nonce: Option<bool>,
    pub clock_skew: Option<Duration>,
    pub jwks_ttl: Option<Duration>,
    pub http_timeout: Option<Duration>,
}

impl fmt::Debug for OidcSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcSettings")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .finish_non_exhaustive()
    }
}

/// Configuration builder with fluent API
///
/// Sections are optional until [`ConfigBuilder::build`]: a ticket,
/// certificate or OIDC section is only produced once its required fields
/// are set.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    token_store_dir: Option<PathBuf>,
    key_file: Option<PathBuf>,
    state_ttl: Option<Duration>,
    cache: ValidationCacheConfig,
    ticket: TicketSettings,
    certificate: CertificateSettings,
    realms: RealmsConfig,
    oidc: OidcSettings,
    policy_file: Option<PathBuf>,
    log_level: Option<String>,
    json_logs: bool,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn token_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_store_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    #[must_use]
    pub const fn state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache.enabled = enabled;
        self
    }

    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    #[must_use]
    pub const fn cache_max_entries(mut self, max: usize) -> Self {
        self.cache.max_entries = max;
        self
    }

    #[must_use]
    pub fn ticket_validation_url(mut self, url: impl Into<String>) -> Self {
        self.ticket.validation_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn ticket_service_url(mut self, url: impl Into<String>) -> Self {
        self.ticket.service_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn ticket_realm(mut self, realm: impl Into<String>) -> Self {
        self.ticket.realm = Some(realm.into());
        self
    }

    #[must_use]
    pub fn ticket_trust_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.ticket.trust_store = Some(path.into());
        self
    }

    #[must_use]
    pub fn ticket_identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.ticket.identity = Some(path.into());
        self
    }

    #[must_use]
    pub const fn ticket_timeout(mut self, timeout: Duration) -> Self {
        self.ticket.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn certificate_trust_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate.trust_store = Some(path.into());
        self
    }

    #[must_use]
    pub fn certificate_realm(mut self, realm: impl Into<String>) -> Self {
        self.certificate.realm = Some(realm.into());
        self
    }

    /// Replace the subject constraint patterns
    #[must_use]
    pub fn subject_constraints(mut self, patterns: Vec<String>) -> Self {
        self.certificate.subject_constraints = patterns;
        self
    }

    #[must_use]
    pub fn realm_order(mut self, order: Vec<String>) -> Self {
        self.realms.order = order;
        self
    }

    #[must_use]
    pub fn realm_user(
        mut self,
        realm: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.realms
            .users
            .entry(realm.into())
            .or_default()
            .insert(username.into(), password.into());
        self
    }

    #[must_use]
    pub fn oidc_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.oidc.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn oidc_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.oidc.source_id = Some(source_id.into());
        self
    }

    #[must_use]
    pub fn oidc_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.oidc.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn oidc_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.oidc.client_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn oidc_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.oidc.redirect_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn oidc_realm(mut self, realm: impl Into<String>) -> Self {
        self.oidc.realm = Some(realm.into());
        self
    }

    #[must_use]
    pub const fn oidc_response_type(mut self, response_type: ResponseType) -> Self {
        self.oidc.response_type = Some(response_type);
        self
    }

    #[must_use]
    pub const fn oidc_check_nonce(mut self, check: bool) -> Self {
        self.oidc.check_nonce = Some(check);
        self
    }

    #[must_use]
    pub const fn oidc_clock_skew(mut self, skew: Duration) -> Self {
        self.oidc.clock_skew = Some(skew);
        self
    }

    #[must_use]
    pub const fn oidc_jwks_ttl(mut self, ttl: Duration) -> Self {
        self.oidc.jwks_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn oidc_http_timeout(mut self, timeout: Duration) -> Self {
        self.oidc.http_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn policy_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    #[must_use]
    pub const fn json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }

    fn build_ticket(settings: TicketSettings) -> crate::Result<Option<TicketConfig>> {
        let Some(validation_url) = settings.validation_url else {
            return Ok(None);
        };
        let service_url = settings
            .service_url
            .ok_or_else(|| Error::Config("ticket.service_url is required".into()))?;

        let mut tls = TlsMaterial::default();
        if let Some(path) = settings.trust_store {
            tls = tls.with_trust_store(path);
        }
        if let Some(path) = settings.identity {
            tls = tls.with_identity(path);
        }

        Ok(Some(TicketConfig {
            validation_url,
            service_url,
            realm: settings.realm.unwrap_or_else(|| "cas".to_string()),
            tls,
            timeout: settings.timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT),
        }))
    }

    fn build_certificate(settings: CertificateSettings) -> Option<CertificateConfig> {
        let trust_store = settings.trust_store?;
        Some(CertificateConfig {
            trust_store,
            realm: settings.realm.unwrap_or_else(|| "pki".to_string()),
            subject_constraints: settings.subject_constraints,
        })
    }

    fn build_oidc(settings: OidcSettings) -> crate::Result<Option<OidcConfig>> {
        let Some(issuer) = settings.issuer else {
            return Ok(None);
        };
        let client_id = settings
            .client_id
            .ok_or_else(|| Error::Config("oidc.client_id is required".into()))?;

        Ok(Some(OidcConfig {
            issuer,
            source_id: settings
                .source_id
                .unwrap_or_else(|| DEFAULT_OIDC_SOURCE.to_string()),
            client_id,
            client_secret: settings.client_secret,
            redirect_uri: settings.redirect_uri,
            realm: settings.realm.unwrap_or_else(|| "oidc".to_string()),
            response_type: settings.response_type.unwrap_or_default(),
            check_nonce: settings.check_nonce.unwrap_or(true),
            clock_skew: settings.clock_skew.unwrap_or(DEFAULT_CLOCK_SKEW),
            jwks_ttl: settings.jwks_ttl.unwrap_or(DEFAULT_JWKS_TTL),
            http_timeout: settings.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT),
        }))
    }

    /// Build the configuration
    pub fn build(self) -> crate::Result<Config> {
        let base_dir = self
            .token_store_dir
            .unwrap_or_else(|| Path::new(".").join(TOKEN_STORE_DIR));

        if let Some(unknown) = self
            .realms
            .order
            .iter()
            .find(|name| !self.realms.users.contains_key(*name))
        {
            return Err(Error::Config(format!(
                "realms.order names realm '{unknown}' with no users"
            )));
        }

        Ok(Config {
            token_store: TokenStoreConfig::with_base_dir(
                base_dir,
                self.key_file,
                self.state_ttl.unwrap_or(DEFAULT_STATE_LIFETIME),
            ),
            cache: self.cache,
            ticket: Self::build_ticket(self.ticket)?,
            certificate: Self::build_certificate(self.certificate),
            realms: self.realms,
            oidc: Self::build_oidc(self.oidc)?,
            policy: PolicyConfig {
                file: self
                    .policy_file
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_POLICY_FILE)),
            },
            telemetry: TelemetryConfig {
                log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
                json_logs: self.json_logs,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();

        assert_eq!(config.token_store.base_dir, Path::new("./tokens"));
        assert_eq!(config.token_store.key_file, Path::new("./tokens/token.key"));
        assert_eq!(config.token_store.state_ttl, DEFAULT_STATE_LIFETIME);
        assert!(config.cache.enabled);
        assert!(config.ticket.is_none());
        assert!(config.certificate.is_none());
        assert!(config.oidc.is_none());
        assert_eq!(config.policy.file, Path::new(DEFAULT_POLICY_FILE));
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_ticket_requires_service_url() {
        let result = ConfigBuilder::new()
            .ticket_validation_url("https://sso.example.com/cas")
            .build();
        assert!(result.unwrap_err().is_config());

        let config = ConfigBuilder::new()
            .ticket_validation_url("https://sso.example.com/cas")
            .ticket_service_url("https://app.example.com/")
            .ticket_trust_store("/etc/ca.pem")
            .build()
            .unwrap();
        let ticket = config.ticket.unwrap();
        assert_eq!(ticket.realm, "cas");
        assert_eq!(ticket.tls.trust_store, Some(PathBuf::from("/etc/ca.pem")));
        assert_eq!(ticket.timeout, DEFAULT_HTTP_TIMEOUT);
    }

    #[test]
    fn test_oidc_section() {
        assert!(
            ConfigBuilder::new()
                .oidc_issuer("https://idp.example.com")
                .build()
                .is_err()
        );

        let config = ConfigBuilder::new()
            .oidc_issuer("https://idp.example.com")
            .oidc_client_id("realmgate")
            .oidc_client_secret("hunter2")
            .oidc_response_type(ResponseType::IdTokenToken)
            .build()
            .unwrap();
        let oidc = config.oidc.unwrap();
        assert_eq!(oidc.source_id, "default");
        assert!(oidc.check_nonce);

        let validator = oidc.validator_config();
        assert_eq!(validator.client_secret.as_deref(), Some("hunter2"));
        assert_eq!(validator.response_type, ResponseType::IdTokenToken);
        assert!(!format!("{oidc:?}").contains("hunter2"));
    }

    #[test]
    fn test_realm_order() {
        let config = ConfigBuilder::new()
            .realm_user("ldap", "carol", "pw")
            .realm_user("karaf", "admin", "secret")
            .realm_order(vec!["karaf".into()])
            .build()
            .unwrap();
        assert_eq!(config.realms.ordered_names(), vec!["karaf", "ldap"]);
        assert!(!format!("{:?}", config.realms).contains("secret"));

        let result = ConfigBuilder::new()
            .realm_order(vec!["missing".into()])
            .build();
        assert!(result.is_err());
    }
}
