//! TOML configuration file loading

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::builder::ConfigBuilder;
use crate::Result;
use crate::oidc::ResponseType;

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./realmgate.toml",
    "~/.config/realmgate/config.toml",
    "/etc/realmgate/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    apply_file_config(builder, file_config)
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> Result<ConfigBuilder> {
    if let Some(store) = config.token_store {
        if let Some(dir) = store.base_dir {
            builder = builder.token_store_dir(dir);
        }
        if let Some(path) = store.key_file {
            builder = builder.key_file(path);
        }
        if let Some(secs) = store.state_ttl_secs {
            builder = builder.state_ttl(Duration::from_secs(secs));
        }
    }

    if let Some(cache) = config.cache {
        if let Some(enabled) = cache.enabled {
            builder = builder.cache_enabled(enabled);
        }
        if let Some(secs) = cache.ttl_secs {
            builder = builder.cache_ttl(Duration::from_secs(secs));
        }
        if let Some(max) = cache.max_entries {
            builder = builder.cache_max_entries(max);
        }
    }

    if let Some(ticket) = config.ticket {
        if let Some(url) = ticket.validation_url {
            builder = builder.ticket_validation_url(url);
        }
        if let Some(url) = ticket.service_url {
            builder = builder.ticket_service_url(url);
        }
        if let Some(realm) = ticket.realm {
            builder = builder.ticket_realm(realm);
        }
        if let Some(path) = ticket.trust_store {
            builder = builder.ticket_trust_store(path);
        }
        if let Some(path) = ticket.identity {
            builder = builder.ticket_identity(path);
        }
        if let Some(secs) = ticket.timeout_secs {
            builder = builder.ticket_timeout(Duration::from_secs(secs));
        }
    }

    if let Some(cert) = config.certificate {
        if let Some(path) = cert.trust_store {
            builder = builder.certificate_trust_store(path);
        }
        if let Some(realm) = cert.realm {
            builder = builder.certificate_realm(realm);
        }
        if let Some(patterns) = cert.subject_constraints {
            builder = builder.subject_constraints(patterns);
        }
    }

    if let Some(realms) = config.realms {
        if let Some(order) = realms.order {
            builder = builder.realm_order(order);
        }
        for (realm, users) in realms.users {
            for (username, password) in users {
                builder = builder.realm_user(realm.clone(), username, password);
            }
        }
    }

    if let Some(oidc) = config.oidc {
        builder = apply_oidc(builder, oidc)?;
    }

    if let Some(policy) = config.policy
        && let Some(file) = policy.file
    {
        builder = builder.policy_file(file);
    }

    if let Some(telemetry) = config.telemetry {
        if let Some(level) = telemetry.log_level {
            builder = builder.log_level(level);
        }
        if let Some(json) = telemetry.json_logs {
            builder = builder.json_logs(json);
        }
    }

    Ok(builder)
}

fn apply_oidc(mut builder: ConfigBuilder, oidc: OidcFileConfig) -> Result<ConfigBuilder> {
    if let Some(issuer) = oidc.issuer {
        builder = builder.oidc_issuer(issuer);
    }
    if let Some(source_id) = oidc.source_id {
        builder = builder.oidc_source_id(source_id);
    }
    if let Some(client_id) = oidc.client_id {
        builder = builder.oidc_client_id(client_id);
    }
    if let Some(secret) = oidc.client_secret {
        builder = builder.oidc_client_secret(secret);
    }
    if let Some(uri) = oidc.redirect_uri {
        builder = builder.oidc_redirect_uri(uri);
    }
    if let Some(realm) = oidc.realm {
        builder = builder.oidc_realm(realm);
    }
    if let Some(response_type) = oidc.response_type {
        let parsed: ResponseType = response_type
            .parse()
            .map_err(|e| crate::Error::Config(format!("Invalid oidc.response_type: {e}")))?;
        builder = builder.oidc_response_type(parsed);
    }
    if let Some(check) = oidc.check_nonce {
        builder = builder.oidc_check_nonce(check);
    }
    if let Some(secs) = oidc.clock_skew_secs {
        builder = builder.oidc_clock_skew(Duration::from_secs(secs));
    }
    if let Some(secs) = oidc.jwks_ttl_secs {
        builder = builder.oidc_jwks_ttl(Duration::from_secs(secs));
    }
    if let Some(secs) = oidc.http_timeout_secs {
        builder = builder.oidc_http_timeout(Duration::from_secs(secs));
    }
    Ok(builder)
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    token_store: Option<TokenStoreFileConfig>,
    cache: Option<CacheFileConfig>,
    ticket: Option<TicketFileConfig>,
    certificate: Option<CertificateFileConfig>,
    realms: Option<RealmsFileConfig>,
    oidc: Option<OidcFileConfig>,
    policy: Option<PolicyFileConfig>,
    telemetry: Option<TelemetryFileConfig>,
}

#[derive(Debug, Deserialize)]
struct TokenStoreFileConfig {
    base_dir: Option<PathBuf>,
    key_file: Option<PathBuf>,
    state_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CacheFileConfig {
    enabled: Option<bool>,
    ttl_secs: Option<u64>,
    max_entries: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TicketFileConfig {
    validation_url: Option<String>,
    service_url: Option<String>,
    realm: Option<String>,
    trust_store: Option<PathBuf>,
    identity: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CertificateFileConfig {
    trust_store: Option<PathBuf>,
    realm: Option<String>,
    subject_constraints: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RealmsFileConfig {
    order: Option<Vec<String>>,
    #[serde(default)]
    users: BTreeMap<String, BTreeMap<String, String>>,
}

impl std::fmt::Debug for RealmsFileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmsFileConfig")
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct OidcFileConfig {
    issuer: Option<String>,
    source_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    realm: Option<String>,
    response_type: Option<String>,
    check_nonce: Option<bool>,
    clock_skew_secs: Option<u64>,
    jwks_ttl_secs: Option<u64>,
    http_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for OidcFileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcFileConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct PolicyFileConfig {
    file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct TelemetryFileConfig {
    log_level: Option<String>,
    json_logs: Option<bool>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[token_store]
base_dir = "/var/lib/realmgate/tokens"
state_ttl_secs = 300

[cache]
enabled = true
ttl_secs = 900
max_entries = 500

[ticket]
validation_url = "https://sso.example.com/cas"
service_url = "https://app.example.com/"
trust_store = "/etc/realmgate/ca.pem"

[certificate]
trust_store = "/etc/realmgate/anchors"
subject_constraints = ["^CN=.*,O=Example$"]

[realms]
order = ["karaf"]

[realms.users.karaf]
admin = "admin"

[oidc]
issuer = "https://idp.example.com/realms/main"
client_id = "realmgate"
client_secret = "s3cret"
response_type = "id_token token"
clock_skew_secs = 30

[policy]
file = "/etc/realmgate/policy.toml"

[telemetry]
log_level = "debug"
json_logs = true
"#;
        let temp_file = create_temp_config(toml_content);
        let config = load_from_file(temp_file.path(), ConfigBuilder::new())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            config.token_store.base_dir,
            Path::new("/var/lib/realmgate/tokens")
        );
        assert_eq!(config.token_store.state_ttl, Duration::from_secs(300));
        assert_eq!(config.cache.ttl, Duration::from_secs(900));
        assert_eq!(config.cache.max_entries, 500);
        assert_eq!(
            config.ticket.unwrap().service_url,
            "https://app.example.com/"
        );
        assert_eq!(
            config.certificate.unwrap().subject_constraints,
            vec!["^CN=.*,O=Example$".to_string()]
        );
        assert_eq!(config.realms.ordered_names(), vec!["karaf"]);

        let oidc = config.oidc.unwrap();
        assert_eq!(oidc.response_type, ResponseType::IdTokenToken);
        assert_eq!(oidc.clock_skew, Duration::from_secs(30));
        assert_eq!(oidc.client_secret.as_deref(), Some("s3cret"));

        assert_eq!(config.policy.file, Path::new("/etc/realmgate/policy.toml"));
        assert_eq!(config.telemetry.log_level, "debug");
        assert!(config.telemetry.json_logs);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: FileConfig = toml::from_str("[cache]\nenabled = false\n").unwrap();
        assert!(config.cache.is_some());
        assert!(config.oidc.is_none());
        assert!(config.realms.is_none());
    }

    #[test]
    fn test_invalid_response_type() {
        let temp_file = create_temp_config(
            "[oidc]\nissuer = \"https://idp\"\nclient_id = \"c\"\nresponse_type = \"implicit\"\n",
        );
        let err = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.to_string().contains("response_type"));
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(
            Path::new("/nonexistent/path/config.toml"),
            ConfigBuilder::new(),
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let temp_file = create_temp_config("[cache\nenabled = ");
        let err = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
