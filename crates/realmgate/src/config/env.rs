//! Environment variable loading for configuration

use std::env;
use std::time::Duration;

use super::builder::ConfigBuilder;
use crate::Result;
use crate::oidc::ResponseType;

/// Environment variable names
mod vars {
    pub const TOKEN_STORE_DIR: &str = "REALMGATE_TOKEN_STORE_DIR";
    pub const KEY_FILE: &str = "REALMGATE_KEY_FILE";
    pub const STATE_TTL_SECS: &str = "REALMGATE_STATE_TTL_SECS";
    pub const CACHE_ENABLED: &str = "REALMGATE_CACHE_ENABLED";
    pub const CACHE_TTL_SECS: &str = "REALMGATE_CACHE_TTL_SECS";
    pub const CACHE_MAX_ENTRIES: &str = "REALMGATE_CACHE_MAX_ENTRIES";
    pub const TICKET_VALIDATION_URL: &str = "REALMGATE_TICKET_VALIDATION_URL";
    pub const TICKET_SERVICE_URL: &str = "REALMGATE_TICKET_SERVICE_URL";
    pub const CERT_TRUST_STORE: &str = "REALMGATE_CERT_TRUST_STORE";
    pub const OIDC_ISSUER: &str = "REALMGATE_OIDC_ISSUER";
    pub const OIDC_CLIENT_ID: &str = "REALMGATE_OIDC_CLIENT_ID";
    pub const OIDC_CLIENT_SECRET: &str = "REALMGATE_OIDC_CLIENT_SECRET";
    pub const OIDC_REALM: &str = "REALMGATE_OIDC_REALM";
    pub const OIDC_RESPONSE_TYPE: &str = "REALMGATE_OIDC_RESPONSE_TYPE";
    pub const POLICY_FILE: &str = "REALMGATE_POLICY_FILE";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const JSON_LOGS: &str = "REALMGATE_JSON_LOGS";
}

fn secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Load configuration from environment variables
pub fn load_from_env(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    // Token store
    if let Ok(dir) = env::var(vars::TOKEN_STORE_DIR) {
        builder = builder.token_store_dir(dir);
    }
    if let Ok(path) = env::var(vars::KEY_FILE) {
        builder = builder.key_file(path);
    }
    if let Some(ttl) = secs(vars::STATE_TTL_SECS) {
        builder = builder.state_ttl(ttl);
    }

    // Validation cache
    if let Ok(val) = env::var(vars::CACHE_ENABLED) {
        builder = builder.cache_enabled(parse_bool(&val));
    }
    if let Some(ttl) = secs(vars::CACHE_TTL_SECS) {
        builder = builder.cache_ttl(ttl);
    }
    if let Ok(max_str) = env::var(vars::CACHE_MAX_ENTRIES)
        && let Ok(max) = max_str.parse::<usize>()
    {
        builder = builder.cache_max_entries(max);
    }

    // Ticket server
    if let Ok(url) = env::var(vars::TICKET_VALIDATION_URL) {
        builder = builder.ticket_validation_url(url);
    }
    if let Ok(url) = env::var(vars::TICKET_SERVICE_URL) {
        builder = builder.ticket_service_url(url);
    }

    // Certificates
    if let Ok(path) = env::var(vars::CERT_TRUST_STORE) {
        builder = builder.certificate_trust_store(path);
    }

    // OIDC
    if let Ok(issuer) = env::var(vars::OIDC_ISSUER) {
        builder = builder.oidc_issuer(issuer);
    }
    if let Ok(client_id) = env::var(vars::OIDC_CLIENT_ID) {
        builder = builder.oidc_client_id(client_id);
    }
    if let Ok(secret) = env::var(vars::OIDC_CLIENT_SECRET) {
        builder = builder.oidc_client_secret(secret);
    }
    if let Ok(realm) = env::var(vars::OIDC_REALM) {
        builder = builder.oidc_realm(realm);
    }
    if let Ok(value) = env::var(vars::OIDC_RESPONSE_TYPE) {
        let response_type: ResponseType = value.parse().map_err(|e| {
            crate::Error::Config(format!("Invalid {}: {e}", vars::OIDC_RESPONSE_TYPE))
        })?;
        builder = builder.oidc_response_type(response_type);
    }

    // Policy
    if let Ok(path) = env::var(vars::POLICY_FILE) {
        builder = builder.policy_file(path);
    }

    // Logging
    if let Ok(level) = env::var(vars::RUST_LOG) {
        builder = builder.log_level(level);
    }
    if let Ok(val) = env::var(vars::JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&val));
    }

    Ok(builder)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
