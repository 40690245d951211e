//! Shared fixtures for realmgate integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use realmgate::ErrorKind;
use realmgate::oidc::{
    OidcError, OidcProviderClient, OidcValidator, OidcValidatorConfig, ProviderMetadata,
    StaticKeySource, TokenResponse, UserInfo,
};
use realmgate::store::{AesGcmEncryptor, EncryptedTokenStore};
use realmgate::trust::{RealmError, RealmLogin, StaticRealm};
use serde_json::{Value, json};
use tempfile::TempDir;

pub const SECRET: &[u8] = b"integration-secret-key-32-bytes-minimum";
pub const ISSUER: &str = "https://idp.example.com";
pub const CLIENT_ID: &str = "realmgate";

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// HS256 token signed with [`SECRET`] under kid `k1`
pub fn sign(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("k1".into());
    encode(&header, claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

pub fn access_token(sub: &str) -> String {
    sign(&json!({"sub": sub, "exp": now() + 600, "scope": "openid"}))
}

/// ID token claims for `sub`, with `extra` merged over the defaults
pub fn id_claims(sub: &str, extra: &Value) -> Value {
    let mut claims = json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "sub": sub,
        "preferred_username": sub,
        "exp": now() + 600,
    });
    if let (Some(base), Some(extra)) = (claims.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    claims
}

pub fn metadata() -> ProviderMetadata {
    ProviderMetadata::new(ISSUER, format!("{ISSUER}/jwks"))
        .with_token_endpoint(format!("{ISSUER}/token"))
}

/// Provider double answering code exchanges and refreshes from canned
/// responses
#[derive(Debug, Default)]
pub struct FakeProvider {
    pub metadata: ProviderMetadata,
    pub token_response: Option<TokenResponse>,
    pub refresh_response: Option<TokenResponse>,
    pub refresh_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            metadata: metadata(),
            ..Default::default()
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OidcProviderClient for FakeProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenResponse, OidcError> {
        self.token_response
            .clone()
            .ok_or(OidcError::Rejected(ErrorKind::CredentialRejected))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, OidcError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_response
            .clone()
            .ok_or(OidcError::Rejected(ErrorKind::CredentialRejected))
    }

    async fn userinfo(&self, _access_token: &str) -> Result<UserInfo, OidcError> {
        Err(OidcError::Provider("no userinfo endpoint".into()))
    }
}

pub fn token_response(
    access: &str,
    refresh: Option<&str>,
    id_token: Option<String>,
) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        token_type: Some("Bearer".into()),
        refresh_token: refresh.map(str::to_string),
        id_token,
        expires_in: Some(300),
    }
}

pub fn oidc_validator(config: OidcValidatorConfig, provider: Arc<FakeProvider>) -> OidcValidator {
    OidcValidator::new(
        config,
        provider,
        Arc::new(StaticKeySource::new().with_secret(Some("k1"), SECRET)),
    )
}

/// Realm that counts how often it is consulted
#[derive(Debug)]
pub struct CountingRealm {
    inner: StaticRealm,
    calls: AtomicUsize,
}

impl CountingRealm {
    pub fn new(inner: StaticRealm) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RealmLogin for CountingRealm {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<HashMap<String, String>>, RealmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.login(username, password)
    }
}

/// Token store in a fresh temporary directory
pub fn token_store() -> (TempDir, EncryptedTokenStore) {
    let dir = TempDir::new().unwrap();
    let key = AesGcmEncryptor::generate_key().unwrap();
    let encryptor = AesGcmEncryptor::new(&key).unwrap();
    let store =
        EncryptedTokenStore::new(dir.path().join("tokens"), Arc::new(encryptor)).unwrap();
    (dir, store)
}
