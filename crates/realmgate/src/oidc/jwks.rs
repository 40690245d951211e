//! Verification key sources and the per-issuer JWKS cache

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::config::DEFAULT_JWKS_MIN_REFETCH;
use super::error::{OidcError, Result};
use crate::trust::DEFAULT_HTTP_TIMEOUT;

/// Supplies ordered candidate keys for verifying a token
#[async_trait]
pub trait KeySource: Send + Sync + fmt::Debug {
    /// Keys published at `jwks_uri` usable for `alg`, narrowed to `kid` when
    /// the token names one. An empty list means no key matched.
    async fn candidate_keys(
        &self,
        jwks_uri: &str,
        kid: Option<&str>,
        alg: Algorithm,
    ) -> Result<Vec<DecodingKey>>;
}

/// JSON Web Key
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
}

/// JSON Web Key Set
#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Rsa,
    EcP256,
    EcP384,
    Ed25519,
    Hmac,
}

impl KeyFamily {
    const fn of(alg: Algorithm) -> Self {
        match alg {
            Algorithm::ES256 => Self::EcP256,
            Algorithm::ES384 => Self::EcP384,
            Algorithm::EdDSA => Self::Ed25519,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Self::Hmac,
            _ => Self::Rsa,
        }
    }
}

#[derive(Clone)]
struct KeyEntry {
    kid: Option<String>,
    alg: Option<Algorithm>,
    family: KeyFamily,
    key: DecodingKey,
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

impl KeyEntry {
    fn usable_for(&self, kid: Option<&str>, alg: Algorithm) -> bool {
        let kid_matches = kid.is_none_or(|kid| self.kid.as_deref() == Some(kid));
        let alg_matches = self.alg.is_none_or(|a| a == alg);
        kid_matches && alg_matches && self.family == KeyFamily::of(alg)
    }
}

fn select(entries: &[KeyEntry], kid: Option<&str>, alg: Algorithm) -> Vec<DecodingKey> {
    entries
        .iter()
        .filter(|entry| entry.usable_for(kid, alg))
        .map(|entry| entry.key.clone())
        .collect()
}

/// Decode one JWK, skipping (`Ok(None)`) key types and uses we cannot verify with
fn decode_jwk(jwk: &Jwk) -> Result<Option<KeyEntry>> {
    if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
        return Ok(None);
    }

    let missing = |field: &str| OidcError::JwksParse(format!("missing '{field}' in {} key", jwk.kty));

    let (family, key) = match (jwk.kty.as_str(), jwk.crv.as_deref()) {
        ("RSA", _) => {
            let n = jwk.n.as_deref().ok_or_else(|| missing("n"))?;
            let e = jwk.e.as_deref().ok_or_else(|| missing("e"))?;
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|e| OidcError::JwksParse(format!("invalid RSA components: {e}")))?;
            (KeyFamily::Rsa, key)
        }
        ("EC", Some(crv @ ("P-256" | "P-384"))) => {
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            let y = jwk.y.as_deref().ok_or_else(|| missing("y"))?;
            let key = DecodingKey::from_ec_components(x, y)
                .map_err(|e| OidcError::JwksParse(format!("invalid EC components: {e}")))?;
            let family = if crv == "P-256" {
                KeyFamily::EcP256
            } else {
                KeyFamily::EcP384
            };
            (family, key)
        }
        ("OKP", Some("Ed25519")) => {
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            let key = DecodingKey::from_ed_components(x)
                .map_err(|e| OidcError::JwksParse(format!("invalid OKP components: {e}")))?;
            (KeyFamily::Ed25519, key)
        }
        (kty, crv) => {
            tracing::debug!(kty, crv, "Skipping unsupported key type");
            return Ok(None);
        }
    };

    let alg = jwk
        .alg
        .as_deref()
        .and_then(|a| a.parse::<Algorithm>().ok());

    Ok(Some(KeyEntry {
        kid: jwk.kid.clone(),
        alg,
        family,
        key,
    }))
}

/// Decode every usable key; a malformed key is dropped without losing the rest
fn decode_set(set: &JwkSet) -> Vec<KeyEntry> {
    set.keys
        .iter()
        .filter_map(|jwk| match decode_jwk(jwk) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(kid = ?jwk.kid, kty = %jwk.kty, error = %e, "Skipping malformed JWK");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
struct CachedKeySet {
    entries: Vec<KeyEntry>,
    fetched_at: Instant,
}

/// JWKS cache keyed by `jwks_uri`
///
/// A set is fetched on first use and again once older than the TTL. A
/// token naming a `kid` that the cached set lacks forces a refetch, so key
/// rotation is picked up without waiting for expiry, but only once the
/// cached set is older than the minimum refetch interval.
pub struct JwksCache {
    sets: DashMap<String, CachedKeySet>,
    client: reqwest::Client,
    ttl: Duration,
    min_refetch: Duration,
}

impl fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksCache")
            .field("issuers", &self.sets.len())
            .field("ttl", &self.ttl)
            .field("min_refetch", &self.min_refetch)
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    pub fn new(ttl: Duration) -> Result<Self> {
        Self::with_timeout(ttl, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(ttl: Duration, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OidcError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            sets: DashMap::new(),
            client,
            ttl,
            min_refetch: DEFAULT_JWKS_MIN_REFETCH,
        })
    }

    /// How old a cached set must be before an unknown `kid` refetches it
    #[must_use]
    pub const fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch = interval;
        self
    }

    /// Fetch and replace the key set published at `jwks_uri`
    pub async fn refresh(&self, jwks_uri: &str) -> Result<usize> {
        tracing::debug!(jwks_uri = %jwks_uri, "Refreshing JWKS");

        let response = self
            .client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| OidcError::JwksFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OidcError::JwksFetch(format!(
                "{jwks_uri} returned {}",
                response.status()
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| OidcError::JwksParse(e.to_string()))?;

        let entries = decode_set(&set);
        let count = entries.len();
        self.sets.insert(
            jwks_uri.to_string(),
            CachedKeySet {
                entries,
                fetched_at: Instant::now(),
            },
        );

        tracing::info!(jwks_uri = %jwks_uri, keys_count = count, "JWKS refreshed successfully");
        Ok(count)
    }

    /// Refresh every key set fetched so far
    pub async fn refresh_all(&self) {
        let uris: Vec<String> = self.sets.iter().map(|e| e.key().clone()).collect();
        for uri in uris {
            if let Err(e) = self.refresh(&uri).await {
                tracing::warn!(jwks_uri = %uri, error = %e, "Background JWKS refresh failed");
            }
        }
    }

    /// Seed a key set without fetching it
    pub fn insert_set(&self, jwks_uri: impl Into<String>, set: &JwkSet) -> usize {
        let entries = decode_set(set);
        let count = entries.len();
        self.sets.insert(
            jwks_uri.into(),
            CachedKeySet {
                entries,
                fetched_at: Instant::now(),
            },
        );
        count
    }

    #[must_use]
    pub fn keys_count(&self, jwks_uri: &str) -> usize {
        self.sets.get(jwks_uri).map_or(0, |set| set.entries.len())
    }

    fn cached(&self, jwks_uri: &str) -> Option<(Vec<KeyEntry>, Instant)> {
        self.sets
            .get(jwks_uri)
            .filter(|set| set.fetched_at.elapsed() <= self.ttl)
            .map(|set| (set.entries.clone(), set.fetched_at))
    }
}

#[async_trait]
impl KeySource for JwksCache {
    async fn candidate_keys(
        &self,
        jwks_uri: &str,
        kid: Option<&str>,
        alg: Algorithm,
    ) -> Result<Vec<DecodingKey>> {
        let (entries, fetched_at) = match self.cached(jwks_uri) {
            Some(cached) => cached,
            None => {
                self.refresh(jwks_uri).await?;
                let entries = self.cached(jwks_uri).map(|(entries, _)| entries);
                return Ok(entries.map(|e| select(&e, kid, alg)).unwrap_or_default());
            }
        };

        let keys = select(&entries, kid, alg);
        if !keys.is_empty() || kid.is_none() {
            return Ok(keys);
        }
        if fetched_at.elapsed() < self.min_refetch {
            tracing::debug!(jwks_uri = %jwks_uri, kid = ?kid, "Unknown key id, key set fetched too recently to refetch");
            return Ok(keys);
        }

        tracing::debug!(jwks_uri = %jwks_uri, kid = ?kid, "Unknown key id, refetching JWKS");
        self.refresh(jwks_uri).await?;
        Ok(self
            .cached(jwks_uri)
            .map(|(entries, _)| select(&entries, kid, alg))
            .unwrap_or_default())
    }
}

/// Background JWKS refresh task builder
pub struct JwksRefreshTask {
    cache: Arc<JwksCache>,
    interval: Duration,
}

impl fmt::Debug for JwksRefreshTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksRefreshTask")
            .field("cache", &self.cache)
            .field("interval", &self.interval)
            .finish()
    }
}

impl JwksRefreshTask {
    #[must_use]
    pub const fn new(cache: Arc<JwksCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.cache.refresh_all().await,
                    () = shutdown.cancelled() => {
                        tracing::debug!("JWKS refresh task shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// Fixed keys, independent of any `jwks_uri`
#[derive(Debug, Clone, Default)]
pub struct StaticKeySource {
    entries: Vec<KeyEntry>,
}

impl StaticKeySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// HMAC secret usable for HS256/384/512
    #[must_use]
    pub fn with_secret(mut self, kid: Option<&str>, secret: &[u8]) -> Self {
        self.entries.push(KeyEntry {
            kid: kid.map(str::to_string),
            alg: None,
            family: KeyFamily::Hmac,
            key: DecodingKey::from_secret(secret),
        });
        self
    }

    /// Add a key pinned to one algorithm
    #[must_use]
    pub fn with_key(mut self, kid: Option<&str>, alg: Algorithm, key: DecodingKey) -> Self {
        self.entries.push(KeyEntry {
            kid: kid.map(str::to_string),
            alg: Some(alg),
            family: KeyFamily::of(alg),
            key,
        });
        self
    }

    #[must_use]
    pub fn from_jwk_set(set: &JwkSet) -> Self {
        Self {
            entries: decode_set(set),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn candidate_keys(
        &self,
        _jwks_uri: &str,
        kid: Option<&str>,
        alg: Algorithm,
    ) -> Result<Vec<DecodingKey>> {
        Ok(select(&self.entries, kid, alg))
    }
}
