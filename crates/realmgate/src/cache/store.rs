//! Concurrent validation cache with TTL and bounded size

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::config::ValidationCacheConfig;
use super::key::CredentialHash;
use crate::constants::REALM_PROPERTY;

/// A previously successful validation
///
/// Created once, never mutated afterwards. Replacing an expired entry
/// inserts a fresh value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub hash: CredentialHash,
    /// Opaque token handed back on a hit (the principal name)
    pub token: String,
    pub properties: HashMap<String, String>,
    /// Principal attributes restored on a hit
    pub attributes: HashMap<String, String>,
    created_at: Instant,
}

impl CachedToken {
    pub fn new(hash: CredentialHash, token: impl Into<String>, realm: impl Into<String>) -> Self {
        let mut properties = HashMap::new();
        properties.insert(REALM_PROPERTY.to_string(), realm.into());
        Self {
            hash,
            token: token.into(),
            properties,
            attributes: HashMap::new(),
            created_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.properties.get(REALM_PROPERTY).map(String::as_str)
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub entry_count: u64,
}

impl CacheStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Hash-keyed store of successful validations shared across requests
///
/// Lookups drop the entry they find expired; [`Self::sweep_expired`] clears
/// the rest. When the bound is reached, expired entries are swept first and
/// then the oldest remaining entry is evicted.
#[derive(Debug, Default)]
pub struct ValidationCache {
    entries: DashMap<CredentialHash, CachedToken>,
    config: ValidationCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl ValidationCache {
    #[must_use]
    pub fn new(config: ValidationCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ValidationCacheConfig {
        &self.config
    }

    /// Look up an unexpired entry
    #[must_use]
    pub fn get(&self, hash: CredentialHash) -> Option<CachedToken> {
        if !self.config.enabled {
            return None;
        }

        let ttl = self.config.ttl;
        let found = self
            .entries
            .get(&hash)
            .map(|entry| (entry.is_expired(ttl), entry.value().clone()));

        match found {
            Some((false, token)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                crate::observability::record_cache_hit();
                Some(token)
            }
            Some((true, _)) => {
                self.entries.remove_if(&hash, |_, entry| entry.is_expired(ttl));
                self.record_miss();
                None
            }
            None => {
                self.record_miss();
                None
            }
        }
    }

    /// Insert unless an unexpired entry already exists for the hash
    ///
    /// Returns `true` when the token was stored.
    pub fn insert_if_absent(&self, token: CachedToken) -> bool {
        if !self.config.enabled || self.config.max_entries == 0 {
            return false;
        }

        let ttl = self.config.ttl;
        if self.entries.len() >= self.config.max_entries && !self.entries.contains_key(&token.hash)
        {
            self.make_room();
        }

        let inserted = match self.entries.entry(token.hash) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(ttl) {
                    occupied.insert(token);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(token);
                true
            }
        };

        if inserted {
            self.inserts.fetch_add(1, Ordering::Relaxed);
        }
        inserted
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(ttl));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Swept expired validation cache entries");
        }
        removed
    }

    pub fn invalidate(&self, hash: CredentialHash) -> bool {
        self.entries.remove(&hash).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
        }
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::observability::record_cache_miss();
    }

    fn make_room(&self) {
        if self.sweep_expired() > 0 && self.entries.len() < self.config.max_entries {
            return;
        }

        // Key is copied out so no shard guard is held across the removal.
        let oldest = self
            .entries
            .iter()
            .max_by_key(|entry| entry.age())
            .map(|entry| *entry.key());

        if let Some(hash) = oldest
            && self.entries.remove(&hash).is_some()
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "metrics")]
            crate::observability::record_cache_eviction();
            tracing::debug!(hash = %hash, "Evicted oldest validation cache entry");
        }
    }
}
