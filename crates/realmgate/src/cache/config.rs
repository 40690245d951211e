//! Validation cache configuration

use std::time::Duration;

/// Default lifetime of a cached validation
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Default bound on cached validations
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Validation cache configuration
#[derive(Debug, Clone, Copy)]
pub struct ValidationCacheConfig {
    /// Whether successful validations are cached at all
    pub enabled: bool,
    /// How long a cached validation short-circuits identical credentials
    pub ttl: Duration,
    /// Maximum cached validations before the oldest is evicted
    pub max_entries: usize,
}

impl Default for ValidationCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationCacheConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}
