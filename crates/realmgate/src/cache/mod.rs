//! Validation cache
//!
//! Short-circuits repeated validation of an identical credential inside a
//! processing window. Keys are [`CredentialHash`] values derived from the
//! credential's canonical fields; values are [`CachedToken`]s recording the
//! realm that accepted the credential.
//!
//! The cache is shared across concurrent requests. It never takes a global
//! lock: insertion is insert-if-absent on a sharded map and expiry is swept
//! shard by shard.

mod config;
mod key;
mod store;

pub use config::{DEFAULT_CACHE_TTL, DEFAULT_MAX_ENTRIES, ValidationCacheConfig};
pub use key::CredentialHash;
pub use store::{CacheStats, CachedToken, ValidationCache};
