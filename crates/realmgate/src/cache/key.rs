//! Stable credential hashes used as cache keys

use std::fmt;

use sha2::{Digest, Sha256};

/// 64-bit hash of a credential's canonical fields.
///
/// Derived from SHA-256 so it is stable across processes and restarts,
/// unlike `DefaultHasher`. Each field is length-prefixed and absent fields
/// are marked distinctly from empty ones, so `("ab", "c")` and `("a", "bc")`
/// never collide by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialHash(u64);

impl CredentialHash {
    #[must_use]
    pub fn from_fields(fields: &[Option<&[u8]>]) -> Self {
        let mut hasher = Sha256::new();
        for field in fields {
            match field {
                Some(bytes) => {
                    hasher.update([1u8]);
                    hasher.update((bytes.len() as u64).to_be_bytes());
                    hasher.update(bytes);
                }
                None => hasher.update([0u8]),
            }
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(prefix))
    }

    /// Hash over `(username, password, nonce, created)`
    #[must_use]
    pub fn username_token(
        username: &str,
        password: Option<&str>,
        nonce: Option<&str>,
        created: Option<&str>,
    ) -> Self {
        Self::from_fields(&[
            Some(username.as_bytes()),
            password.map(str::as_bytes),
            nonce.map(str::as_bytes),
            created.map(str::as_bytes),
        ])
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
