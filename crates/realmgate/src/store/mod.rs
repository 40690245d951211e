//! Encrypted per-user OAuth token storage
//!
//! One file per user under the base directory, named by the SHA-256 of the
//! username. Each file is the encrypted JSON object
//! `{"<sourceId>": {"accessToken": .., "refreshToken": .., "discoveryUrl": ..}}`.
//!
//! Read-modify-write sequences for one user are serialized through a fixed
//! array of lock stripes indexed by the hashed id, so concurrent updates to
//! different sources of the same user never lose each other's entries.

mod crypto;
mod entry;
mod error;
mod state;

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

pub use crypto::{AesGcmEncryptor, Encryptor, KEY_LEN};
pub use entry::{TokenEntry, TokenInformation};
pub use error::{Result, TokenStoreError};
pub use state::{AuthorizationState, AuthorizationStateMap, DEFAULT_STATE_LIFETIME};

/// Number of per-user lock stripes
pub const LOCK_STRIPES: usize = 64;

type SourceMap = BTreeMap<String, TokenEntry>;

/// Storage id for `username`: lowercase hex SHA-256
#[must_use]
pub fn user_id(username: &str) -> String {
    let digest = Sha256::digest(username.as_bytes());
    let mut id = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

pub struct EncryptedTokenStore {
    base_dir: PathBuf,
    encryptor: Arc<dyn Encryptor>,
    stripes: Vec<Mutex<()>>,
}

impl fmt::Debug for EncryptedTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedTokenStore")
            .field("base_dir", &self.base_dir)
            .field("encryptor", &self.encryptor)
            .finish_non_exhaustive()
    }
}

impl EncryptedTokenStore {
    /// Open a store rooted at `base_dir`, creating the directory if needed
    pub fn new(base_dir: impl Into<PathBuf>, encryptor: Arc<dyn Encryptor>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            encryptor,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file holding `username`'s tokens
    #[must_use]
    pub fn file_path(&self, username: &str) -> PathBuf {
        self.base_dir.join(user_id(username))
    }

    fn stripe(&self, id: &str) -> &Mutex<()> {
        let index = usize::from_str_radix(&id[..2], 16).unwrap_or(0) % LOCK_STRIPES;
        &self.stripes[index]
    }

    fn load(&self, path: &Path) -> Result<Option<SourceMap>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(Some(SourceMap::new()));
        }

        let plaintext = self.encryptor.decrypt(&bytes).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Token file failed to decrypt");
            TokenStoreError::StorageCorruption(format!("{}: {e}", path.display()))
        })?;
        serde_json::from_slice(&plaintext).map(Some).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Token file is not valid JSON");
            TokenStoreError::StorageCorruption(format!("{}: {e}", path.display()))
        })
    }

    fn save(&self, path: &Path, entries: &SourceMap) -> Result<()> {
        let json = serde_json::to_vec(entries)
            .map_err(|e| TokenStoreError::Serialization(e.to_string()))?;
        let ciphertext = self.encryptor.encrypt(&json)?;

        let mut temp = path.as_os_str().to_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        fs::write(&temp, ciphertext)?;
        fs::rename(&temp, path)?;
        Ok(())
    }

    /// Add or replace the entry for `source_id`, keeping other sources
    pub fn create(&self, username: &str, source_id: &str, entry: TokenEntry) -> Result<()> {
        let id = user_id(username);
        let path = self.base_dir.join(&id);
        let _guard = self.stripe(&id).lock();

        let mut entries = self.load(&path)?.unwrap_or_default();
        entries.insert(source_id.to_string(), entry);
        let result = self.save(&path, &entries);

        #[cfg(feature = "metrics")]
        crate::observability::record_token_store_operation("create", result.is_ok());

        result?;
        tracing::debug!(user_id = %id, source_id, sources = entries.len(), "Stored tokens");
        Ok(())
    }

    /// All stored sources for `username`; no file means no sources
    pub fn read(&self, username: &str) -> Result<TokenInformation> {
        let id = user_id(username);
        let token_entries = self.load(&self.base_dir.join(&id))?.unwrap_or_default();
        Ok(TokenInformation { id, token_entries })
    }

    /// The entry for one source, `NotFound` when absent
    pub fn read_source(&self, username: &str, source_id: &str) -> Result<TokenEntry> {
        let result = self
            .read(username)?
            .token_entries
            .remove(source_id)
            .ok_or_else(|| TokenStoreError::NotFound(source_id.to_string()));

        #[cfg(feature = "metrics")]
        crate::observability::record_token_store_operation("read", result.is_ok());

        result
    }

    /// Whether tokens for `source_id` can be read
    #[must_use]
    pub fn is_available(&self, username: &str, source_id: &str) -> bool {
        self.read_source(username, source_id).is_ok()
    }

    /// Remove every stored source for `username`
    pub fn delete(&self, username: &str) -> Result<()> {
        let id = user_id(username);
        let _guard = self.stripe(&id).lock();
        match fs::remove_file(self.base_dir.join(&id)) {
            Ok(()) => {
                tracing::debug!(user_id = %id, "Deleted all tokens");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove one source, deleting the file once no sources remain
    ///
    /// Returns whether an entry was removed.
    pub fn delete_source(&self, username: &str, source_id: &str) -> Result<bool> {
        let id = user_id(username);
        let path = self.base_dir.join(&id);
        let _guard = self.stripe(&id).lock();

        let Some(mut entries) = self.load(&path)? else {
            return Ok(false);
        };
        if entries.remove(source_id).is_none() {
            return Ok(false);
        }

        if entries.is_empty() {
            fs::remove_file(&path)?;
        } else {
            self.save(&path, &entries)?;
        }

        #[cfg(feature = "metrics")]
        crate::observability::record_token_store_operation("delete", true);

        tracing::debug!(user_id = %id, source_id, remaining = entries.len(), "Deleted source tokens");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tempfile::TempDir;

    use super::*;

    fn store(dir: &TempDir) -> EncryptedTokenStore {
        let encryptor = Arc::new(AesGcmEncryptor::new(&[3u8; KEY_LEN]).unwrap());
        EncryptedTokenStore::new(dir.path().join("tokens"), encryptor).unwrap()
    }

    fn entry(at: &str, rt: &str) -> TokenEntry {
        TokenEntry::new(at, "https://idp/meta").with_refresh_token(rt)
    }

    #[test]
    fn test_user_id_is_sha256_hex() {
        assert_eq!(
            user_id("bob"),
            "81b637d8fcd2c6da6359e6963113a1170de795e4b725b84d1e0b4cfd9ec58ce9"
        );
    }

    #[test]
    fn test_create_then_read_source() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create("bob", "CSW", entry("AT1", "RT1")).unwrap();

        let read = store.read_source("bob", "CSW").unwrap();
        assert_eq!(read.access_token, "AT1");
        assert_eq!(read.refresh_token.as_deref(), Some("RT1"));
        assert_eq!(read.discovery_url, "https://idp/meta");
        assert!(store.file_path("bob").ends_with(user_id("bob")));
        assert!(store.file_path("bob").exists());
    }

    #[test]
    fn test_file_is_encrypted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create("bob", "CSW", entry("AT1", "RT1")).unwrap();
        let raw = fs::read(store.file_path("bob")).unwrap();
        assert!(!raw.windows(3).any(|w| w == b"AT1"));
    }

    #[test]
    fn test_create_merges_sources() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create("bob", "CSW", entry("AT1", "RT1")).unwrap();
        store.create("bob", "WFS", entry("AT2", "RT2")).unwrap();
        store.create("bob", "CSW", entry("AT3", "RT3")).unwrap();

        let info = store.read("bob").unwrap();
        assert_eq!(info.id, user_id("bob"));
        assert_eq!(info.token_entries.len(), 2);
        assert_eq!(info.entry("CSW").unwrap().access_token, "AT3");
        assert_eq!(info.entry("WFS").unwrap().access_token, "AT2");
    }

    #[test]
    fn test_read_without_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.read("nobody").unwrap().is_empty());
        assert!(store.read_source("nobody", "CSW").unwrap_err().is_not_found());
        assert!(!store.is_available("nobody", "CSW"));
    }

    #[test]
    fn test_delete_source_keeps_others() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create("bob", "CSW", entry("AT1", "RT1")).unwrap();
        store.create("bob", "WFS", entry("AT2", "RT2")).unwrap();

        assert!(store.delete_source("bob", "CSW").unwrap());
        assert!(!store.is_available("bob", "CSW"));
        assert!(store.is_available("bob", "WFS"));
        assert!(store.file_path("bob").exists());

        assert!(store.delete_source("bob", "WFS").unwrap());
        assert!(!store.file_path("bob").exists());
        assert!(!store.delete_source("bob", "WFS").unwrap());
    }

    #[test]
    fn test_delete_all() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create("bob", "CSW", entry("AT1", "RT1")).unwrap();
        store.delete("bob").unwrap();
        assert!(!store.file_path("bob").exists());
        store.delete("bob").unwrap();
    }

    #[test]
    fn test_corrupt_file_is_distinct_from_absent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.file_path("bob"), b"definitely not ciphertext").unwrap();

        let err = store.read("bob").unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(err.kind(), crate::validation::ErrorKind::StorageCorruption);
    }

    #[test]
    fn test_other_key_cannot_read() {
        let dir = TempDir::new().unwrap();
        store(&dir).create("bob", "CSW", entry("AT1", "RT1")).unwrap();

        let other = EncryptedTokenStore::new(
            dir.path().join("tokens"),
            Arc::new(AesGcmEncryptor::new(&[4u8; KEY_LEN]).unwrap()),
        )
        .unwrap();
        assert!(other.read("bob").unwrap_err().is_corruption());
    }

    #[test]
    fn test_concurrent_sources_for_one_user() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .create("bob", &format!("SRC{i}"), entry(&format!("AT{i}"), "RT"))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.read("bob").unwrap().token_entries.len(), 16);
    }
}
