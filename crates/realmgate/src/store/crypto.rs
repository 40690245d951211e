//! At-rest encryption for token files

use std::fmt;
use std::fs;
use std::path::Path;

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

use super::error::{Result, TokenStoreError};

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// Symmetric encryption of whole blobs
pub trait Encryptor: Send + Sync + fmt::Debug {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Fails with [`TokenStoreError::Crypto`] when the ciphertext was not
    /// produced under this key or has been tampered with
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// AES-256-GCM with a random 96-bit nonce prefixed to each ciphertext
pub struct AesGcmEncryptor {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl fmt::Debug for AesGcmEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmEncryptor").finish_non_exhaustive()
    }
}

impl AesGcmEncryptor {
    pub fn new(key: &[u8]) -> Result<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| {
            TokenStoreError::Crypto(format!("expected a {KEY_LEN}-byte key, got {}", key.len()))
        })?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Fresh random key
    pub fn generate_key() -> Result<[u8; KEY_LEN]> {
        let mut key = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| TokenStoreError::Crypto("system random source failed".into()))?;
        Ok(key)
    }

    /// Load the key at `path`, generating and saving one if the file does
    /// not exist yet
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let key = fs::read(path)?;
            tracing::debug!(path = %path.display(), "Loaded token store key");
            return Self::new(&key);
        }

        let key = Self::generate_key()?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, key)?;
        restrict_permissions(path)?;
        tracing::info!(path = %path.display(), "Generated new token store key");
        Self::new(&key)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

impl Encryptor for AesGcmEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| TokenStoreError::Crypto("system random source failed".into()))?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| TokenStoreError::Crypto("encryption failed".into()))?;

        let mut output = Vec::with_capacity(NONCE_LEN + in_out.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&in_out);
        Ok(output)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(TokenStoreError::Crypto("ciphertext too short".into()));
        }
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| TokenStoreError::Crypto("invalid nonce".into()))?;

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| TokenStoreError::Crypto("authentication tag mismatch".into()))?;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_decrypt_reverses_encrypt() {
        let enc = AesGcmEncryptor::new(&[7u8; KEY_LEN]).unwrap();
        let sealed = enc.encrypt(b"{\"CSW\":{}}").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"{\"CSW\":{}}");
        assert_eq!(enc.decrypt(&sealed).unwrap(), b"{\"CSW\":{}}");
    }

    #[test]
    fn test_nonce_differs_per_call() {
        let enc = AesGcmEncryptor::new(&[7u8; KEY_LEN]).unwrap();
        assert_ne!(enc.encrypt(b"same").unwrap(), enc.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_wrong_key_and_tampering_fail() {
        let enc = AesGcmEncryptor::new(&[7u8; KEY_LEN]).unwrap();
        let other = AesGcmEncryptor::new(&[8u8; KEY_LEN]).unwrap();
        let mut sealed = enc.encrypt(b"secret").unwrap();

        assert!(other.decrypt(&sealed).is_err());

        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(enc.decrypt(&sealed).is_err());
        assert!(enc.decrypt(b"short").is_err());
    }

    #[test]
    fn test_rejects_bad_key_length() {
        assert!(AesGcmEncryptor::new(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_load_or_generate_persists_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys").join("token.key");

        let first = AesGcmEncryptor::load_or_generate(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), KEY_LEN);

        let sealed = first.encrypt(b"payload").unwrap();
        let second = AesGcmEncryptor::load_or_generate(&path).unwrap();
        assert_eq!(second.decrypt(&sealed).unwrap(), b"payload");
    }
}
