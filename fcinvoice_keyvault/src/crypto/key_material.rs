//! Installation key material (AES-256 key + CBC IV)

use std::fmt;

use secrecy::{ExposeSecret, SecretBox};
use zeroize::{Zeroize, Zeroizing};

use super::cbc_stream::{CbcDecryptor, CbcEncryptor};
use crate::error::{KeyVaultError, Result};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// IV length for AES-CBC
pub const IV_LEN: usize = 16;

/// AES block size
pub const BLOCK_LEN: usize = 16;

/// Unprotected blob layout: key || iv
pub const BLOB_LEN: usize = KEY_LEN + IV_LEN;

/// Key and IV, zeroized on drop.
pub struct KeyMaterial {
    key: SecretBox<[u8; KEY_LEN]>,
    iv: SecretBox<[u8; IV_LEN]>,
}

impl KeyMaterial {
    /// Generate a fresh random key and IV from the OS RNG
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; KEY_LEN];
        getrandom::getrandom(&mut key)?;
        let iv = generate_iv()?;

        let material = Self::from_parts(&key, &iv);
        key.zeroize();
        Ok(material)
    }

    pub fn from_parts(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self {
            key: SecretBox::new(Box::new(*key)),
            iv: SecretBox::new(Box::new(*iv)),
        }
    }

    /// Split an unwrapped blob into key (first 32 bytes) and IV (next 16).
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        if blob.len() != BLOB_LEN {
            return Err(KeyVaultError::KeyCorrupt(format!(
                "expected {} bytes of key material, got {}",
                BLOB_LEN,
                blob.len()
            )));
        }

        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        key.copy_from_slice(&blob[..KEY_LEN]);
        iv.copy_from_slice(&blob[KEY_LEN..]);

        let material = Self::from_parts(&key, &iv);
        key.zeroize();
        iv.zeroize();
        Ok(material)
    }

    /// Concatenate key || iv for wrapping
    pub fn to_blob(&self) -> Zeroizing<Vec<u8>> {
        let mut blob = Zeroizing::new(Vec::with_capacity(BLOB_LEN));
        blob.extend_from_slice(self.key.expose_secret());
        blob.extend_from_slice(self.iv.expose_secret());
        blob
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        self.key.expose_secret()
    }

    /// The installation-wide IV
    pub fn iv(&self) -> &[u8; IV_LEN] {
        self.iv.expose_secret()
    }

    /// Encryptor under the installation IV
    pub fn encryptor(&self) -> CbcEncryptor {
        CbcEncryptor::new(self.key(), self.iv())
    }

    /// Encryptor under a caller-supplied (per-record) IV
    pub fn encryptor_with_iv(&self, iv: &[u8; IV_LEN]) -> CbcEncryptor {
        CbcEncryptor::new(self.key(), iv)
    }

    pub fn decryptor(&self) -> CbcDecryptor {
        CbcDecryptor::new(self.key(), self.iv())
    }

    pub fn decryptor_with_iv(&self, iv: &[u8; IV_LEN]) -> CbcDecryptor {
        CbcDecryptor::new(self.key(), iv)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// Generate a random IV
pub fn generate_iv() -> Result<[u8; IV_LEN]> {
    let mut iv = [0u8; IV_LEN];
    getrandom::getrandom(&mut iv)?;
    Ok(iv)
}
