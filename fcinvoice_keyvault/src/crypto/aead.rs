//! AES-256-GCM sealing for the protected key blob (nonce || ciphertext)

use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce as AesNonce,
};
use secrecy::{ExposeSecret, SecretBox};
use zeroize::Zeroizing;

use crate::error::{KeyVaultError, Result};

/// Nonce length for AES-GCM
pub const GCM_NONCE_LEN: usize = 12;

/// Authentication tag length
pub const GCM_TAG_LEN: usize = 16;

/// Seal `plaintext` under `key`, returning nonce || ciphertext
pub fn seal(key: &SecretBox<[u8; 32]>, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key.expose_secret()));

    let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
    getrandom::getrandom(&mut nonce_bytes)?;
    let nonce = AesNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| KeyVaultError::Crypto(format!("AES-GCM encryption failed: {}", e)))?;

    let mut sealed = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a blob produced by [`seal`]
pub fn open(key: &SecretBox<[u8; 32]>, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
        return Err(KeyVaultError::DecryptionFailed("sealed blob too short".into()));
    }

    let cipher = Aes256Gcm::new(GenericArray::from_slice(key.expose_secret()));
    let (nonce, ciphertext) = sealed.split_at(GCM_NONCE_LEN);

    cipher
        .decrypt(AesNonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| KeyVaultError::DecryptionFailed("authentication failed".into()))
}
