//! HKDF derivation of identity-bound wrapping keys

use hkdf::Hkdf;
use sha2::Sha256;
use secrecy::SecretBox;

use crate::error::{KeyVaultError, Result};

/// Predefined derivation purposes
pub mod purposes {
    pub const KEY_BLOB_SALT: &[u8] = b"FCINVOICE:keyblob:salt:v1";
    pub const KEY_BLOB_WRAP: &str = "FCINVOICE:keyblob:wrap:v1";
}

/// Derive a fixed-length key from identity material
pub fn derive_subkey_fixed<const N: usize>(
    ikm: &[u8],
    salt: &[u8],
    purpose: &str,
) -> Result<SecretBox<[u8; N]>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut output = [0u8; N];
    hk.expand(purpose.as_bytes(), &mut output)
        .map_err(|e| KeyVaultError::Crypto(format!("HKDF expand failed: {}", e)))?;

    Ok(SecretBox::new(Box::new(output)))
}

/// Derive the 32-byte key that wraps the installation blob
pub fn derive_wrapping_key(identity: &[u8]) -> Result<SecretBox<[u8; 32]>> {
    derive_subkey_fixed::<32>(identity, purposes::KEY_BLOB_SALT, purposes::KEY_BLOB_WRAP)
}
