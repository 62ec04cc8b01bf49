//! Error types for the FCInvoice key vault

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyVaultError {
    #[error("Key file not found at {0}")]
    KeyUnavailable(String),

    #[error("Key file corrupt or protected for another identity: {0}")]
    KeyCorrupt(String),

    #[error("No local identity material available to protect the key")]
    IdentityUnavailable,

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("RNG failed: {0}")]
    Rng(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KeyVaultError>;

impl KeyVaultError {
    /// Errors that mean no record in the store can be read or written.
    pub fn is_vault_level(&self) -> bool {
        matches!(
            self,
            Self::KeyUnavailable(_) | Self::KeyCorrupt(_) | Self::IdentityUnavailable
        )
    }
}

impl From<getrandom::Error> for KeyVaultError {
    fn from(e: getrandom::Error) -> Self {
        KeyVaultError::Rng(e.to_string())
    }
}
