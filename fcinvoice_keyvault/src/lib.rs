//! # FCInvoice key vault
//!
//! Installation key management for the encrypted invoice store:
//! - One AES-256 key + CBC IV per installation, created lazily
//! - Key blob wrapped for the current identity (DPAPI on Windows)
//! - Streaming AES-256-CBC / PKCS#7 record codec

pub mod error;
pub mod crypto;
pub mod protector;
pub mod vault;

// Re-exports
pub use crypto::{CbcDecryptor, CbcEncryptor, KeyMaterial, BLOCK_LEN, IV_LEN, KEY_LEN};
pub use error::{KeyVaultError, Result};
pub use protector::{platform_protector, IdentityProtector, LocalIdentityProtector};
pub use vault::KeyVault;

#[cfg(windows)]
pub use protector::DpapiProtector;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// System name
pub const SYSTEM_NAME: &str = "FCINVOICE_KEYVAULT";
