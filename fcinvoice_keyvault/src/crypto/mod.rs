//! Cryptographic module - AES-256-CBC records, AES-GCM key blob wrapping, HKDF

mod aead;
mod cbc_stream;
mod hkdf_derive;
mod key_material;

pub use aead::{open, seal, GCM_NONCE_LEN, GCM_TAG_LEN};
pub use cbc_stream::{decrypt_to_vec, encrypt_to_vec, CbcDecryptor, CbcEncryptor};
pub use hkdf_derive::{derive_subkey_fixed, derive_wrapping_key, purposes};
pub use key_material::{generate_iv, KeyMaterial, BLOB_LEN, BLOCK_LEN, IV_LEN, KEY_LEN};
