//! Streaming AES-256-CBC with PKCS#7 padding
//!
//! Record files are fed through these in chunks. The encryptor emits every
//! complete block as soon as it has one; the decryptor holds back the final
//! block until `finish`, where the padding is checked.

use aes::cipher::{
    block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit,
};
use zeroize::Zeroizing;

use super::key_material::{BLOCK_LEN, IV_LEN, KEY_LEN};
use crate::error::{KeyVaultError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Incremental CBC encryptor
pub struct CbcEncryptor {
    cipher: Aes256CbcEnc,
    pending: Zeroizing<Vec<u8>>,
}

impl CbcEncryptor {
    pub fn new(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self {
            cipher: Aes256CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(iv)),
            pending: Zeroizing::new(Vec::with_capacity(BLOCK_LEN)),
        }
    }

    /// Encrypt as many whole blocks as are available, appending to `out`.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);

        let whole = self.pending.len() - self.pending.len() % BLOCK_LEN;
        if whole == 0 {
            return;
        }

        let start = out.len();
        out.extend_from_slice(&self.pending[..whole]);
        for block in out[start..].chunks_exact_mut(BLOCK_LEN) {
            self.cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.pending.drain(..whole);
    }

    /// Pad the tail and emit the final block.
    pub fn finish(self, out: &mut Vec<u8>) -> Result<()> {
        let Self { cipher, pending } = self;
        let tail_len = pending.len();

        let mut block = Zeroizing::new([0u8; BLOCK_LEN]);
        block[..tail_len].copy_from_slice(&pending);

        let last = cipher
            .encrypt_padded_mut::<Pkcs7>(&mut block[..], tail_len)
            .map_err(|_| KeyVaultError::Crypto("PKCS#7 padding failed".into()))?;
        out.extend_from_slice(last);
        Ok(())
    }
}

/// Incremental CBC decryptor
pub struct CbcDecryptor {
    cipher: Aes256CbcDec,
    pending: Zeroizing<Vec<u8>>,
}

impl CbcDecryptor {
    pub fn new(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self {
            cipher: Aes256CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(iv)),
            pending: Zeroizing::new(Vec::with_capacity(2 * BLOCK_LEN)),
        }
    }

    /// Decrypt every block except the last one seen so far.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);
        if self.pending.is_empty() {
            return;
        }

        let ready = ((self.pending.len() - 1) / BLOCK_LEN) * BLOCK_LEN;
        if ready == 0 {
            return;
        }

        let start = out.len();
        out.extend_from_slice(&self.pending[..ready]);
        for block in out[start..].chunks_exact_mut(BLOCK_LEN) {
            self.cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.pending.drain(..ready);
    }

    /// Decrypt the held-back block and strip its padding.
    pub fn finish(self, out: &mut Vec<u8>) -> Result<()> {
        let Self { cipher, mut pending } = self;

        if pending.len() != BLOCK_LEN {
            return Err(KeyVaultError::DecryptionFailed(
                "ciphertext truncated or not block aligned".into(),
            ));
        }

        let plain = cipher
            .decrypt_padded_mut::<Pkcs7>(&mut pending[..])
            .map_err(|_| {
                KeyVaultError::DecryptionFailed(
                    "padding check failed (wrong key or corrupt data)".into(),
                )
            })?;
        out.extend_from_slice(plain);
        Ok(())
    }
}

/// One-shot encryption of an in-memory buffer
pub fn encrypt_to_vec(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(plaintext.len() + BLOCK_LEN);
    let mut enc = CbcEncryptor::new(key, iv);
    enc.update(plaintext, &mut out);
    enc.finish(&mut out)?;
    Ok(out)
}

/// One-shot decryption of an in-memory buffer
pub fn decrypt_to_vec(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let mut out = Zeroizing::new(Vec::with_capacity(ciphertext.len()));
    let mut dec = CbcDecryptor::new(key, iv);
    dec.update(ciphertext, &mut out);
    dec.finish(&mut out)?;
    Ok(out)
}
