//! FCInvoice Store - Encrypted record files
//!
//! One ciphertext file per invoice, `<id>.<ext>`. Plaintext only ever touches
//! disk as `<id>.tmp` and ciphertext is staged as `<id>.<ext>.part` before
//! being renamed into place. Both are removed by [`StagingFile`] on drop.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use fcinvoice_keyvault::{KeyMaterial, KeyVault, KeyVaultError, IV_LEN};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{StoreError, StoreResult};

/// Default ciphertext extension
pub const RECORD_EXTENSION: &str = "enc";

/// Plaintext staging extension
pub const STAGING_EXTENSION: &str = "tmp";

/// Ciphertext staging suffix
pub const PART_EXTENSION: &str = "part";

/// Longest identifier accepted as a file stem
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Streaming chunk size
const CHUNK_SIZE: usize = 64 * 1024;

/// Where each record's CBC IV comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IvMode {
    /// Fresh random IV stored in front of each ciphertext
    #[default]
    PerRecord,
    /// Installation-wide IV, no prefix (legacy archives)
    Installation,
}

/// True if `identifier` can name a record file
pub fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier.len() <= MAX_IDENTIFIER_LEN
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn validate_identifier(identifier: &str) -> StoreResult<()> {
    if is_valid_identifier(identifier) {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(identifier.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STAGING GUARD
// ═══════════════════════════════════════════════════════════════════════════

/// Removes its file when dropped, unless persisted first.
///
/// Runs on success, on error and when the owning future is cancelled.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    armed: bool,
}

impl StagingFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename into `target` and disarm.
    pub async fn persist(mut self, target: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, target).await?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove staging file")
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CIPHER STORE
// ═══════════════════════════════════════════════════════════════════════════

/// Encrypted record directory
#[derive(Debug, Clone)]
pub struct CipherStore {
    dir: PathBuf,
    extension: String,
    iv_mode: IvMode,
    vault: KeyVault,
}

impl CipherStore {
    /// Open (creating if needed) the record directory and sweep leftovers of
    /// interrupted operations.
    pub async fn open(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        iv_mode: IvMode,
        vault: KeyVault,
    ) -> StoreResult<Self> {
        let extension = extension.into();
        if extension.is_empty() || extension == STAGING_EXTENSION || extension == PART_EXTENSION {
            return Err(StoreError::Config(format!(
                "record extension {extension:?} is reserved"
            )));
        }

        let store = Self {
            dir: dir.into(),
            extension,
            iv_mode,
            vault,
        };
        fs::create_dir_all(&store.dir).await?;
        store.sweep_staging().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn iv_mode(&self) -> IvMode {
        self.iv_mode
    }

    pub fn vault(&self) -> &KeyVault {
        &self.vault
    }

    pub fn record_path(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", identifier, self.extension))
    }

    fn staging_path(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", identifier, STAGING_EXTENSION))
    }

    fn part_path(&self, identifier: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}", identifier, self.extension, PART_EXTENSION))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // WRITE
    // ═══════════════════════════════════════════════════════════════════════

    /// Encrypt `plaintext` into the record for `identifier`, replacing any
    /// previous version.
    pub async fn write_encrypted(&self, identifier: &str, plaintext: &[u8]) -> StoreResult<()> {
        validate_identifier(identifier)?;
        let key = self.vault.load_key().await?;

        let staging = StagingFile::new(self.staging_path(identifier));
        fs::write(staging.path(), plaintext).await?;

        let part = StagingFile::new(self.part_path(identifier));
        self.encrypt_file(&key, staging.path(), part.path()).await?;
        drop(key);

        part.persist(&self.record_path(identifier)).await?;
        debug!(identifier, bytes = plaintext.len(), "record written");
        Ok(())
    }

    async fn encrypt_file(
        &self,
        key: &KeyMaterial,
        source: &Path,
        target: &Path,
    ) -> StoreResult<()> {
        let mut input = File::open(source).await?;
        let mut output = File::create(target).await?;

        let mut encryptor = match self.iv_mode {
            IvMode::PerRecord => {
                let iv = fcinvoice_keyvault::crypto::generate_iv()?;
                output.write_all(&iv).await?;
                key.encryptor_with_iv(&iv)
            }
            IvMode::Installation => key.encryptor(),
        };

        let mut chunk = Zeroizing::new(vec![0u8; CHUNK_SIZE]);
        let mut sealed = Vec::with_capacity(CHUNK_SIZE + IV_LEN);
        loop {
            let n = input.read(&mut chunk[..]).await?;
            if n == 0 {
                break;
            }
            encryptor.update(&chunk[..n], &mut sealed);
            output.write_all(&sealed).await?;
            sealed.clear();
        }
        encryptor.finish(&mut sealed)?;
        output.write_all(&sealed).await?;

        output.flush().await?;
        output.sync_all().await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // READ
    // ═══════════════════════════════════════════════════════════════════════

    /// Decrypt the record for `identifier`. `None` if it does not exist.
    pub async fn read_decrypted(
        &self,
        identifier: &str,
    ) -> StoreResult<Option<Zeroizing<Vec<u8>>>> {
        validate_identifier(identifier)?;
        let input = match File::open(self.record_path(identifier)).await {
            Ok(input) => input,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let key = self.vault.load_key().await?;
        let staging = StagingFile::new(self.staging_path(identifier));

        self.decrypt_file(&key, input, staging.path())
            .await
            .map_err(|e| match e {
                StoreError::Key(KeyVaultError::DecryptionFailed(reason)) => {
                    StoreError::DecryptionFailed {
                        identifier: identifier.to_string(),
                        reason,
                    }
                }
                other => other,
            })?;
        drop(key);

        let plaintext = Zeroizing::new(fs::read(staging.path()).await?);
        debug!(identifier, bytes = plaintext.len(), "record read");
        Ok(Some(plaintext))
    }

    async fn decrypt_file(
        &self,
        key: &KeyMaterial,
        mut input: File,
        target: &Path,
    ) -> StoreResult<()> {
        let mut output = File::create(target).await?;

        let mut decryptor = match self.iv_mode {
            IvMode::PerRecord => {
                let mut iv = [0u8; IV_LEN];
                match input.read_exact(&mut iv).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        let reason = "record shorter than its IV".to_string();
                        return Err(KeyVaultError::DecryptionFailed(reason).into());
                    }
                    Err(e) => return Err(e.into()),
                }
                key.decryptor_with_iv(&iv)
            }
            IvMode::Installation => key.decryptor(),
        };

        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut opened = Zeroizing::new(Vec::with_capacity(CHUNK_SIZE));
        loop {
            let n = input.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            decryptor.update(&chunk[..n], &mut opened);
            output.write_all(&opened).await?;
            opened.clear();
        }
        decryptor.finish(&mut opened)?;
        output.write_all(&opened).await?;
        output.flush().await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DIRECTORY
    // ═══════════════════════════════════════════════════════════════════════

    /// Stems of all ciphertext files
    pub async fn list_identifiers(&self) -> StoreResult<BTreeSet<String>> {
        let mut identifiers = BTreeSet::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(identifiers),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.is_empty() {
                    identifiers.insert(stem.to_string());
                }
            }
        }
        Ok(identifiers)
    }

    /// Remove the record. Returns whether one existed.
    pub async fn delete(&self, identifier: &str) -> StoreResult<bool> {
        validate_identifier(identifier)?;
        match fs::remove_file(self.record_path(identifier)).await {
            Ok(()) => {
                debug!(identifier, "record deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `.tmp` / `.part` files left by a crash. Returns how many.
    pub async fn sweep_staging(&self) -> StoreResult<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_staging = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some(STAGING_EXTENSION) | Some(PART_EXTENSION)
            );
            if !is_staging || !entry.file_type().await?.is_file() {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to sweep staging file"),
            }
        }

        if removed > 0 {
            warn!(dir = %self.dir.display(), removed, "removed orphaned staging files");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcinvoice_keyvault::crypto::encrypt_to_vec;
    use fcinvoice_keyvault::LocalIdentityProtector;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    async fn store_with(mode: IvMode) -> (TempDir, CipherStore) {
        let dir = tempdir().unwrap();
        let protector = LocalIdentityProtector::from_identity(b"user:test").unwrap();
        let vault = KeyVault::new(dir.path().join("KeyIV.dat"), Arc::new(protector));
        vault.ensure_initialized().await.unwrap();
        let store = CipherStore::open(dir.path().join("data"), RECORD_EXTENSION, mode, vault)
            .await
            .unwrap();
        (dir, store)
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp") || name.ends_with(".part"))
            .collect()
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("2025001"));
        assert!(is_valid_identifier("draft_2025-a"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("../KeyIV"));
        assert!(!is_valid_identifier("2025 001"));
        assert!(!is_valid_identifier(&"9".repeat(MAX_IDENTIFIER_LEN + 1)));
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (_dir, store) = store_with(IvMode::PerRecord).await;
        let payload = vec![b'x'; 3 * CHUNK_SIZE + 5];

        store.write_encrypted("2025001", &payload).await.unwrap();
        let ciphertext = std::fs::read(store.record_path("2025001")).unwrap();
        assert_ne!(&ciphertext[IV_LEN..IV_LEN + 16], &payload[..16]);

        let read = store.read_decrypted("2025001").await.unwrap().unwrap();
        assert_eq!(read.as_slice(), payload.as_slice());
        assert!(leftovers(store.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_per_record_iv_differs() {
        let (_dir, store) = store_with(IvMode::PerRecord).await;
        store.write_encrypted("2025001", b"same plaintext").await.unwrap();
        store.write_encrypted("2025002", b"same plaintext").await.unwrap();

        let a = std::fs::read(store.record_path("2025001")).unwrap();
        let b = std::fs::read(store.record_path("2025002")).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_installation_mode_is_raw_cbc() {
        let (_dir, store) = store_with(IvMode::Installation).await;
        store.write_encrypted("2024010", b"legacy layout").await.unwrap();

        let key = store.vault().load_key().await.unwrap();
        let expected = encrypt_to_vec(key.key(), key.iv(), b"legacy layout").unwrap();
        let on_disk = std::fs::read(store.record_path("2024010")).unwrap();
        assert_eq!(on_disk, expected);

        let read = store.read_decrypted("2024010").await.unwrap().unwrap();
        assert_eq!(read.as_slice(), b"legacy layout");
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let (_dir, store) = store_with(IvMode::PerRecord).await;
        assert!(store.read_decrypted("9999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_record_does_not_need_key() {
        let (dir, store) = store_with(IvMode::PerRecord).await;
        std::fs::remove_file(dir.path().join("KeyIV.dat")).unwrap();

        assert!(store.read_decrypted("2025001").await.unwrap().is_none());
        assert!(leftovers(store.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_fails_and_cleans_up() {
        let (_dir, store) = store_with(IvMode::PerRecord).await;
        store.write_encrypted("2025003", b"{\"Items\": []}").await.unwrap();

        let path = store.record_path("2025003");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&path, &bytes).unwrap();

        let result = store.read_decrypted("2025003").await;
        assert!(matches!(result, Err(StoreError::DecryptionFailed { .. })));
        assert!(leftovers(store.dir()).is_empty());

        std::fs::write(&path, [1u8; 4]).unwrap();
        let result = store.read_decrypted("2025003").await;
        assert!(matches!(result, Err(StoreError::DecryptionFailed { .. })));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_single_record() {
        let (_dir, store) = store_with(IvMode::PerRecord).await;
        store.write_encrypted("2025001", b"first").await.unwrap();
        store.write_encrypted("2025001", b"second").await.unwrap();

        let ids = store.list_identifiers().await.unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["2025001".to_string()]);
        let read = store.read_decrypted("2025001").await.unwrap().unwrap();
        assert_eq!(read.as_slice(), b"second");
    }

    #[tokio::test]
    async fn test_list_ignores_other_files() {
        let (_dir, store) = store_with(IvMode::PerRecord).await;
        store.write_encrypted("2025001", b"a").await.unwrap();
        std::fs::write(store.dir().join("notes.txt"), b"x").unwrap();
        std::fs::write(store.dir().join("2025002.enc.part"), b"x").unwrap();
        std::fs::create_dir(store.dir().join("2025003.enc")).unwrap();

        let ids = store.list_identifiers().await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("2025001"));
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let (_dir, store) = store_with(IvMode::PerRecord).await;
        store.write_encrypted("2025001", b"a").await.unwrap();

        assert!(store.delete("2025001").await.unwrap());
        assert!(!store.delete("2025001").await.unwrap());
        assert!(store.read_decrypted("2025001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_sweeps_orphans() {
        let (_dir, store) = store_with(IvMode::PerRecord).await;
        std::fs::write(store.dir().join("2025001.tmp"), b"plaintext!").unwrap();
        std::fs::write(store.dir().join("2025001.enc.part"), b"half").unwrap();

        let vault = store.vault().clone();
        let reopened = CipherStore::open(store.dir(), RECORD_EXTENSION, IvMode::PerRecord, vault)
            .await
            .unwrap();
        assert!(leftovers(reopened.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_staging_guard_removes_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2025001.tmp");
        {
            let staging = StagingFile::new(path.clone());
            std::fs::write(staging.path(), b"plaintext").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());

        let staging = StagingFile::new(path.clone());
        std::fs::write(staging.path(), b"ciphertext").unwrap();
        let target = dir.path().join("2025001.enc");
        staging.persist(&target).await.unwrap();
        assert!(target.exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_reserved_extension_rejected() {
        let (_dir, store) = store_with(IvMode::PerRecord).await;
        let vault = store.vault().clone();
        let result = CipherStore::open(store.dir(), "tmp", IvMode::PerRecord, vault).await;
        assert!(matches!(result, Err(StoreError::Config(_))));
    }
}
