//! Installation key vault
//!
//! Owns the protected key blob on disk. The key is never cached: every
//! caller gets a fresh [`KeyMaterial`] which zeroizes itself on drop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::crypto::KeyMaterial;
use crate::error::{KeyVaultError, Result};
use crate::protector::IdentityProtector;

/// Key vault bound to one blob path and one identity protector
#[derive(Clone)]
pub struct KeyVault {
    key_path: PathBuf,
    protector: Arc<dyn IdentityProtector>,
}

impl KeyVault {
    pub fn new(key_path: impl Into<PathBuf>, protector: Arc<dyn IdentityProtector>) -> Self {
        Self {
            key_path: key_path.into(),
            protector,
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Whether a protected blob is present
    pub async fn exists(&self) -> Result<bool> {
        Ok(fs::try_exists(&self.key_path).await?)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Create the key blob if it does not exist yet.
    ///
    /// Returns `true` when fresh material was generated, `false` when a blob
    /// was already present.
    pub async fn ensure_initialized(&self) -> Result<bool> {
        if self.exists().await? {
            debug!(path = %self.key_path.display(), "key blob already present");
            return Ok(false);
        }

        if let Some(parent) = self.key_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let material = KeyMaterial::generate()?;
        let protected = self.protector.protect(&material.to_blob())?;
        drop(material);

        install_blob(&self.key_path, &protected).await?;

        info!(
            path = %self.key_path.display(),
            protector = self.protector.name(),
            "generated installation key"
        );
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // KEY ACCESS
    // ═══════════════════════════════════════════════════════════════════════

    /// Read, unwrap and split the key blob.
    pub async fn load_key(&self) -> Result<KeyMaterial> {
        let protected = match fs::read(&self.key_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KeyVaultError::KeyUnavailable(
                    self.key_path.display().to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let blob = self.protector.unprotect(&protected).map_err(|e| {
            warn!(
                path = %self.key_path.display(),
                protector = self.protector.name(),
                "failed to unprotect key blob"
            );
            KeyVaultError::KeyCorrupt(e.to_string())
        })?;

        KeyMaterial::from_blob(&blob)
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault")
            .field("key_path", &self.key_path)
            .field("protector", &self.protector.name())
            .finish()
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Temp blob removed on drop unless renamed into place
struct TempBlob {
    path: PathBuf,
    armed: bool,
}

impl Drop for TempBlob {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove temp key blob")
            }
        }
    }
}

/// Write `data` next to `target`, restrict it, then rename over `target`.
async fn install_blob(target: &Path, data: &[u8]) -> Result<()> {
    let mut temp = TempBlob {
        path: temp_path_for(target),
        armed: true,
    };
    write_synced(&temp.path, data).await?;
    restrict_permissions(&temp.path).await?;
    fs::rename(&temp.path, target).await?;
    temp.armed = false;
    Ok(())
}

async fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
