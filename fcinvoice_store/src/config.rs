//! FCInvoice Store - Configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cipher_store::{IvMode, RECORD_EXTENSION};
use crate::error::{StoreError, StoreResult};

/// Key blob file name inside the data directory
pub const KEY_FILE_NAME: &str = "KeyIV.dat";

/// Application directory under the platform data dir
pub const APP_DIR_NAME: &str = "fcinvoice";

/// Overrides the data directory
pub const ENV_DATA_DIR: &str = "FCINVOICE_DATA_DIR";

/// Overrides the key blob path
pub const ENV_KEY_FILE: &str = "FCINVOICE_KEY_FILE";

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Directory holding the encrypted records
    pub data_dir: PathBuf,
    /// Protected key blob; `<data_dir>/KeyIV.dat` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    /// Ciphertext extension
    #[serde(default = "default_extension")]
    pub extension: String,
    /// IV layout of record files
    #[serde(default)]
    pub iv_mode: IvMode,
}

fn default_extension() -> String {
    RECORD_EXTENSION.to_string()
}

impl StoreConfig {
    /// Records and key blob both in `dir`
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            key_file: None,
            extension: default_extension(),
            iv_mode: IvMode::default(),
        }
    }

    /// `<platform data dir>/fcinvoice`, with environment overrides applied
    pub fn default_location() -> StoreResult<Self> {
        let config = match std::env::var_os(ENV_DATA_DIR) {
            Some(dir) if !dir.is_empty() => Self::in_dir(dir),
            _ => {
                let base = dirs::data_dir().ok_or_else(|| {
                    StoreError::Config("no platform data directory; set FCINVOICE_DATA_DIR".into())
                })?;
                Self::in_dir(base.join(APP_DIR_NAME))
            }
        };
        Ok(config.with_env_overrides())
    }

    /// Read a JSON config file
    pub async fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let config: Self = serde_json::from_slice(&raw)
            .map_err(|e| StoreError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FCINVOICE_DATA_DIR` / `FCINVOICE_KEY_FILE`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = dir.into();
        }
        if let Some(key) = std::env::var_os(ENV_KEY_FILE).filter(|v| !v.is_empty()) {
            self.key_file = Some(key.into());
        }
        self
    }

    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    pub fn with_iv_mode(mut self, iv_mode: IvMode) -> Self {
        self.iv_mode = iv_mode;
        self
    }

    /// Effective key blob path
    pub fn key_path(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(KEY_FILE_NAME))
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(StoreError::Config("data_dir is empty".into()));
        }
        if self.extension.is_empty() || self.extension.contains(['.', '/', '\\']) {
            return Err(StoreError::Config(format!(
                "invalid record extension {:?}",
                self.extension
            )));
        }
        Ok(())
    }
}
