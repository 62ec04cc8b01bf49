//! FCInvoice Store - Error Types

use fcinvoice_keyvault::KeyVaultError;
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error types
#[derive(Error, Debug)]
pub enum StoreError {
    // ═══════════════════════════════════════════════════════════════
    // IDENTIFIER ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Invalid invoice identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid period {0:?}: expected four digits")]
    InvalidPeriod(String),

    #[error("Sequence exhausted for period {period}")]
    SequenceExhausted { period: String },

    // ═══════════════════════════════════════════════════════════════
    // KEY ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error(transparent)]
    Key(#[from] KeyVaultError),

    // ═══════════════════════════════════════════════════════════════
    // RECORD ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Decryption failed for {identifier}: {reason}")]
    DecryptionFailed { identifier: String, reason: String },

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Record does not match invoice schema: {0}")]
    SchemaMismatch(String),

    // ═══════════════════════════════════════════════════════════════
    // FILE / CONFIG ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Failures confined to a single stored record
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            StoreError::DecryptionFailed { .. }
                | StoreError::MalformedRecord(_)
                | StoreError::SchemaMismatch(_)
        )
    }

    /// Failures that make every record unreadable
    pub fn is_vault_level(&self) -> bool {
        match self {
            StoreError::Key(e) => e.is_vault_level(),
            _ => false,
        }
    }
}
