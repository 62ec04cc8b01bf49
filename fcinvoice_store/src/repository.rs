//! FCInvoice Store - Invoice repository
//!
//! Single entry point for invoice persistence: save, load, list, delete and
//! identifier allocation over an encrypted record directory.
//!
//! ```rust,ignore
//! use fcinvoice_store::{Invoice, InvoiceRepository, StoreConfig};
//!
//! let repo = InvoiceRepository::open(StoreConfig::default_location()?).await?;
//! let id = repo.generate_next_identifier().await?;
//! repo.save(&Invoice::today().with_number(id.clone())).await?;
//! let invoice = repo.load(&id).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use fcinvoice_keyvault::{platform_protector, IdentityProtector, KeyVault};
use tracing::{debug, info, warn};

use crate::cipher_store::{is_valid_identifier, CipherStore};
use crate::codec;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::Invoice;
use crate::sequence::{current_period, SequenceAllocator};

/// Invoice persistence seam shared by the encrypted repository and
/// [`MemoryInvoiceStore`](crate::memory::MemoryInvoiceStore).
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Store `invoice` under its identifier, replacing any previous version.
    async fn save(&self, invoice: &Invoice) -> StoreResult<()>;

    /// `None` for blank identifiers, missing records and unreadable records.
    async fn load(&self, identifier: &str) -> StoreResult<Option<Invoice>>;

    /// Every readable invoice, identifiers descending
    async fn load_all(&self) -> StoreResult<Vec<Invoice>>;

    /// Remove a record; blank or absent identifiers are a no-op.
    async fn delete(&self, identifier: &str) -> StoreResult<()>;

    /// Next free identifier for the current year
    async fn generate_next_identifier(&self) -> StoreResult<String>;
}

/// Identifier of `invoice`, validated for use as a record name
pub(crate) fn identifier_for_save(invoice: &Invoice) -> StoreResult<&str> {
    let identifier = invoice.identifier().ok_or_else(|| {
        StoreError::InvalidIdentifier(invoice.invoice_number.clone().unwrap_or_default())
    })?;
    if !is_valid_identifier(identifier) {
        return Err(StoreError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(identifier)
}

/// Order invoices by identifier, newest first
pub(crate) fn sort_descending(invoices: &mut [Invoice]) {
    invoices.sort_by(|a, b| b.invoice_number.cmp(&a.invoice_number));
}

/// Encrypted invoice repository
pub struct InvoiceRepository {
    config: StoreConfig,
    store: CipherStore,
    allocator: SequenceAllocator,
}

impl InvoiceRepository {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Open with the platform identity protector
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let protector = platform_protector()?;
        Self::open_with_protector(config, protector).await
    }

    /// Open with an explicit identity protector.
    ///
    /// Creates the data directory and the installation key on first use and
    /// sweeps staging files left by an interrupted run.
    pub async fn open_with_protector(
        config: StoreConfig,
        protector: Arc<dyn IdentityProtector>,
    ) -> StoreResult<Self> {
        config.validate()?;

        let vault = KeyVault::new(config.key_path(), protector);
        if vault.ensure_initialized().await? {
            info!(key = %vault.key_path().display(), "initialized new installation key");
        }

        let store = CipherStore::open(
            &config.data_dir,
            config.extension.clone(),
            config.iv_mode,
            vault,
        )
        .await?;
        info!(
            dir = %store.dir().display(),
            iv_mode = ?store.iv_mode(),
            "invoice store opened"
        );

        Ok(Self {
            config,
            store,
            allocator: SequenceAllocator::new(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn cipher_store(&self) -> &CipherStore {
        &self.store
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DOCUMENTS
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn save(&self, invoice: &Invoice) -> StoreResult<()> {
        let identifier = identifier_for_save(invoice)?;
        let bytes = codec::serialize(invoice)?;

        if let Err(e) = self.store.write_encrypted(identifier, &bytes).await {
            warn!(identifier, op = "save", error = %e, "failed to save invoice");
            return Err(e);
        }
        self.allocator.observe(identifier).await;
        debug!(identifier, op = "save", items = invoice.items.len(), "invoice saved");
        Ok(())
    }

    pub async fn load(&self, identifier: &str) -> StoreResult<Option<Invoice>> {
        if identifier.trim().is_empty() {
            return Ok(None);
        }
        if !is_valid_identifier(identifier) {
            warn!(identifier, op = "load", "ignoring malformed identifier");
            return Ok(None);
        }
        self.load_record(identifier, "load").await
    }

    pub async fn load_all(&self) -> StoreResult<Vec<Invoice>> {
        let identifiers = self.store.list_identifiers().await?;
        let mut invoices = Vec::with_capacity(identifiers.len());

        for identifier in &identifiers {
            if !is_valid_identifier(identifier) {
                warn!(
                    identifier = %identifier,
                    op = "load_all",
                    "skipping record with malformed name"
                );
                continue;
            }
            match self.load_record(identifier, "load_all").await {
                Ok(Some(invoice)) => invoices.push(invoice),
                Ok(None) => {}
                Err(e) if e.is_vault_level() => return Err(e),
                Err(e) => warn!(
                    identifier = %identifier,
                    op = "load_all",
                    error = %e,
                    "skipping invoice record"
                ),
            }
        }

        sort_descending(&mut invoices);
        debug!(op = "load_all", count = invoices.len(), "invoices loaded");
        Ok(invoices)
    }

    pub async fn delete(&self, identifier: &str) -> StoreResult<()> {
        if identifier.trim().is_empty() {
            return Ok(());
        }
        if !is_valid_identifier(identifier) {
            warn!(identifier, op = "delete", "ignoring malformed identifier");
            return Ok(());
        }
        self.store.delete(identifier).await?;
        self.allocator.observe(identifier).await;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // IDENTIFIERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Next identifier for the current calendar year
    pub async fn generate_next_identifier(&self) -> StoreResult<String> {
        self.next_identifier_for(&current_period()).await
    }

    /// Next identifier for an explicit four digit period
    pub async fn next_identifier_for(&self, period: &str) -> StoreResult<String> {
        self.allocator.next_identifier(&self.store, period).await
    }

    /// Decrypt and decode one record; record-level failures become `None`.
    async fn load_record(
        &self,
        identifier: &str,
        op: &'static str,
    ) -> StoreResult<Option<Invoice>> {
        let bytes = match self.store.read_decrypted(identifier).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) if e.is_record_level() => {
                warn!(identifier, op, error = %e, "unreadable invoice record");
                return Ok(None);
            }
            Err(e) => {
                warn!(identifier, op, error = %e, "invoice store failure");
                return Err(e);
            }
        };

        match codec::deserialize(&bytes) {
            Ok(invoice) => Ok(Some(invoice)),
            Err(e) => {
                warn!(identifier, op, error = %e, "undecodable invoice record");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl InvoiceStore for InvoiceRepository {
    async fn save(&self, invoice: &Invoice) -> StoreResult<()> {
        InvoiceRepository::save(self, invoice).await
    }

    async fn load(&self, identifier: &str) -> StoreResult<Option<Invoice>> {
        InvoiceRepository::load(self, identifier).await
    }

    async fn load_all(&self) -> StoreResult<Vec<Invoice>> {
        InvoiceRepository::load_all(self).await
    }

    async fn delete(&self, identifier: &str) -> StoreResult<()> {
        InvoiceRepository::delete(self, identifier).await
    }

    async fn generate_next_identifier(&self) -> StoreResult<String> {
        InvoiceRepository::generate_next_identifier(self).await
    }
}
