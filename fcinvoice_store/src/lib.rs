//! # FCInvoice Store
//!
//! Encrypted on-disk store for invoices.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   INVOICE REPOSITORY                      │
//! │   save / load / load_all / delete / next identifier      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────┐  │
//! │  │ RECORD CODEC │  │ CIPHER STORE │  │   SEQUENCE     │  │
//! │  │ indented JSON│  │ AES-256-CBC  │  │   ALLOCATOR    │  │
//! │  └──────────────┘  └──────┬───────┘  └────────────────┘  │
//! │                           │                               │
//! │  ┌────────────────────────┴────────────────────────────┐ │
//! │  │              FCINVOICE_KEYVAULT                      │ │
//! │  │      key + IV, protected for the current user        │ │
//! │  └─────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - One AES-256 key per installation, never rotated
//! - Fresh CBC IV per record (installation IV for legacy archives)
//! - Plaintext staging files removed on every exit path
//! - Ciphertext replaced by atomic rename

pub mod cipher_store;
pub mod codec;
pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod repository;
pub mod sequence;

pub use cipher_store::{CipherStore, IvMode, StagingFile};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryInvoiceStore;
pub use model::{Invoice, InvoiceItem};
pub use repository::{InvoiceRepository, InvoiceStore};
pub use sequence::SequenceAllocator;

/// FCInvoice Store version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
