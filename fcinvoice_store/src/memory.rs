//! FCInvoice Store - In-memory invoice store
//!
//! Same contract as the encrypted repository without touching disk. Meant for
//! tests of code that consumes [`InvoiceStore`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreResult;
use crate::model::Invoice;
use crate::repository::{identifier_for_save, sort_descending, InvoiceStore};
use crate::sequence::{
    current_period, format_identifier, next_sequence, raise_mark, split_identifier, validate_period,
};

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<String, Invoice>,
    issued: HashMap<String, u16>,
}

impl MemoryState {
    fn observe(&mut self, identifier: &str) {
        if let Some((period, sequence)) = split_identifier(identifier) {
            raise_mark(&mut self.issued, period, sequence);
        }
    }
}

/// In-memory [`InvoiceStore`]
#[derive(Debug)]
pub struct MemoryInvoiceStore {
    period: Option<String>,
    state: Mutex<MemoryState>,
}

impl Default for MemoryInvoiceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self {
            period: None,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Allocate identifiers in a fixed period instead of the current year
    pub fn with_period(period: impl Into<String>) -> StoreResult<Self> {
        let period = period.into();
        validate_period(&period)?;
        Ok(Self {
            period: Some(period),
            state: Mutex::new(MemoryState::default()),
        })
    }

    /// Number of stored invoices
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all records and allocation history
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.records.clear();
        state.issued.clear();
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn save(&self, invoice: &Invoice) -> StoreResult<()> {
        let identifier = identifier_for_save(invoice)?.to_string();
        let mut state = self.state.lock();
        state.observe(&identifier);
        state.records.insert(identifier, invoice.clone());
        Ok(())
    }

    async fn load(&self, identifier: &str) -> StoreResult<Option<Invoice>> {
        Ok(self.state.lock().records.get(identifier).cloned())
    }

    async fn load_all(&self) -> StoreResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self.state.lock().records.values().cloned().collect();
        sort_descending(&mut invoices);
        Ok(invoices)
    }

    async fn delete(&self, identifier: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.records.remove(identifier);
        state.observe(identifier);
        Ok(())
    }

    async fn generate_next_identifier(&self) -> StoreResult<String> {
        let period = self.period.clone().unwrap_or_else(current_period);

        let mut state = self.state.lock();
        let high_water = state.issued.get(&period).copied();
        let sequence = next_sequence(&period, state.records.keys(), high_water)?;
        state.issued.insert(period.clone(), sequence);
        Ok(format_identifier(&period, sequence))
    }
}
