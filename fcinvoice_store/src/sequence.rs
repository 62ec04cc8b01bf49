//! FCInvoice Store - Sequential identifier allocation
//!
//! Identifiers are `YYYYNNN`: a four digit period and a three digit sequence
//! that restarts at 001 each period. The record directory is the source of
//! truth; an in-process high-water mark per period keeps concurrent callers
//! apart and stops deleted numbers from being handed out again.

use std::collections::HashMap;

use chrono::{Datelike, Local};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cipher_store::CipherStore;
use crate::error::{StoreError, StoreResult};

/// Highest sequence number in a period
pub const MAX_SEQUENCE: u16 = 999;

const PERIOD_LEN: usize = 4;
const SEQUENCE_LEN: usize = 3;

/// Current calendar year, local time
pub fn current_period() -> String {
    format!("{:04}", Local::now().year())
}

/// Reject anything but four ASCII digits
pub fn validate_period(period: &str) -> StoreResult<()> {
    if period.len() == PERIOD_LEN && period.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(StoreError::InvalidPeriod(period.to_string()))
    }
}

/// Sequence number of `identifier` if it belongs to `period`
pub fn sequence_in_period(identifier: &str, period: &str) -> Option<u16> {
    if identifier.len() != PERIOD_LEN + SEQUENCE_LEN || !identifier.is_char_boundary(PERIOD_LEN) {
        return None;
    }
    let (prefix, suffix) = identifier.split_at(PERIOD_LEN);
    if prefix != period || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Split a `YYYYNNN` identifier into period and sequence
pub fn split_identifier(identifier: &str) -> Option<(&str, u16)> {
    if identifier.len() != PERIOD_LEN + SEQUENCE_LEN || !identifier.is_char_boundary(PERIOD_LEN) {
        return None;
    }
    let period = &identifier[..PERIOD_LEN];
    validate_period(period).ok()?;
    sequence_in_period(identifier, period).map(|sequence| (period, sequence))
}

/// Format `period ∥ %03d`
pub fn format_identifier(period: &str, sequence: u16) -> String {
    format!("{}{:03}", period, sequence)
}

/// Next number given the stored identifiers and the in-process mark
pub(crate) fn next_sequence<'a>(
    period: &str,
    identifiers: impl IntoIterator<Item = &'a String>,
    high_water: Option<u16>,
) -> StoreResult<u16> {
    let scanned = identifiers
        .into_iter()
        .filter_map(|id| sequence_in_period(id, period))
        .max()
        .unwrap_or(0);
    let last = scanned.max(high_water.unwrap_or(0));

    if last >= MAX_SEQUENCE {
        return Err(StoreError::SequenceExhausted {
            period: period.to_string(),
        });
    }
    Ok(last + 1)
}

/// Serialized allocator with a per-period high-water mark
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    issued: Mutex<HashMap<String, u16>>,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next identifier for `period` from the records in `store`.
    pub async fn next_identifier(&self, store: &CipherStore, period: &str) -> StoreResult<String> {
        validate_period(period)?;

        let mut issued = self.issued.lock().await;
        let identifiers = store.list_identifiers().await?;

        let sequence = match next_sequence(period, &identifiers, issued.get(period).copied()) {
            Ok(sequence) => sequence,
            Err(e) => {
                warn!(period, error = %e, "cannot allocate identifier");
                return Err(e);
            }
        };
        issued.insert(period.to_string(), sequence);

        let identifier = format_identifier(period, sequence);
        debug!(period, identifier = %identifier, "allocated identifier");
        Ok(identifier)
    }

    /// Raise the mark for the period of a saved or deleted `YYYYNNN` identifier.
    pub async fn observe(&self, identifier: &str) {
        if let Some((period, sequence)) = split_identifier(identifier) {
            let mut issued = self.issued.lock().await;
            raise_mark(&mut issued, period, sequence);
        }
    }
}

pub(crate) fn raise_mark(issued: &mut HashMap<String, u16>, period: &str, sequence: u16) {
    let mark = issued.entry(period.to_string()).or_insert(0);
    *mark = (*mark).max(sequence);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher_store::IvMode;
    use fcinvoice_keyvault::{KeyVault, LocalIdentityProtector};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sequence_in_period() {
        assert_eq!(sequence_in_period("2025001", "2025"), Some(1));
        assert_eq!(sequence_in_period("2025999", "2025"), Some(999));
        assert_eq!(sequence_in_period("2024999", "2025"), None);
        assert_eq!(sequence_in_period("202501", "2025"), None);
        assert_eq!(sequence_in_period("20250001", "2025"), None);
        assert_eq!(sequence_in_period("2025-01", "2025"), None);
        assert_eq!(sequence_in_period("2025+01", "2025"), None);
        assert_eq!(sequence_in_period("2025é1", "2025"), None);
    }

    #[test]
    fn test_next_after_gap() {
        let stored = ids(&["2025001", "2025002", "2025004"]);
        assert_eq!(next_sequence("2025", &stored, None).unwrap(), 5);
    }

    #[test]
    fn test_period_reset() {
        let stored = ids(&["2024999"]);
        assert_eq!(next_sequence("2025", &stored, None).unwrap(), 1);
        assert_eq!(format_identifier("2025", 1), "2025001");
    }

    #[test]
    fn test_high_water_wins() {
        let stored = ids(&["2025001"]);
        assert_eq!(next_sequence("2025", &stored, Some(7)).unwrap(), 8);
        assert_eq!(next_sequence("2025", &stored, Some(0)).unwrap(), 2);
    }

    #[test]
    fn test_exhausted() {
        let stored = ids(&["2025999"]);
        assert!(matches!(
            next_sequence("2025", &stored, None),
            Err(StoreError::SequenceExhausted { .. })
        ));
        assert!(matches!(
            next_sequence("2025", &ids(&[]), Some(MAX_SEQUENCE)),
            Err(StoreError::SequenceExhausted { .. })
        ));
    }

    #[test]
    fn test_split_identifier() {
        assert_eq!(split_identifier("2025042"), Some(("2025", 42)));
        assert_eq!(split_identifier("draft-1"), None);
        assert_eq!(split_identifier("20250001"), None);
    }

    #[tokio::test]
    async fn test_observe_raises_mark() {
        let dir = tempdir().unwrap();
        let protector = LocalIdentityProtector::from_identity(b"user:test").unwrap();
        let vault = KeyVault::new(dir.path().join("KeyIV.dat"), Arc::new(protector));
        vault.ensure_initialized().await.unwrap();
        let store = CipherStore::open(dir.path().join("data"), "enc", IvMode::PerRecord, vault)
            .await
            .unwrap();

        let allocator = SequenceAllocator::new();
        allocator.observe("2025007").await;
        allocator.observe("2025003").await;
        allocator.observe("not-a-number").await;

        assert_eq!(allocator.next_identifier(&store, "2025").await.unwrap(), "2025008");
        assert_eq!(allocator.next_identifier(&store, "2026").await.unwrap(), "2026001");
    }

    #[test]
    fn test_validate_period() {
        assert!(validate_period("2025").is_ok());
        assert!(matches!(validate_period("25"), Err(StoreError::InvalidPeriod(_))));
        assert!(matches!(validate_period("20x5"), Err(StoreError::InvalidPeriod(_))));
        assert!(validate_period(&current_period()).is_ok());
    }
}
