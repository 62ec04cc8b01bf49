//! FCInvoice Store - Record codec (indented UTF-8 JSON)

use crate::error::{StoreError, StoreResult};
use crate::model::Invoice;

/// Serialize an invoice to indented JSON bytes
pub fn serialize(invoice: &Invoice) -> StoreResult<Vec<u8>> {
    serde_json::to_vec_pretty(invoice).map_err(|e| StoreError::MalformedRecord(e.to_string()))
}

/// Decode JSON bytes into an invoice.
///
/// Bytes that are not JSON at all give `MalformedRecord`; valid JSON of the
/// wrong shape gives `SchemaMismatch`. Unknown fields are ignored.
pub fn deserialize(bytes: &[u8]) -> StoreResult<Invoice> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StoreError::MalformedRecord(format!("not UTF-8: {}", e)))?;
    // Archives written on Windows may carry a BOM.
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| StoreError::MalformedRecord(e.to_string()))?;

    serde_json::from_value(value).map_err(|e| StoreError::SchemaMismatch(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InvoiceItem;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn sample() -> Invoice {
        Invoice::new(NaiveDate::from_ymd_opt(2025, 2, 3).unwrap())
            .with_number("2025001")
            .with_item(InvoiceItem::new(
                Some(3),
                "Slab pour",
                Some(Decimal::from_str("125.50").unwrap()),
            ))
            .with_item(InvoiceItem::new(
                None,
                "Mobilization",
                Some(Decimal::from_str("80").unwrap()),
            ))
            .with_item(InvoiceItem::default())
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let invoice = sample();
        let bytes = serialize(&invoice).unwrap();
        let decoded = deserialize(&bytes).unwrap();

        assert_eq!(decoded, invoice);
        assert_eq!(decoded.total(), invoice.total());
    }

    #[test]
    fn test_output_is_indented_and_exact() {
        let text = String::from_utf8(serialize(&sample()).unwrap()).unwrap();
        assert!(text.contains("\n  \"SelectedDate\": \"2025-02-03\""));
        assert!(text.contains("\"Rate\": \"125.50\""));
        assert!(text.contains("\"InvoiceNumber\": \"2025001\""));
        assert!(!text.contains("Total"));
    }

    #[test]
    fn test_legacy_record_decodes() {
        let legacy = br#"{
  "IsCurrentInvoice": false,
  "DisplayName": "2024017",
  "SelectedDate": "2024-11-08T00:00:00",
  "InvoiceNumber": "2024017",
  "ProjectNumber": "24-000",
  "BillTo": "J.C. Concrete Inc.",
  "Items": [
    { "Quantity": 2, "Description": "Curb", "Rate": 310.75, "Amount": 621.50 },
    { "Quantity": null, "Description": null, "Rate": null, "Amount": 0 }
  ],
  "Total": 621.50
}"#;
        let invoice = deserialize(legacy).unwrap();
        assert_eq!(invoice.selected_date, NaiveDate::from_ymd_opt(2024, 11, 8).unwrap());
        assert_eq!(invoice.identifier(), Some("2024017"));
        assert_eq!(invoice.items.len(), 2);
        assert_eq!(invoice.total(), Decimal::from_str("621.50").unwrap());
    }

    #[test]
    fn test_null_invoice_number_is_allowed() {
        let json = br#"{ "SelectedDate": "2025-01-01", "InvoiceNumber": null, "Items": [] }"#;
        let invoice = deserialize(json).unwrap();
        assert_eq!(invoice.invoice_number, None);
        assert_eq!(invoice.project_number, None);
    }

    #[test]
    fn test_not_json_is_malformed() {
        assert!(matches!(deserialize(b"\x00\x01garbage"), Err(StoreError::MalformedRecord(_))));
        assert!(matches!(deserialize(b"{\"SelectedDate\": "), Err(StoreError::MalformedRecord(_))));
    }

    #[test]
    fn test_wrong_shape_is_schema_mismatch() {
        let missing_items = br#"{ "SelectedDate": "2025-01-01", "InvoiceNumber": "2025001" }"#;
        assert!(matches!(deserialize(missing_items), Err(StoreError::SchemaMismatch(_))));

        let missing_number = br#"{ "SelectedDate": "2025-01-01", "Items": [] }"#;
        assert!(matches!(deserialize(missing_number), Err(StoreError::SchemaMismatch(_))));

        let bad_quantity = br#"{ "SelectedDate": "2025-01-01", "InvoiceNumber": null,
            "Items": [ { "Quantity": -1 } ] }"#;
        assert!(matches!(deserialize(bad_quantity), Err(StoreError::SchemaMismatch(_))));

        assert!(matches!(deserialize(b"[1, 2, 3]"), Err(StoreError::SchemaMismatch(_))));
    }
}
