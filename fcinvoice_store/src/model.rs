//! FCInvoice Store - Invoice document model
//!
//! Field names are PascalCase to stay readable by existing archives.
//! `Amount` and `Total` are derived on demand and never stored.

use chrono::{Datelike, Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// One invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Invoice {
    /// Invoice date
    #[serde(with = "invoice_date")]
    pub selected_date: NaiveDate,
    /// Identifier in YYYYNNN format; the key must be present even when null
    #[serde(deserialize_with = "required_option")]
    pub invoice_number: Option<String>,
    /// Project reference, `yy-000` for new invoices
    #[serde(default)]
    pub project_number: Option<String>,
    /// Customer name
    #[serde(default)]
    pub bill_to: Option<String>,
    /// Ordered line items
    pub items: Vec<InvoiceItem>,
}

/// One invoice line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceItem {
    #[serde(default)]
    pub quantity: Option<u16>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rate: Option<Decimal>,
}

impl Invoice {
    /// Empty invoice dated `date`
    pub fn new(date: NaiveDate) -> Self {
        Self {
            selected_date: date,
            invoice_number: None,
            project_number: Some(default_project_number(date)),
            bill_to: None,
            items: Vec::new(),
        }
    }

    /// Empty invoice dated today (local time)
    pub fn today() -> Self {
        Self::new(Local::now().date_naive())
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.invoice_number = Some(number.into());
        self
    }

    pub fn with_item(mut self, item: InvoiceItem) -> Self {
        self.items.push(item);
        self
    }

    /// Identifier, if set and non-blank
    pub fn identifier(&self) -> Option<&str> {
        self.invoice_number
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    /// Sum of all line amounts
    pub fn total(&self) -> Decimal {
        self.items.iter().map(InvoiceItem::amount).sum()
    }
}

impl InvoiceItem {
    pub fn new(
        quantity: Option<u16>,
        description: impl Into<String>,
        rate: Option<Decimal>,
    ) -> Self {
        Self {
            quantity,
            description: Some(description.into()),
            rate,
        }
    }

    /// Line amount. A rate without a quantity counts once.
    pub fn amount(&self) -> Decimal {
        let quantity = match (self.quantity, self.rate) {
            (Some(q), _) => q,
            (None, Some(_)) => 1,
            (None, None) => 0,
        };
        Decimal::from(quantity) * self.rate.unwrap_or(Decimal::ZERO)
    }
}

/// `yy-000` for the year of `date`
pub fn default_project_number(date: NaiveDate) -> String {
    format!("{:02}-000", date.year().rem_euclid(100))
}

/// Option field whose key must be present
fn required_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Dates are written as `YYYY-MM-DD`. Timestamps (`YYYY-MM-DDTHH:MM:SS[.fff]`,
/// optionally with an offset) are accepted and truncated to their date.
mod invoice_date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const DATE_FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid invoice date: {raw:?}")))
    }

    pub(super) fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            return Some(date);
        }
        if let Ok(stamp) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(stamp.date());
        }
        DateTime::parse_from_rfc3339(raw).ok().map(|stamp| stamp.date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_amount_rules() {
        assert_eq!(InvoiceItem::new(Some(3), "Pour", Some(dec("125.50"))).amount(), dec("376.50"));
        assert_eq!(InvoiceItem::new(None, "Flat fee", Some(dec("80"))).amount(), dec("80"));
        assert_eq!(InvoiceItem::new(Some(4), "No rate", None).amount(), Decimal::ZERO);
        assert_eq!(InvoiceItem::default().amount(), Decimal::ZERO);
    }

    #[test]
    fn test_total() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let invoice = Invoice::new(date)
            .with_item(InvoiceItem::new(Some(2), "Forms", Some(dec("10.25"))))
            .with_item(InvoiceItem::new(None, "Delivery", Some(dec("45"))));
        assert_eq!(invoice.total(), dec("65.50"));
    }

    #[test]
    fn test_default_project_number() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert_eq!(Invoice::new(date).project_number.as_deref(), Some("25-000"));

        let date = NaiveDate::from_ymd_opt(2009, 1, 2).unwrap();
        assert_eq!(default_project_number(date), "09-000");
    }

    #[test]
    fn test_identifier_ignores_blank() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert_eq!(Invoice::new(date).identifier(), None);
        assert_eq!(Invoice::new(date).with_number("   ").identifier(), None);
        assert_eq!(Invoice::new(date).with_number("2025001").identifier(), Some("2025001"));
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        assert_eq!(invoice_date::parse("2025-06-30"), Some(expected));
        assert_eq!(invoice_date::parse("2025-06-30T00:00:00"), Some(expected));
        assert_eq!(invoice_date::parse("2025-06-30T13:45:10.1234567"), Some(expected));
        assert_eq!(invoice_date::parse("2025-06-30T13:45:10-05:00"), Some(expected));
        assert_eq!(invoice_date::parse("30/06/2025"), None);
    }
}
