//! # Trade Module
//!
//! Sales, purchases and their returns share one document shape: a header with
//! money totals and a list of priced lines.
//!
//! ## Document Totals
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  line.subtotal  = quantity × unit_price                                 │
//! │  line.discount  = line.subtotal × discount%                             │
//! │  line.total     = line.subtotal − line.discount                         │
//! │                                                                         │
//! │  doc.subtotal   = Σ line.total                                          │
//! │  doc.total      = doc.subtotal − doc.discount + doc.tax                 │
//! │  doc.due        = doc.total − doc.paid        (never negative)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Numbering
//! ```text
//!   SO-2024-00001   sale             PO-2024-00001   purchase
//!   SR-2024-00001   sale return      PR-2024-00001   purchase return
//! ```
//! The sequence restarts every year and is independent per prefix.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::inventory::TransactionType;
use crate::money::Money;
use crate::types::PartyKind;
use crate::validation::{
    validate_discount_percent, validate_due_date, validate_non_negative, validate_quantity,
    validate_unit_price,
};

// =============================================================================
// Lines
// =============================================================================

/// A priced line as entered on a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    /// Line discount in basis points (0..=10000).
    #[serde(default)]
    pub discount_bps: i64,
    /// Source line a return item refers to.
    #[serde(default)]
    pub source_item_id: Option<String>,
}

impl LineInput {
    pub fn new(product_id: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
            discount_bps: 0,
            source_item_id: None,
        }
    }

    pub fn with_discount(mut self, bps: i64) -> Self {
        self.discount_bps = bps;
        self
    }

    pub fn returning(mut self, source_item_id: impl Into<String>) -> Self {
        self.source_item_id = Some(source_item_id.into());
        self
    }

    /// Validates and prices the line.
    pub fn totals(&self) -> CoreResult<LineTotals> {
        validate_quantity(self.quantity)?;
        validate_unit_price(self.unit_price)?;
        validate_discount_percent(self.discount_bps)?;

        let subtotal = self.unit_price.checked_times(self.quantity).ok_or_else(|| too_large("line total"))?;
        let discount_amount = subtotal.percent_of(self.discount_bps);
        Ok(LineTotals {
            subtotal,
            discount_amount,
            total: subtotal - discount_amount,
        })
    }
}

fn too_large(field: &str) -> CoreError {
    ValidationError::TooLarge {
        field: field.to_string(),
    }
    .into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    pub subtotal: Money,
    pub discount_amount: Money,
    pub total: Money,
}

// =============================================================================
// Documents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    /// Paid on a sale or purchase, refunded on a return.
    pub paid: Money,
    pub due: Money,
}

impl DocumentTotals {
    /// Computes header totals from priced lines.
    ///
    /// ## Errors
    /// - Negative discount, tax or paid amounts
    /// - A document discount larger than the lines (negative total)
    /// - `paid` greater than `total`
    pub fn compute(lines: &[LineInput], discount: Money, tax: Money, paid: Money) -> CoreResult<Self> {
        validate_non_negative("discount", discount)?;
        validate_non_negative("tax", tax)?;
        validate_non_negative("paid", paid)?;

        let mut subtotal = Money::zero();
        for line in lines {
            subtotal = subtotal
                .checked_add(line.totals()?.total)
                .ok_or_else(|| too_large("subtotal"))?;
        }

        let total = subtotal
            .checked_sub(discount)
            .and_then(|t| t.checked_add(tax))
            .ok_or_else(|| too_large("total"))?;
        validate_non_negative("total", total)?;

        if paid > total {
            return Err(CoreError::OverPayment {
                paid: paid.to_string(),
                total: total.to_string(),
            });
        }

        Ok(Self {
            subtotal,
            discount,
            tax,
            total,
            paid,
            due: total - paid,
        })
    }
}

/// Header fields shared by every document input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    /// Customer or supplier.
    pub party_id: String,
    /// Cash or bank ledger that received or paid money.
    pub payment_ledger_id: Option<String>,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub lines: Vec<LineInput>,
    pub discount: Money,
    pub tax: Money,
    /// Paid (sale, purchase) or refunded (return) amount.
    pub paid: Money,
    pub note: Option<String>,
    /// Source sale or purchase of a return.
    pub source_id: Option<String>,
    pub created_by: Option<String>,
}

impl DocumentInput {
    /// Validates dates and lines and returns the computed totals.
    pub fn validate(&self, document: &str) -> CoreResult<DocumentTotals> {
        validate_due_date(document, self.date, self.due_date)?;
        if self.lines.is_empty() {
            return Err(crate::error::ValidationError::Required {
                field: "items".to_string(),
            }
            .into());
        }
        DocumentTotals::compute(&self.lines, self.discount, self.tax, self.paid)
    }
}

// =============================================================================
// Statuses
// =============================================================================

macro_rules! document_status {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
        #[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            #[default]
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

document_status!(
    /// Lifecycle of a sale.
    SaleStatus { Draft => "draft", Confirmed => "confirmed", Delivered => "delivered", Cancelled => "cancelled" }
);

document_status!(
    /// Lifecycle of a purchase.
    PurchaseStatus { Draft => "draft", Confirmed => "confirmed", Received => "received", Cancelled => "cancelled" }
);

document_status!(
    /// Lifecycle of a sale or purchase return.
    ReturnStatus { Draft => "draft", Confirmed => "confirmed", Processed => "processed", Cancelled => "cancelled" }
);

/// Fails when a cancelled document is modified.
pub fn ensure_not_cancelled(document: &str, status: &str, action: &str) -> CoreResult<()> {
    if status == "cancelled" {
        return Err(CoreError::InvalidStatus {
            document: document.to_string(),
            status: status.to_string(),
            action: action.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numbering
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Sale,
    Purchase,
    SaleReturn,
    PurchaseReturn,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Sale => "SO",
            DocumentKind::Purchase => "PO",
            DocumentKind::SaleReturn => "SR",
            DocumentKind::PurchaseReturn => "PR",
        }
    }

    /// Header table.
    pub fn table(&self) -> &'static str {
        match self {
            DocumentKind::Sale => "sales",
            DocumentKind::Purchase => "purchases",
            DocumentKind::SaleReturn => "sale_returns",
            DocumentKind::PurchaseReturn => "purchase_returns",
        }
    }

    /// Line item table.
    pub fn item_table(&self) -> &'static str {
        match self {
            DocumentKind::Sale => "sale_items",
            DocumentKind::Purchase => "purchase_items",
            DocumentKind::SaleReturn => "sale_return_items",
            DocumentKind::PurchaseReturn => "purchase_return_items",
        }
    }

    /// Stock movement each line produces.
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            DocumentKind::Sale => TransactionType::Sale,
            DocumentKind::Purchase => TransactionType::Purchase,
            DocumentKind::SaleReturn => TransactionType::SaleReturn,
            DocumentKind::PurchaseReturn => TransactionType::PurchaseReturn,
        }
    }

    pub fn party(&self) -> PartyKind {
        match self {
            DocumentKind::Sale | DocumentKind::SaleReturn => PartyKind::Customer,
            DocumentKind::Purchase | DocumentKind::PurchaseReturn => PartyKind::Supplier,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Sale => "Sale",
            DocumentKind::Purchase => "Purchase",
            DocumentKind::SaleReturn => "Sale return",
            DocumentKind::PurchaseReturn => "Purchase return",
        }
    }
}

/// Formats `PREFIX-YEAR-NNNNN`.
pub fn document_number(kind: DocumentKind, year: i32, sequence: u32) -> String {
    format!("{}-{}-{:05}", kind.prefix(), year, sequence)
}

/// Next number after the latest one issued this year.
///
/// `latest` is the highest existing number with the same prefix and year, or
/// `None` for the first document of the year. A latest number that does not
/// parse restarts the sequence at 1.
///
/// ## Example
/// ```rust
/// use bazaar_core::trade::{next_document_number, DocumentKind};
///
/// assert_eq!(next_document_number(DocumentKind::Sale, 2024, None), "SO-2024-00001");
/// assert_eq!(
///     next_document_number(DocumentKind::Sale, 2024, Some("SO-2024-00041")),
///     "SO-2024-00042"
/// );
/// ```
pub fn next_document_number(kind: DocumentKind, year: i32, latest: Option<&str>) -> String {
    next_number(kind.prefix(), year, latest)
}

/// [`next_document_number`] for any prefix (vouchers use `PV`, `RV`, `CV`).
pub fn next_number(prefix: &str, year: i32, latest: Option<&str>) -> String {
    let head = format!("{}-{}-", prefix, year);
    let next = latest
        .and_then(|n| n.strip_prefix(&head))
        .and_then(|seq| seq.parse::<u32>().ok())
        .map(|seq| seq + 1)
        .unwrap_or(1);
    format!("{}{:05}", head, next)
}

// =============================================================================
// Returns
// =============================================================================

/// Checks every return line against what is still returnable.
///
/// `sold` maps product id to the quantity on the source document and
/// `returned` to the quantity already returned on earlier returns.
pub fn check_return_quantities(
    lines: &[LineInput],
    sold: &HashMap<String, i64>,
    returned: &HashMap<String, i64>,
) -> CoreResult<()> {
    let mut requested: HashMap<&str, i64> = HashMap::new();
    for line in lines {
        *requested.entry(line.product_id.as_str()).or_default() += line.quantity;
    }

    for (product, qty) in requested {
        let on_source = sold.get(product).copied().unwrap_or(0);
        let already = returned.get(product).copied().unwrap_or(0);
        let returnable = (on_source - already).max(0);
        if qty > returnable {
            return Err(CoreError::ReturnQuantityExceeded {
                product: product.to_string(),
                returnable,
                requested: qty,
            });
        }
    }
    Ok(())
}

/// A refund may not exceed what the party still owes on the source document.
pub fn check_refund(refund: Money, source_due: Money) -> CoreResult<()> {
    if refund > source_due {
        return Err(CoreError::RefundExceedsDue {
            due: source_due.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Records
// =============================================================================

/// Persisted header of any trade document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Document {
    pub id: String,
    pub number: String,
    pub party_id: Option<String>,
    pub payment_ledger_id: Option<String>,
    pub source_id: Option<String>,
    pub document_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    pub paid: Money,
    pub due: Money,
    pub note: Option<String>,
    pub status: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Overdue when money is owed and the due date has passed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due.is_positive() && self.due_date.map(|d| d < today).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DocumentItem {
    pub id: String,
    pub document_id: String,
    pub product_id: String,
    pub source_item_id: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount_bps: i64,
    pub discount_amount: Money,
    pub total_price: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(qty: i64, price: i64) -> LineInput {
        LineInput::new("p1", qty, Money::from_minor(price))
    }

    #[test]
    fn test_line_totals() {
        let totals = line(3, 1000).with_discount(1000).totals().unwrap();
        assert_eq!(totals.subtotal.minor(), 3000);
        assert_eq!(totals.discount_amount.minor(), 300);
        assert_eq!(totals.total.minor(), 2700);
    }

    #[test]
    fn test_line_validation() {
        assert!(line(0, 100).totals().is_err());
        assert!(line(1, -1).totals().is_err());
        assert!(line(1, 100).with_discount(10_001).totals().is_err());
        assert!(line(1, 0).totals().is_ok());
    }

    #[test]
    fn test_document_totals() {
        let lines = vec![line(2, 500), line(1, 250).with_discount(2000)];
        let t = DocumentTotals::compute(
            &lines,
            Money::from_minor(100),
            Money::from_minor(50),
            Money::from_minor(600),
        )
        .unwrap();

        assert_eq!(t.subtotal.minor(), 1200);
        assert_eq!(t.total.minor(), 1150);
        assert_eq!(t.due.minor(), 550);
    }

    #[test]
    fn test_oversized_amounts_are_rejected() {
        let err = LineInput::new("p1", i64::MAX / 10, Money::from_major(1)).totals().unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::TooLarge { .. })));

        let half = i64::MAX / 2 + 1;
        let err = DocumentTotals::compute(&[line(1, half), line(1, half)], Money::zero(), Money::zero(), Money::zero())
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: subtotal is too large");
    }

    #[test]
    fn test_document_totals_rejects_overpayment() {
        let err = DocumentTotals::compute(&[line(1, 100)], Money::zero(), Money::zero(), Money::from_minor(101))
            .unwrap_err();
        assert!(matches!(err, CoreError::OverPayment { .. }));
    }

    #[test]
    fn test_document_totals_rejects_negative_total() {
        let result = DocumentTotals::compute(&[line(1, 100)], Money::from_minor(200), Money::zero(), Money::zero());
        assert!(result.is_err());
    }

    #[test]
    fn test_document_requires_items_and_valid_due_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut input = DocumentInput {
            party_id: "c1".into(),
            payment_ledger_id: None,
            date,
            due_date: None,
            lines: vec![],
            discount: Money::zero(),
            tax: Money::zero(),
            paid: Money::zero(),
            note: None,
            source_id: None,
            created_by: None,
        };
        assert!(input.validate("sale").is_err());

        input.lines.push(line(1, 100));
        input.due_date = NaiveDate::from_ymd_opt(2024, 2, 28);
        assert!(input.validate("sale").is_err());

        input.due_date = Some(date);
        assert_eq!(input.validate("sale").unwrap().total.minor(), 100);
    }

    #[test]
    fn test_document_numbers() {
        assert_eq!(document_number(DocumentKind::Purchase, 2024, 7), "PO-2024-00007");
        assert_eq!(next_document_number(DocumentKind::SaleReturn, 2025, None), "SR-2025-00001");
        assert_eq!(
            next_document_number(DocumentKind::PurchaseReturn, 2025, Some("PR-2025-00009")),
            "PR-2025-00010"
        );
        // last year's number does not carry over
        assert_eq!(
            next_document_number(DocumentKind::Sale, 2025, Some("SO-2024-00120")),
            "SO-2025-00001"
        );
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(SaleStatus::default(), SaleStatus::Draft);
        assert_eq!(PurchaseStatus::Received.to_string(), "received");
        assert_eq!(ReturnStatus::Processed.as_str(), "processed");
        assert!(ensure_not_cancelled("Sale", "cancelled", "update").is_err());
        assert!(ensure_not_cancelled("Sale", "confirmed", "update").is_ok());
    }

    #[test]
    fn test_return_quantities() {
        let sold = HashMap::from([("p1".to_string(), 5), ("p2".to_string(), 2)]);
        let returned = HashMap::from([("p1".to_string(), 3)]);

        assert!(check_return_quantities(&[LineInput::new("p1", 2, Money::zero())], &sold, &returned).is_ok());

        // two lines of the same product are summed
        let lines = vec![LineInput::new("p1", 1, Money::zero()), LineInput::new("p1", 2, Money::zero())];
        assert!(matches!(
            check_return_quantities(&lines, &sold, &returned),
            Err(CoreError::ReturnQuantityExceeded { returnable: 2, requested: 3, .. })
        ));

        assert!(check_return_quantities(&[LineInput::new("p9", 1, Money::zero())], &sold, &returned).is_err());
    }

    #[test]
    fn test_refund_limited_by_due() {
        assert!(check_refund(Money::from_minor(500), Money::from_minor(500)).is_ok());
        let err = check_refund(Money::from_minor(501), Money::from_minor(500)).unwrap_err();
        assert_eq!(err.to_string(), "Refund amount cannot exceed the due amount (5.00)");
    }

    #[test]
    fn test_overdue() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut doc = Document {
            id: "s1".into(),
            number: "SO-2024-00001".into(),
            party_id: Some("c1".into()),
            payment_ledger_id: None,
            source_id: None,
            document_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 5, 31),
            subtotal: Money::from_minor(100),
            discount: Money::zero(),
            tax: Money::zero(),
            total: Money::from_minor(100),
            paid: Money::zero(),
            due: Money::from_minor(100),
            note: None,
            status: "confirmed".into(),
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(doc.is_overdue(today));
        doc.due = Money::zero();
        assert!(!doc.is_overdue(today));
    }
}
