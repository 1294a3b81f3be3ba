//! # Accounts Module
//!
//! Chart of accounts and the double-entry posting rules for every trading
//! document.
//!
//! ## Chart of Accounts
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PrimaryGroup (Assets, Liabilities, Income, Expenses)                   │
//! │       │                                                                 │
//! │       ├── Group ("Customer")          head = PrimaryGroup               │
//! │       │     └── Group ("Retail")      head = Group                      │
//! │       │                                                                 │
//! │       └── LedgerAccount ("Cash")      head = Group | PrimaryGroup       │
//! │              │                                                          │
//! │              └── AccountLog rows (debit / credit, per document)         │
//! │                                                                         │
//! │  A head is exactly ONE of group / primary group. Never none, never both.│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Posting Rules
//! ```text
//! Document          Party ledger               Payment ledger
//! ───────────────   ────────────────────────   ─────────────────────────
//! Sale              credit total               debit paid      (paid > 0)
//! Sale return       debit total                credit refunded (> 0)
//! Purchase          debit total                credit paid     (paid > 0)
//! Purchase return   credit total               debit refunded  (> 0)
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Group Head
// =============================================================================

/// Parent of a group or ledger: exactly one of a group or a primary group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum GroupHead {
    Group(String),
    PrimaryGroup(String),
}

impl GroupHead {
    /// Builds a head from the two nullable columns.
    ///
    /// ## Errors
    /// - neither set → [`CoreError::MissingHead`]
    /// - both set → [`CoreError::AmbiguousHead`]
    pub fn from_parts(head_group: Option<String>, head_primarygroup: Option<String>) -> CoreResult<Self> {
        match (head_group, head_primarygroup) {
            (Some(group), None) => Ok(GroupHead::Group(group)),
            (None, Some(primary)) => Ok(GroupHead::PrimaryGroup(primary)),
            (None, None) => Err(CoreError::MissingHead),
            (Some(_), Some(_)) => Err(CoreError::AmbiguousHead),
        }
    }

    /// Splits back into `(head_group_id, head_primarygroup_id)` columns.
    pub fn to_parts(&self) -> (Option<&str>, Option<&str>) {
        match self {
            GroupHead::Group(id) => (Some(id.as_str()), None),
            GroupHead::PrimaryGroup(id) => (None, Some(id.as_str())),
        }
    }
}

// =============================================================================
// Chart Records
// =============================================================================

/// Top of the hierarchy (Assets, Liabilities, Income, Expenses).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PrimaryGroup {
    pub id: String,
    pub name: String,
    pub is_deletable: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PrimaryGroup {
    /// Fails unless the group may be deleted.
    pub fn ensure_deletable(&self) -> CoreResult<()> {
        if self.is_deletable {
            Ok(())
        } else {
            Err(CoreError::PrimaryGroupNotDeletable)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Group {
    pub id: String,
    pub name: String,
    pub head_group_id: Option<String>,
    pub head_primarygroup_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Group {
    pub fn head(&self) -> CoreResult<GroupHead> {
        GroupHead::from_parts(self.head_group_id.clone(), self.head_primarygroup_id.clone())
    }
}

/// A postable account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LedgerAccount {
    pub id: String,
    pub name: String,
    /// Normalized key such as `customer`, `supplier`, `cash`, `bank`.
    pub ledger_type: Option<String>,
    /// Id of the record this ledger mirrors (customer or supplier id).
    pub reference_id: Option<String>,
    pub head_group_id: Option<String>,
    pub head_primarygroup_id: Option<String>,
    /// Opening amount.
    pub amount: Money,
    pub is_deletable: bool,
    pub is_default: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LedgerAccount {
    pub fn head(&self) -> CoreResult<GroupHead> {
        GroupHead::from_parts(self.head_group_id.clone(), self.head_primarygroup_id.clone())
    }

    pub fn ensure_deletable(&self) -> CoreResult<()> {
        if self.is_deletable {
            Ok(())
        } else {
            Err(CoreError::NotDeletable {
                entity: "Ledger".to_string(),
                name: self.name.clone(),
            })
        }
    }
}

/// Input for a new ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedger {
    pub name: String,
    pub ledger_type: Option<String>,
    pub reference_id: Option<String>,
    pub head: GroupHead,
    pub amount: Money,
    pub is_deletable: bool,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SubLedgerAccount {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Journal
// =============================================================================

/// Kind of journal line. Together with `reference_no` it identifies the
/// posting a document owns, so re-saving a document replaces its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    SaleCustomer,
    SalePayment,
    SaleReturnCustomer,
    SaleReturnPayment,
    PurchaseSupplier,
    PurchasePayment,
    PurchaseReturnSupplier,
    PurchaseReturnPayment,
    PaymentVoucher,
    ReceiptVoucher,
    Contra,
    OpeningBalance,
    Manual,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::SaleCustomer => "sale_customer",
            LogType::SalePayment => "sale_payment",
            LogType::SaleReturnCustomer => "sale_return_customer",
            LogType::SaleReturnPayment => "sale_return_payment",
            LogType::PurchaseSupplier => "purchase_supplier",
            LogType::PurchasePayment => "purchase_payment",
            LogType::PurchaseReturnSupplier => "purchase_return_supplier",
            LogType::PurchaseReturnPayment => "purchase_return_payment",
            LogType::PaymentVoucher => "payment_voucher",
            LogType::ReceiptVoucher => "receipt_voucher",
            LogType::Contra => "contra",
            LogType::OpeningBalance => "opening_balance",
            LogType::Manual => "manual",
        }
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AccountLog {
    pub id: String,
    pub ledger_id: String,
    pub sub_ledger_id: Option<String>,
    pub reference_no: String,
    pub log_type: LogType,
    pub debit: Money,
    pub credit: Money,
    pub log_date: NaiveDate,
    pub details: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A journal line to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub ledger_id: String,
    pub log_type: LogType,
    pub debit: Money,
    pub credit: Money,
}

impl Posting {
    pub fn debit(ledger_id: impl Into<String>, log_type: LogType, amount: Money) -> Self {
        Posting {
            ledger_id: ledger_id.into(),
            log_type,
            debit: amount,
            credit: Money::zero(),
        }
    }

    pub fn credit(ledger_id: impl Into<String>, log_type: LogType, amount: Money) -> Self {
        Posting {
            ledger_id: ledger_id.into(),
            log_type,
            debit: Money::zero(),
            credit: amount,
        }
    }
}

/// Ledgers and amounts of a trading document, as seen by the posting rules.
#[derive(Debug, Clone)]
pub struct DocumentLedgers<'a> {
    /// Customer or supplier ledger.
    pub party_ledger: &'a str,
    /// Cash/bank ledger the payment went through, if any.
    pub payment_ledger: Option<&'a str>,
    /// Document total.
    pub total: Money,
    /// Paid (sale/purchase) or refunded (returns) amount.
    pub settled: Money,
}

/// Which column of the journal a posting lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Debit,
    Credit,
}

impl Posting {
    pub fn on(side: Side, ledger_id: impl Into<String>, log_type: LogType, amount: Money) -> Self {
        match side {
            Side::Debit => Posting::debit(ledger_id, log_type, amount),
            Side::Credit => Posting::credit(ledger_id, log_type, amount),
        }
    }
}

fn party_and_payment(
    doc: &DocumentLedgers<'_>,
    party_side: Side,
    party_type: LogType,
    payment_type: LogType,
) -> Vec<Posting> {
    let payment_side = match party_side {
        Side::Debit => Side::Credit,
        Side::Credit => Side::Debit,
    };
    let mut postings = vec![Posting::on(party_side, doc.party_ledger, party_type, doc.total)];
    if let Some(ledger) = doc.payment_ledger {
        if doc.settled.is_positive() {
            postings.push(Posting::on(payment_side, ledger, payment_type, doc.settled));
        }
    }
    postings
}

/// Sale: customer credited with the total, payment ledger debited with paid.
pub fn sale_postings(doc: &DocumentLedgers<'_>) -> Vec<Posting> {
    party_and_payment(doc, Side::Credit, LogType::SaleCustomer, LogType::SalePayment)
}

/// Sale return: customer debited with the total, payment ledger credited with refunded.
pub fn sale_return_postings(doc: &DocumentLedgers<'_>) -> Vec<Posting> {
    party_and_payment(
        doc,
        Side::Debit,
        LogType::SaleReturnCustomer,
        LogType::SaleReturnPayment,
    )
}

/// Purchase: supplier debited with the total, payment ledger credited with paid.
pub fn purchase_postings(doc: &DocumentLedgers<'_>) -> Vec<Posting> {
    party_and_payment(doc, Side::Debit, LogType::PurchaseSupplier, LogType::PurchasePayment)
}

/// Purchase return: supplier credited with the total, payment ledger debited with refunded.
pub fn purchase_return_postings(doc: &DocumentLedgers<'_>) -> Vec<Posting> {
    party_and_payment(
        doc,
        Side::Credit,
        LogType::PurchaseReturnSupplier,
        LogType::PurchaseReturnPayment,
    )
}

// =============================================================================
// Vouchers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum VoucherKind {
    /// Money paid out: expense ledger debit, payment ledger credit.
    Payment,
    /// Money received: payment ledger debit, source ledger credit.
    Receipt,
    /// Transfer between cash and bank: to-ledger debit, from-ledger credit.
    Contra,
}

impl VoucherKind {
    pub fn log_type(&self) -> LogType {
        match self {
            VoucherKind::Payment => LogType::PaymentVoucher,
            VoucherKind::Receipt => LogType::ReceiptVoucher,
            VoucherKind::Contra => LogType::Contra,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            VoucherKind::Payment => "PV",
            VoucherKind::Receipt => "RV",
            VoucherKind::Contra => "CV",
        }
    }
}

/// Two-line balanced entry of a voucher.
pub fn voucher_postings(
    kind: VoucherKind,
    debit_ledger: &str,
    credit_ledger: &str,
    amount: Money,
) -> Vec<Posting> {
    vec![
        Posting::debit(debit_ledger, kind.log_type(), amount),
        Posting::credit(credit_ledger, kind.log_type(), amount),
    ]
}

/// Input for a new voucher. For payments the debit side is the expense
/// ledger; for receipts the credit side is the income or party ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherInput {
    pub debit_ledger_id: String,
    pub credit_ledger_id: String,
    pub sub_ledger_id: Option<String>,
    pub amount: Money,
    pub date: NaiveDate,
    pub details: Option<String>,
    pub created_by: Option<String>,
}

/// Replacement values proposed by an update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherChange {
    pub amount: Money,
    pub date: NaiveDate,
    pub details: Option<String>,
}

/// A persisted payment, receipt or contra voucher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Voucher {
    pub id: String,
    pub kind: VoucherKind,
    pub voucher_no: String,
    pub debit_ledger_id: String,
    pub credit_ledger_id: String,
    pub sub_ledger_id: Option<String>,
    pub amount: Money,
    pub voucher_date: NaiveDate,
    pub details: Option<String>,
    pub update_status: Option<UpdateStatus>,
    /// Values held while an update request waits for a decision.
    pub pending_amount: Option<Money>,
    pub pending_date: Option<NaiveDate>,
    pub pending_details: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Approval state of an edit or delete request on a voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    UpdatePending,
    UpdateApproved,
    UpdateCanceled,
    DeletePending,
    DeleteApproved,
    DeleteCanceled,
}

impl UpdateStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, UpdateStatus::UpdatePending | UpdateStatus::DeletePending)
    }
}

/// Approver decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Cancel,
}

/// Moves a voucher's request state forward.
///
/// A new request is allowed only when nothing is pending. A decision is
/// allowed only on a pending request.
pub fn request_transition(
    current: Option<UpdateStatus>,
    requested: UpdateStatus,
) -> CoreResult<UpdateStatus> {
    if current.map(|s| s.is_pending()).unwrap_or(false) {
        return Err(CoreError::InvalidStatus {
            document: "Voucher".to_string(),
            status: format!("{:?}", current),
            action: "open another request".to_string(),
        });
    }
    if !requested.is_pending() {
        return Err(CoreError::InvalidStatus {
            document: "Voucher".to_string(),
            status: format!("{:?}", requested),
            action: "be requested".to_string(),
        });
    }
    Ok(requested)
}

pub fn decide(current: Option<UpdateStatus>, decision: Decision) -> CoreResult<UpdateStatus> {
    match (current, decision) {
        (Some(UpdateStatus::UpdatePending), Decision::Approve) => Ok(UpdateStatus::UpdateApproved),
        (Some(UpdateStatus::UpdatePending), Decision::Cancel) => Ok(UpdateStatus::UpdateCanceled),
        (Some(UpdateStatus::DeletePending), Decision::Approve) => Ok(UpdateStatus::DeleteApproved),
        (Some(UpdateStatus::DeletePending), Decision::Cancel) => Ok(UpdateStatus::DeleteCanceled),
        (other, _) => Err(CoreError::InvalidStatus {
            document: "Voucher".to_string(),
            status: format!("{:?}", other),
            action: "be decided".to_string(),
        }),
    }
}

// =============================================================================
// Balances
// =============================================================================

/// Fails when debits and credits differ.
pub fn ensure_balanced(postings: &[Posting]) -> CoreResult<()> {
    let debit: Money = postings.iter().map(|p| p.debit).sum();
    let credit: Money = postings.iter().map(|p| p.credit).sum();
    if debit == credit {
        Ok(())
    } else {
        Err(CoreError::UnbalancedEntry {
            debit: debit.to_string(),
            credit: credit.to_string(),
        })
    }
}

/// Debit minus credit over a set of journal lines.
pub fn ledger_balance<'a>(lines: impl IntoIterator<Item = (&'a Money, &'a Money)>) -> Money {
    lines
        .into_iter()
        .fold(Money::zero(), |acc, (debit, credit)| acc + *debit - *credit)
}

// =============================================================================
// Default Chart
// =============================================================================

/// Primary groups created on a fresh database. None of them are deletable.
pub const DEFAULT_PRIMARY_GROUPS: &[&str] = &["Assets", "Liabilities", "Income", "Expenses"];

/// `(group, primary group)` pairs created on a fresh database.
pub const DEFAULT_GROUPS: &[(&str, &str)] = &[
    ("Customer", "Assets"),
    ("Cash In Hand", "Assets"),
    ("Bank Accounts", "Assets"),
    ("Supplier", "Liabilities"),
    ("Sales", "Income"),
    ("Purchase", "Expenses"),
    ("Indirect Expenses", "Expenses"),
];

/// `(ledger, ledger type, group)` defaults.
pub const DEFAULT_LEDGERS: &[(&str, &str, &str)] = &[
    ("Cash", "cash", "Cash In Hand"),
    ("Sales Account", "sales", "Sales"),
    ("Purchase Account", "purchase", "Purchase"),
];

pub const DEFAULT_SUB_LEDGERS: &[&str] = &["Sale", "Sale Return", "Purchase", "Purchase Return"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_head_requires_exactly_one() {
        assert_eq!(
            GroupHead::from_parts(Some("g".into()), None).unwrap(),
            GroupHead::Group("g".into())
        );
        assert_eq!(
            GroupHead::from_parts(None, Some("p".into())).unwrap(),
            GroupHead::PrimaryGroup("p".into())
        );
        assert!(matches!(
            GroupHead::from_parts(None, None),
            Err(CoreError::MissingHead)
        ));
        assert!(matches!(
            GroupHead::from_parts(Some("g".into()), Some("p".into())),
            Err(CoreError::AmbiguousHead)
        ));
    }

    #[test]
    fn test_primary_group_not_deletable() {
        let now = Utc::now();
        let mut group = PrimaryGroup {
            id: "pg".into(),
            name: "Assets".into(),
            is_deletable: false,
            created_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let err = group.ensure_deletable().unwrap_err();
        assert_eq!(err.to_string(), "Primary group is not deletable!");

        group.is_deletable = true;
        assert!(group.ensure_deletable().is_ok());
    }

    #[test]
    fn test_sale_postings_with_payment() {
        let doc = DocumentLedgers {
            party_ledger: "cust",
            payment_ledger: Some("cash"),
            total: Money::from_minor(10_000),
            settled: Money::from_minor(4_000),
        };
        let postings = sale_postings(&doc);
        assert_eq!(
            postings,
            vec![
                Posting::credit("cust", LogType::SaleCustomer, Money::from_minor(10_000)),
                Posting::debit("cash", LogType::SalePayment, Money::from_minor(4_000)),
            ]
        );
    }

    #[test]
    fn test_sale_postings_without_payment() {
        let unpaid = DocumentLedgers {
            party_ledger: "cust",
            payment_ledger: Some("cash"),
            total: Money::from_minor(500),
            settled: Money::zero(),
        };
        assert_eq!(sale_postings(&unpaid).len(), 1);

        let no_ledger = DocumentLedgers {
            payment_ledger: None,
            settled: Money::from_minor(500),
            ..unpaid
        };
        assert_eq!(sale_postings(&no_ledger).len(), 1);
    }

    #[test]
    fn test_return_and_purchase_sides() {
        let doc = DocumentLedgers {
            party_ledger: "party",
            payment_ledger: Some("cash"),
            total: Money::from_minor(300),
            settled: Money::from_minor(100),
        };

        let sr = sale_return_postings(&doc);
        assert_eq!(sr[0].debit, Money::from_minor(300));
        assert_eq!(sr[1].credit, Money::from_minor(100));

        let p = purchase_postings(&doc);
        assert_eq!(p[0].log_type, LogType::PurchaseSupplier);
        assert_eq!(p[0].debit, Money::from_minor(300));
        assert_eq!(p[1].credit, Money::from_minor(100));

        let pr = purchase_return_postings(&doc);
        assert_eq!(pr[0].credit, Money::from_minor(300));
        assert_eq!(pr[1].log_type, LogType::PurchaseReturnPayment);
        assert_eq!(pr[1].debit, Money::from_minor(100));
    }

    #[test]
    fn test_voucher_postings_are_balanced() {
        let postings = voucher_postings(VoucherKind::Payment, "rent", "cash", Money::from_minor(2500));
        assert!(ensure_balanced(&postings).is_ok());
        assert_eq!(postings[0].log_type, LogType::PaymentVoucher);

        let lopsided = vec![Posting::debit("a", LogType::Manual, Money::from_minor(1))];
        assert!(ensure_balanced(&lopsided).is_err());
    }

    #[test]
    fn test_ledger_balance() {
        let lines = [
            (Money::from_minor(1000), Money::zero()),
            (Money::zero(), Money::from_minor(300)),
        ];
        let balance = ledger_balance(lines.iter().map(|(d, c)| (d, c)));
        assert_eq!(balance.minor(), 700);
    }

    #[test]
    fn test_request_transitions() {
        assert_eq!(
            request_transition(None, UpdateStatus::DeletePending).unwrap(),
            UpdateStatus::DeletePending
        );
        assert!(request_transition(Some(UpdateStatus::UpdatePending), UpdateStatus::DeletePending).is_err());
        assert!(request_transition(None, UpdateStatus::UpdateApproved).is_err());

        assert_eq!(
            decide(Some(UpdateStatus::DeletePending), Decision::Approve).unwrap(),
            UpdateStatus::DeleteApproved
        );
        assert_eq!(
            decide(Some(UpdateStatus::UpdatePending), Decision::Cancel).unwrap(),
            UpdateStatus::UpdateCanceled
        );
        assert!(decide(None, Decision::Approve).is_err());
    }
}
