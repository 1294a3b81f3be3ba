//! # Reports
//!
//! Aggregations over rows the database layer has already fetched.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stock report    products × current stock  ──► rows sorted by stock     │
//! │  balance sheet   ledger debit/credit totals ──► assets & liabilities    │
//! │  customer due    sales with due > 0         ──► per-customer totals     │
//! │  sms summary     messages by receiver prefix ──► per-operator counts    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::inventory::StockStatus;
use crate::money::Money;
use crate::sms::SmsStatus;
use crate::trade::Document;
use crate::types::Product;

// =============================================================================
// Stock Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRow {
    pub product_id: String,
    pub name: String,
    pub sku: String,
    pub stock: i64,
    pub price: Money,
    pub stock_value: Money,
    pub status: StockStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReport {
    pub rows: Vec<StockRow>,
    pub total_products: usize,
    pub total_stock_value: Money,
    pub low_stock_count: usize,
    pub out_of_stock_count: usize,
}

/// Builds the stock report, lowest stock first.
///
/// Low and out-of-stock counters cover every product; `only` restricts the
/// listed rows and the value total to one status.
pub fn stock_report(products: Vec<(Product, i64)>, only: Option<StockStatus>) -> StockReport {
    let mut report = StockReport::default();

    for (product, stock) in products {
        let status = StockStatus::classify(stock);
        match status {
            StockStatus::OutOfStock => report.out_of_stock_count += 1,
            StockStatus::LowStock => report.low_stock_count += 1,
            StockStatus::InStock => {}
        }
        if only.is_some_and(|wanted| wanted != status) {
            continue;
        }

        let stock_value = product.price.saturating_times(stock);
        report.total_stock_value = report.total_stock_value.saturating_add(stock_value);
        report.rows.push(StockRow {
            product_id: product.id,
            name: product.name,
            sku: product.sku,
            stock,
            price: product.price,
            stock_value,
            status,
        });
    }

    report.rows.sort_by_key(|row| row.stock);
    report.total_products = report.rows.len();
    report
}

// =============================================================================
// Balance Sheet
// =============================================================================

/// Journal totals of one ledger over the report period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LedgerTotals {
    pub ledger_id: String,
    pub ledger_name: String,
    /// Group directly above the ledger.
    pub group_name: Option<String>,
    /// Primary group at the top of the ledger's chain.
    pub primary_group: Option<String>,
    pub debit_total: Money,
    pub credit_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLine {
    pub ledger_name: String,
    pub debit_total: Money,
    pub credit_total: Money,
    /// |debit − credit|
    pub balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetGroup {
    pub name: String,
    pub lines: Vec<SheetLine>,
    pub total: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub assets: Vec<SheetGroup>,
    pub liabilities: Vec<SheetGroup>,
    pub total_assets: Money,
    pub total_liabilities: Money,
}

/// Splits ledger totals into asset and liability groups, sorted by group and
/// ledger name. Ledgers under income or expense heads are left out.
pub fn balance_sheet(totals: Vec<LedgerTotals>, date_from: NaiveDate, date_to: NaiveDate) -> BalanceSheet {
    let mut assets: BTreeMap<String, Vec<SheetLine>> = BTreeMap::new();
    let mut liabilities: BTreeMap<String, Vec<SheetLine>> = BTreeMap::new();

    for t in totals {
        let side = match t.primary_group.as_deref() {
            Some("Assets") => &mut assets,
            Some("Liabilities") => &mut liabilities,
            _ => continue,
        };
        let group = t.group_name.unwrap_or_else(|| "Ungrouped".to_string());
        side.entry(group).or_default().push(SheetLine {
            balance: (t.debit_total - t.credit_total).abs(),
            ledger_name: t.ledger_name,
            debit_total: t.debit_total,
            credit_total: t.credit_total,
        });
    }

    let assets = into_groups(assets);
    let liabilities = into_groups(liabilities);

    BalanceSheet {
        date_from: Some(date_from),
        date_to: Some(date_to),
        total_assets: assets.iter().map(|g| g.total).sum(),
        total_liabilities: liabilities.iter().map(|g| g.total).sum(),
        assets,
        liabilities,
    }
}

fn into_groups(map: BTreeMap<String, Vec<SheetLine>>) -> Vec<SheetGroup> {
    map.into_iter()
        .map(|(name, mut lines)| {
            lines.sort_by(|a, b| a.ledger_name.cmp(&b.ledger_name));
            SheetGroup {
                total: lines.iter().map(|l| l.balance).sum(),
                name,
                lines,
            }
        })
        .collect()
}

// =============================================================================
// Customer Due
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDue {
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub total_due: Money,
    pub sales_count: usize,
    pub oldest_due_date: Option<NaiveDate>,
    pub is_overdue: bool,
    pub invoices: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDueReport {
    pub customers: Vec<CustomerDue>,
    pub total_due: Money,
    /// Number of overdue sales (not customers).
    pub overdue_count: usize,
}

/// Groups unpaid sales by customer. `sales` pairs each sale with its
/// customer's name.
pub fn customer_due_report(sales: Vec<(Document, Option<String>)>, today: NaiveDate) -> CustomerDueReport {
    let mut by_customer: BTreeMap<(String, Option<String>), CustomerDue> = BTreeMap::new();
    let mut report = CustomerDueReport::default();

    for (sale, name) in sales {
        if !sale.due.is_positive() {
            continue;
        }
        let name = name.unwrap_or_else(|| "Walk-in".to_string());
        let overdue = sale.is_overdue(today);

        let entry = by_customer
            .entry((name.clone(), sale.party_id.clone()))
            .or_insert_with(|| CustomerDue {
                customer_id: sale.party_id.clone(),
                customer_name: name,
                total_due: Money::zero(),
                sales_count: 0,
                oldest_due_date: None,
                is_overdue: false,
                invoices: Vec::new(),
            });

        entry.total_due += sale.due;
        entry.sales_count += 1;
        entry.is_overdue |= overdue;
        entry.invoices.push(sale.number.clone());
        if let Some(due_date) = sale.due_date {
            entry.oldest_due_date = Some(entry.oldest_due_date.map_or(due_date, |d| d.min(due_date)));
        }

        report.total_due += sale.due;
        if overdue {
            report.overdue_count += 1;
        }
    }

    report.customers = by_customer.into_values().collect();
    report
}

// =============================================================================
// SMS Reports
// =============================================================================

/// Mobile operators a receiver can be attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    Grameenphone,
    Banglalink,
    Teletalk,
    Airtel,
    Robi,
}

impl Operator {
    pub const ALL: [Operator; 5] = [
        Operator::Grameenphone,
        Operator::Banglalink,
        Operator::Teletalk,
        Operator::Airtel,
        Operator::Robi,
    ];

    /// Digits following the leading `01` of a local number.
    fn codes(&self) -> &'static [&'static str] {
        match self {
            Operator::Grameenphone => &["3", "7"],
            Operator::Banglalink => &["4", "9"],
            Operator::Teletalk => &["5"],
            Operator::Airtel => &["6"],
            Operator::Robi => &["8"],
        }
    }

    /// Operator owning a receiver written as `01X…`, `8801X…` or `+8801X…`.
    ///
    /// ```rust
    /// use bazaar_core::reports::Operator;
    ///
    /// assert_eq!(Operator::of("+8801711000000"), Some(Operator::Grameenphone));
    /// assert_eq!(Operator::of("01811000000"), Some(Operator::Robi));
    /// assert_eq!(Operator::of("01211000000"), None);
    /// ```
    pub fn of(receiver: &str) -> Option<Operator> {
        let receiver = receiver.trim();
        let local = receiver
            .strip_prefix("+880")
            .or_else(|| receiver.strip_prefix("880"))
            .unwrap_or(receiver);
        let code = local.strip_prefix("01")?.get(..1)?;
        Operator::ALL
            .into_iter()
            .find(|op| op.codes().contains(&code))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsCounts {
    pub delivered: i64,
    pub undelivered: i64,
    pub pending: i64,
    pub total: i64,
}

impl SmsCounts {
    fn add(&mut self, status: SmsStatus, parts: i64) {
        match status {
            SmsStatus::Sent => self.delivered += parts,
            SmsStatus::Failed => self.undelivered += parts,
            SmsStatus::Pending => self.pending += parts,
        }
        self.total += parts;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorRow {
    pub operator: Operator,
    pub counts: SmsCounts,
}

/// Message parts per operator and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsSummary {
    /// One row per operator, always all five.
    pub operators: Vec<OperatorRow>,
    /// Receivers no operator claims.
    pub other: SmsCounts,
    pub totals: SmsCounts,
}

/// Sums message parts by operator.
///
/// Takes `(receiver, status, parts)` per stored original; failure copies
/// must already be filtered out or they are counted twice.
pub fn sms_summary<I, S>(messages: I) -> SmsSummary
where
    I: IntoIterator<Item = (S, SmsStatus, i64)>,
    S: AsRef<str>,
{
    let mut by_operator: BTreeMap<Operator, SmsCounts> =
        Operator::ALL.into_iter().map(|op| (op, SmsCounts::default())).collect();
    let mut other = SmsCounts::default();
    let mut totals = SmsCounts::default();

    for (receiver, status, parts) in messages {
        match Operator::of(receiver.as_ref()).and_then(|op| by_operator.get_mut(&op)) {
            Some(counts) => counts.add(status, parts),
            None => other.add(status, parts),
        }
        totals.add(status, parts);
    }

    SmsSummary {
        operators: by_operator
            .into_iter()
            .map(|(operator, counts)| OperatorRow { operator, counts })
            .collect(),
        other,
        totals,
    }
}

/// Per-gateway outcome counts; `api_name` is empty for messages that never
/// reached a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ApiSummaryRow {
    pub api_name: Option<String>,
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
    pub pending: i64,
}

/// Whose messages an SMS report covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderScope {
    #[default]
    All,
    /// One sender.
    Sender(String),
    /// Every client of a reseller.
    ClientsOf(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsReportFilter {
    pub scope: SenderScope,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(id: &str, price: i64) -> Product {
        Product {
            id: id.into(),
            name: id.to_uppercase(),
            slug: id.into(),
            sku: format!("SKU-{}", id),
            category: None,
            brand: None,
            unit: None,
            price: Money::from_minor(price),
            cost: Money::zero(),
            is_active: true,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_stock_report() {
        let report = stock_report(
            vec![(product("a", 100), 50), (product("b", 250), 4), (product("c", 10), 0)],
            None,
        );
        let stocks: Vec<i64> = report.rows.iter().map(|r| r.stock).collect();
        assert_eq!(stocks, vec![0, 4, 50]);
        assert_eq!(report.total_stock_value.minor(), 5000 + 1000);
        assert_eq!(report.low_stock_count, 1);
        assert_eq!(report.out_of_stock_count, 1);
        assert_eq!(report.total_products, 3);
    }

    #[test]
    fn test_stock_report_status_filter() {
        let report = stock_report(
            vec![(product("a", 100), 50), (product("b", 250), 4)],
            Some(StockStatus::LowStock),
        );
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].product_id, "b");
        assert_eq!(report.low_stock_count, 1);
    }

    fn totals(name: &str, group: &str, primary: &str, debit: i64, credit: i64) -> LedgerTotals {
        LedgerTotals {
            ledger_id: name.to_lowercase(),
            ledger_name: name.into(),
            group_name: Some(group.into()),
            primary_group: Some(primary.into()),
            debit_total: Money::from_minor(debit),
            credit_total: Money::from_minor(credit),
        }
    }

    #[test]
    fn test_balance_sheet() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let sheet = balance_sheet(
            vec![
                totals("Cash", "Cash In Hand", "Assets", 1000, 300),
                totals("Rahim", "Customer", "Assets", 200, 500),
                totals("Karim Traders", "Supplier", "Liabilities", 100, 900),
                totals("Sales Account", "Sales", "Income", 0, 5000),
            ],
            from,
            to,
        );

        assert_eq!(sheet.assets.len(), 2);
        assert_eq!(sheet.assets[0].name, "Cash In Hand");
        assert_eq!(sheet.assets[1].total.minor(), 300);
        assert_eq!(sheet.total_assets.minor(), 1000);
        assert_eq!(sheet.total_liabilities.minor(), 800);
    }

    fn sale(number: &str, customer: &str, due: i64, due_date: Option<NaiveDate>) -> Document {
        Document {
            id: number.into(),
            number: number.into(),
            party_id: Some(customer.into()),
            payment_ledger_id: None,
            source_id: None,
            document_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            due_date,
            subtotal: Money::from_minor(due),
            discount: Money::zero(),
            tax: Money::zero(),
            total: Money::from_minor(due),
            paid: Money::zero(),
            due: Money::from_minor(due),
            note: None,
            status: "confirmed".into(),
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_customer_due_report() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let feb = NaiveDate::from_ymd_opt(2024, 2, 1);
        let apr = NaiveDate::from_ymd_opt(2024, 4, 1);

        let report = customer_due_report(
            vec![
                (sale("SO-1", "c1", 500, feb), Some("Rahim".into())),
                (sale("SO-2", "c1", 300, apr), Some("Rahim".into())),
                (sale("SO-3", "c2", 200, apr), Some("Karim".into())),
                (sale("SO-4", "c2", 0, feb), Some("Karim".into())),
            ],
            today,
        );

        assert_eq!(report.total_due.minor(), 1000);
        assert_eq!(report.overdue_count, 1);
        assert_eq!(report.customers.len(), 2);

        let karim = &report.customers[0];
        assert_eq!(karim.customer_name, "Karim");
        assert_eq!(karim.sales_count, 1);
        assert!(!karim.is_overdue);

        let rahim = &report.customers[1];
        assert_eq!(rahim.total_due.minor(), 800);
        assert_eq!(rahim.oldest_due_date, feb);
        assert!(rahim.is_overdue);
    }

    #[test]
    fn test_operator_prefixes() {
        assert_eq!(Operator::of("01311000000"), Some(Operator::Grameenphone));
        assert_eq!(Operator::of("8801911000000"), Some(Operator::Banglalink));
        assert_eq!(Operator::of("+8801511000000"), Some(Operator::Teletalk));
        assert_eq!(Operator::of("01611000000"), Some(Operator::Airtel));
        assert_eq!(Operator::of("1711000000"), None);
        assert_eq!(Operator::of(""), None);
    }

    #[test]
    fn test_sms_summary() {
        let summary = sms_summary(vec![
            ("01711000000", SmsStatus::Sent, 2),
            ("+8801311000000", SmsStatus::Failed, 1),
            ("01811000000", SmsStatus::Pending, 1),
            ("0999", SmsStatus::Sent, 1),
        ]);

        assert_eq!(summary.operators.len(), 5);
        let gp = &summary.operators[0];
        assert_eq!(gp.operator, Operator::Grameenphone);
        assert_eq!((gp.counts.delivered, gp.counts.undelivered, gp.counts.total), (2, 1, 3));
        let robi = summary.operators.iter().find(|r| r.operator == Operator::Robi).unwrap();
        assert_eq!(robi.counts.pending, 1);
        assert_eq!(summary.other.delivered, 1);
        assert_eq!(summary.totals.total, 5);
        assert_eq!(summary.operators[2].counts, SmsCounts::default());
    }
}
