//! # Report Repository
//!
//! Loads the rows the report builders in `bazaar_core::reports` aggregate.
//!
//! SMS reports share one filter: a sender scope and an inclusive date range
//! over the day a message was sent, or stored when it never was.

use bazaar_core::inventory::StockStatus;
use bazaar_core::reports::{
    self, ApiSummaryRow, BalanceSheet, CustomerDueReport, LedgerTotals, SenderScope, SmsReportFilter, SmsSummary,
    StockReport,
};
use bazaar_core::sms::balance::BalanceLog;
use bazaar_core::sms::SmsStatus;
use chrono::NaiveDate;
use sqlx::SqlitePool;

use super::inventory::InventoryRepository;
use super::sale::SaleRepository;
use crate::error::DbResult;

/// Walks each group up to its primary group, then sums journal lines per
/// ledger inside the period.
const LEDGER_TOTALS_SQL: &str = "\
WITH RECURSIVE chain(start_id, next_id, primary_id) AS (
    SELECT id, head_group_id, head_primarygroup_id FROM groups WHERE deleted_at IS NULL
    UNION ALL
    SELECT c.start_id, g.head_group_id, g.head_primarygroup_id
    FROM chain c JOIN groups g ON g.id = c.next_id
    WHERE c.primary_id IS NULL
),
roots AS (
    SELECT start_id, primary_id FROM chain WHERE primary_id IS NOT NULL
)
SELECT l.id AS ledger_id,
       l.name AS ledger_name,
       g.name AS group_name,
       pg.name AS primary_group,
       COALESCE(SUM(a.debit), 0) AS debit_total,
       COALESCE(SUM(a.credit), 0) AS credit_total
FROM ledger_accounts l
LEFT JOIN groups g ON g.id = l.head_group_id
LEFT JOIN roots r ON r.start_id = l.head_group_id
LEFT JOIN primary_groups pg ON pg.id = COALESCE(l.head_primarygroup_id, r.primary_id)
LEFT JOIN account_logs a ON a.ledger_id = l.id AND a.log_date BETWEEN ?1 AND ?2
WHERE l.deleted_at IS NULL
GROUP BY l.id, l.name, g.name, pg.name
ORDER BY l.name";

/// Scope and date conditions on `single_sms s`, binding ?1 sender, ?2
/// reseller, ?3 from and ?4 to.
const SMS_FILTER: &str = "\
(?1 IS NULL OR s.sender_id = ?1)
AND (?2 IS NULL OR s.sender_id IN (SELECT id FROM sms_users WHERE owner_user_id = ?2))
AND (?3 IS NULL OR substr(COALESCE(s.sent_at, s.created_at), 1, 10) >= ?3)
AND (?4 IS NULL OR substr(COALESCE(s.sent_at, s.created_at), 1, 10) <= ?4)";

fn scope_binds(scope: &SenderScope) -> (Option<&str>, Option<&str>) {
    match scope {
        SenderScope::All => (None, None),
        SenderScope::Sender(id) => (Some(id.as_str()), None),
        SenderScope::ClientsOf(id) => (None, Some(id.as_str())),
    }
}

#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    /// Creates a new ReportRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Stock on hand per product, optionally narrowed to one status.
    pub async fn stock_report(&self, only: Option<StockStatus>) -> DbResult<StockReport> {
        let levels = InventoryRepository::new(self.pool.clone()).stock_levels().await?;
        Ok(reports::stock_report(levels, only))
    }

    /// Debit and credit totals per ledger between two dates, inclusive.
    pub async fn ledger_totals(&self, from: NaiveDate, to: NaiveDate) -> DbResult<Vec<LedgerTotals>> {
        Ok(sqlx::query_as::<_, LedgerTotals>(LEDGER_TOTALS_SQL)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn balance_sheet(&self, from: NaiveDate, to: NaiveDate) -> DbResult<BalanceSheet> {
        let totals = self.ledger_totals(from, to).await?;
        Ok(reports::balance_sheet(totals, from, to))
    }

    /// Unpaid sales grouped by customer; `today` decides what is overdue.
    pub async fn customer_due_report(&self, today: NaiveDate) -> DbResult<CustomerDueReport> {
        let sales = SaleRepository::new(self.pool.clone()).due_sales().await?;
        Ok(reports::customer_due_report(sales, today))
    }

    /// Outgoing message parts per operator. Failure copies are left out so
    /// each message counts once, under its final status.
    pub async fn sms_summary(&self, filter: &SmsReportFilter) -> DbResult<SmsSummary> {
        let (sender, reseller) = scope_binds(&filter.scope);
        let sql = format!(
            "SELECT s.receiver, s.status, s.msg_part_count FROM single_sms s \
             WHERE s.sms_type = 'outgoing' AND s.batch_id IS NOT NULL AND {}",
            SMS_FILTER
        );
        let rows = sqlx::query_as::<_, (String, SmsStatus, i64)>(&sql)
            .bind(sender)
            .bind(reseller)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_all(&self.pool)
            .await?;
        Ok(reports::sms_summary(rows))
    }

    /// Message records per gateway, failure copies included, in gateway
    /// priority order. Records no gateway took come last with no name.
    pub async fn api_summary(&self, filter: &SmsReportFilter) -> DbResult<Vec<ApiSummaryRow>> {
        let (sender, reseller) = scope_binds(&filter.scope);
        let sql = format!(
            "SELECT a.name AS api_name, COUNT(*) AS total, \
             SUM(CASE WHEN s.status = 'sent' THEN 1 ELSE 0 END) AS sent, \
             SUM(CASE WHEN s.status = 'failed' THEN 1 ELSE 0 END) AS failed, \
             SUM(CASE WHEN s.status = 'pending' THEN 1 ELSE 0 END) AS pending \
             FROM single_sms s LEFT JOIN sms_apis a ON a.id = s.sms_api_id \
             WHERE s.sms_type = 'outgoing' AND {} \
             GROUP BY s.sms_api_id \
             ORDER BY a.priority IS NULL, a.priority, a.name",
            SMS_FILTER
        );
        Ok(sqlx::query_as::<_, ApiSummaryRow>(&sql)
            .bind(sender)
            .bind(reseller)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Deductions and refunds, newest first.
    pub async fn balance_log_report(&self, filter: &SmsReportFilter) -> DbResult<Vec<BalanceLog>> {
        let (sender, reseller) = scope_binds(&filter.scope);
        Ok(sqlx::query_as::<_, BalanceLog>(
            "SELECT s.id, s.sender_id, s.current_balance, s.after_operation_balance, s.number_of_sms_count, \
             s.note, s.created_at FROM balance_logs s \
             WHERE (?1 IS NULL OR s.sender_id = ?1) \
             AND (?2 IS NULL OR s.sender_id IN (SELECT id FROM sms_users WHERE owner_user_id = ?2)) \
             AND (?3 IS NULL OR substr(s.created_at, 1, 10) >= ?3) \
             AND (?4 IS NULL OR substr(s.created_at, 1, 10) <= ?4) \
             ORDER BY s.created_at DESC, s.rowid DESC",
        )
        .bind(sender)
        .bind(reseller)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await?)
    }
}
