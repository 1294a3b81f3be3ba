//! # Voucher Repository
//!
//! Payment, receipt and contra vouchers, each a balanced two-line journal
//! entry, plus the approval workflow for editing or deleting them.
//!
//! ## Approval Workflow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   (none) ──request_update──► update_pending ──approve──► update_approved│
//! │      │                            │                   (pending values   │
//! │      │                            └──cancel──► update_canceled  applied)│
//! │      │                                                                  │
//! │      └───request_delete──► delete_pending ──approve──► delete_approved  │
//! │                                   │                   (soft-deleted,    │
//! │                                   └──cancel──► delete_canceled  journal │
//! │                                                               removed)  │
//! │                                                                         │
//! │   A new request opens only when nothing is pending.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bazaar_core::accounts::{
    decide, request_transition, voucher_postings, Decision, UpdateStatus, Voucher, VoucherChange, VoucherInput,
    VoucherKind,
};
use bazaar_core::trade::next_number;
use bazaar_core::{new_id, ValidationError};
use chrono::{Datelike, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::accounts::{fetch_ledger, remove_postings, replace_balanced_postings, PostingContext};
use super::begin_write;
use crate::error::{DbError, DbResult};

const VOUCHER_COLUMNS: &str = "id, kind, voucher_no, debit_ledger_id, credit_ledger_id, sub_ledger_id, amount, \
     voucher_date, details, update_status, pending_amount, pending_date, pending_details, created_by, \
     created_at, updated_at, deleted_at";

/// Repository for vouchers.
#[derive(Debug, Clone)]
pub struct VoucherRepository {
    pool: SqlitePool,
}

async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Voucher> {
    let sql = format!(
        "SELECT {} FROM vouchers WHERE id = ?1 AND deleted_at IS NULL",
        VOUCHER_COLUMNS
    );
    sqlx::query_as::<_, Voucher>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Voucher", id))
}

async fn sub_ledger_name(conn: &mut SqliteConnection, id: Option<&str>) -> DbResult<Option<String>> {
    let Some(id) = id else {
        return Ok(None);
    };
    let name: Option<String> =
        sqlx::query_scalar("SELECT name FROM sub_ledger_accounts WHERE id = ?1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    name.map(Some).ok_or_else(|| DbError::not_found("Sub ledger", id))
}

/// Rewrites the two journal lines of a voucher.
async fn post(conn: &mut SqliteConnection, voucher: &Voucher) -> DbResult<()> {
    let sub_ledger = sub_ledger_name(conn, voucher.sub_ledger_id.as_deref()).await?;
    let postings = voucher_postings(
        voucher.kind,
        &voucher.debit_ledger_id,
        &voucher.credit_ledger_id,
        voucher.amount,
    );
    replace_balanced_postings(
        conn,
        &PostingContext {
            reference_no: &voucher.voucher_no,
            date: voucher.voucher_date,
            sub_ledger: sub_ledger.as_deref(),
            details: voucher.details.as_deref(),
            created_by: voucher.created_by.as_deref(),
        },
        &postings,
    )
    .await
}

async fn write_status(conn: &mut SqliteConnection, id: &str, status: UpdateStatus) -> DbResult<()> {
    sqlx::query("UPDATE vouchers SET update_status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl VoucherRepository {
    /// Creates a new VoucherRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VoucherRepository { pool }
    }

    /// Money paid out: expense ledger debited, payment ledger credited.
    pub async fn create_payment_voucher(&self, input: &VoucherInput) -> DbResult<Voucher> {
        self.create(VoucherKind::Payment, input).await
    }

    /// Money received: payment ledger debited, income or party ledger credited.
    pub async fn create_receipt_voucher(&self, input: &VoucherInput) -> DbResult<Voucher> {
        self.create(VoucherKind::Receipt, input).await
    }

    /// Cash/bank transfer: to-ledger debited, from-ledger credited.
    pub async fn create_contra(&self, input: &VoucherInput) -> DbResult<Voucher> {
        self.create(VoucherKind::Contra, input).await
    }

    async fn create(&self, kind: VoucherKind, input: &VoucherInput) -> DbResult<Voucher> {
        if !input.amount.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "amount".to_string(),
            }
            .into());
        }
        if input.debit_ledger_id == input.credit_ledger_id {
            return Err(ValidationError::InvalidFormat {
                field: "credit_ledger".to_string(),
                reason: "must differ from the debit ledger".to_string(),
            }
            .into());
        }

        let mut tx = begin_write(&self.pool).await?;
        fetch_ledger(&mut tx, &input.debit_ledger_id).await?;
        fetch_ledger(&mut tx, &input.credit_ledger_id).await?;

        let year = input.date.year();
        let latest: Option<String> = sqlx::query_scalar(
            "SELECT voucher_no FROM vouchers WHERE voucher_no LIKE ?1 ORDER BY LENGTH(voucher_no) DESC, voucher_no DESC LIMIT 1",
        )
        .bind(format!("{}-{}-%", kind.prefix(), year))
        .fetch_optional(&mut *tx)
        .await?;

        let now = Utc::now();
        let voucher = Voucher {
            id: new_id(),
            kind,
            voucher_no: next_number(kind.prefix(), year, latest.as_deref()),
            debit_ledger_id: input.debit_ledger_id.clone(),
            credit_ledger_id: input.credit_ledger_id.clone(),
            sub_ledger_id: input.sub_ledger_id.clone(),
            amount: input.amount,
            voucher_date: input.date,
            details: input.details.clone(),
            update_status: None,
            pending_amount: None,
            pending_date: None,
            pending_details: None,
            created_by: input.created_by.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        sqlx::query(
            "INSERT INTO vouchers (id, kind, voucher_no, debit_ledger_id, credit_ledger_id, sub_ledger_id, amount, \
             voucher_date, details, created_by, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&voucher.id)
        .bind(voucher.kind)
        .bind(&voucher.voucher_no)
        .bind(&voucher.debit_ledger_id)
        .bind(&voucher.credit_ledger_id)
        .bind(&voucher.sub_ledger_id)
        .bind(voucher.amount)
        .bind(voucher.voucher_date)
        .bind(&voucher.details)
        .bind(&voucher.created_by)
        .bind(voucher.created_at)
        .bind(voucher.updated_at)
        .execute(&mut *tx)
        .await?;

        post(&mut tx, &voucher).await?;
        tx.commit().await?;

        info!(voucher_no = %voucher.voucher_no, amount = %voucher.amount, "Voucher created");
        Ok(voucher)
    }

    /// Holds new values until an approver decides.
    pub async fn request_update(&self, id: &str, change: &VoucherChange) -> DbResult<Voucher> {
        if !change.amount.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "amount".to_string(),
            }
            .into());
        }
        let mut tx = begin_write(&self.pool).await?;
        let current = fetch(&mut tx, id).await?;
        let status = request_transition(current.update_status, UpdateStatus::UpdatePending)?;

        sqlx::query(
            "UPDATE vouchers SET update_status = ?2, pending_amount = ?3, pending_date = ?4, \
             pending_details = ?5, updated_at = ?6 WHERE id = ?1",
        )
        .bind(id)
        .bind(status)
        .bind(change.amount)
        .bind(change.date)
        .bind(&change.details)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let updated = fetch(&mut tx, id).await?;
        tx.commit().await?;
        debug!(voucher_no = %updated.voucher_no, "Voucher update requested");
        Ok(updated)
    }

    pub async fn request_delete(&self, id: &str) -> DbResult<Voucher> {
        let mut tx = begin_write(&self.pool).await?;
        let current = fetch(&mut tx, id).await?;
        let status = request_transition(current.update_status, UpdateStatus::DeletePending)?;
        write_status(&mut tx, id, status).await?;

        let updated = fetch(&mut tx, id).await?;
        tx.commit().await?;
        debug!(voucher_no = %updated.voucher_no, "Voucher delete requested");
        Ok(updated)
    }

    /// Approves the pending request.
    ///
    /// An approved update replaces amount, date and details with the held
    /// values and reposts the journal. An approved delete soft-deletes the
    /// voucher and removes its journal lines; `None` is returned.
    pub async fn approve(&self, id: &str) -> DbResult<Option<Voucher>> {
        let mut tx = begin_write(&self.pool).await?;
        let current = fetch(&mut tx, id).await?;
        let status = decide(current.update_status, Decision::Approve)?;

        let result = match status {
            UpdateStatus::DeleteApproved => {
                let now = Utc::now();
                sqlx::query("UPDATE vouchers SET update_status = ?2, deleted_at = ?3, updated_at = ?3 WHERE id = ?1")
                    .bind(id)
                    .bind(status)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                remove_postings(&mut tx, &current.voucher_no).await?;
                info!(voucher_no = %current.voucher_no, "Voucher deleted");
                None
            }
            _ => {
                sqlx::query(
                    "UPDATE vouchers SET update_status = ?2, \
                     amount = COALESCE(pending_amount, amount), \
                     voucher_date = COALESCE(pending_date, voucher_date), \
                     details = COALESCE(pending_details, details), \
                     pending_amount = NULL, pending_date = NULL, pending_details = NULL, \
                     updated_at = ?3 WHERE id = ?1",
                )
                .bind(id)
                .bind(status)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
                let updated = fetch(&mut tx, id).await?;
                post(&mut tx, &updated).await?;
                info!(voucher_no = %updated.voucher_no, amount = %updated.amount, "Voucher update applied");
                Some(updated)
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    /// Rejects the pending request and drops any held values.
    pub async fn cancel_request(&self, id: &str) -> DbResult<Voucher> {
        let mut tx = begin_write(&self.pool).await?;
        let current = fetch(&mut tx, id).await?;
        let status = decide(current.update_status, Decision::Cancel)?;

        sqlx::query(
            "UPDATE vouchers SET update_status = ?2, pending_amount = NULL, pending_date = NULL, \
             pending_details = NULL, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let updated = fetch(&mut tx, id).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Voucher>> {
        let sql = format!(
            "SELECT {} FROM vouchers WHERE id = ?1 AND deleted_at IS NULL",
            VOUCHER_COLUMNS
        );
        Ok(sqlx::query_as::<_, Voucher>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Vouchers waiting for an approver.
    pub async fn pending(&self) -> DbResult<Vec<Voucher>> {
        let sql = format!(
            "SELECT {} FROM vouchers WHERE update_status IN ('update_pending', 'delete_pending') \
             AND deleted_at IS NULL ORDER BY updated_at",
            VOUCHER_COLUMNS
        );
        Ok(sqlx::query_as::<_, Voucher>(&sql).fetch_all(&self.pool).await?)
    }
}
