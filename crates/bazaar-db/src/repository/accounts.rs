//! # Account Repository
//!
//! Chart of accounts and the journal.
//!
//! ## Journal Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every journal line carries the reference_no of the record that owns   │
//! │  it (SO-2024-00001, PV-2024-00003, the ledger id for opening amounts). │
//! │                                                                         │
//! │  document saved    ──► replace_postings(reference_no, postings)        │
//! │  document cancelled ──► remove_postings(reference_no)                  │
//! │                                                                         │
//! │  Both run on the caller's transaction, so a document and its journal   │
//! │  lines are written or rolled back together.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bazaar_core::accounts::{
    ensure_balanced, ledger_balance, AccountLog, Group, GroupHead, LedgerAccount, LogType, NewLedger, Posting,
    PrimaryGroup, SubLedgerAccount, DEFAULT_GROUPS, DEFAULT_LEDGERS, DEFAULT_PRIMARY_GROUPS, DEFAULT_SUB_LEDGERS,
};
use bazaar_core::validation::{normalize_ledger_type, title_case, validate_name};
use bazaar_core::{new_id, Money, PartyKind, ValidationError};
use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::begin_write;
use crate::error::{DbError, DbResult};

const PRIMARY_GROUP_COLUMNS: &str = "id, name, is_deletable, created_by, created_at, updated_at, deleted_at";

const GROUP_COLUMNS: &str =
    "id, name, head_group_id, head_primarygroup_id, created_by, created_at, updated_at, deleted_at";

const LEDGER_COLUMNS: &str = "id, name, ledger_type, reference_id, head_group_id, head_primarygroup_id, \
     amount, is_deletable, is_default, created_by, created_at, updated_at, deleted_at";

const LOG_COLUMNS: &str =
    "id, ledger_id, sub_ledger_id, reference_no, log_type, debit, credit, log_date, details, created_by, created_at";

/// A single journal line to upsert.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub ledger_id: String,
    pub sub_ledger_id: Option<String>,
    pub reference_no: String,
    pub log_type: LogType,
    pub debit: Money,
    pub credit: Money,
    pub date: NaiveDate,
    pub details: Option<String>,
    pub created_by: Option<String>,
}

/// Repository for the chart of accounts and journal lines.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Creates a new AccountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AccountRepository { pool }
    }

    // =========================================================================
    // Primary Groups
    // =========================================================================

    /// Creates a primary group. The name is title-cased.
    pub async fn create_primary_group(
        &self,
        name: &str,
        is_deletable: bool,
        created_by: Option<&str>,
    ) -> DbResult<PrimaryGroup> {
        let mut conn = self.pool.acquire().await?;
        insert_primary_group(&mut conn, name, is_deletable, created_by).await
    }

    pub async fn get_primary_group(&self, id: &str) -> DbResult<Option<PrimaryGroup>> {
        let sql = format!(
            "SELECT {} FROM primary_groups WHERE id = ?1 AND deleted_at IS NULL",
            PRIMARY_GROUP_COLUMNS
        );
        Ok(sqlx::query_as::<_, PrimaryGroup>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Soft-deletes a primary group.
    ///
    /// ## Errors
    /// - [`CoreError::PrimaryGroupNotDeletable`] for system groups
    pub async fn delete_primary_group(&self, id: &str) -> DbResult<()> {
        let group = self
            .get_primary_group(id)
            .await?
            .ok_or_else(|| DbError::not_found("Primary group", id))?;
        group.ensure_deletable()?;

        sqlx::query("UPDATE primary_groups SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        debug!(id = %id, name = %group.name, "Primary group deleted");
        Ok(())
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Creates a group under exactly one head.
    pub async fn create_group(&self, name: &str, head: GroupHead, created_by: Option<&str>) -> DbResult<Group> {
        let mut conn = self.pool.acquire().await?;
        insert_group(&mut conn, name, &head, created_by).await
    }

    pub async fn get_group_by_name(&self, name: &str) -> DbResult<Option<Group>> {
        let sql = format!(
            "SELECT {} FROM groups WHERE name = ?1 AND deleted_at IS NULL",
            GROUP_COLUMNS
        );
        Ok(sqlx::query_as::<_, Group>(&sql)
            .bind(title_case(name))
            .fetch_optional(&self.pool)
            .await?)
    }

    // =========================================================================
    // Ledgers
    // =========================================================================

    /// Creates a ledger. A non-zero opening amount is journaled as an
    /// `opening_balance` line keyed by the ledger id.
    pub async fn create_ledger(&self, ledger: &NewLedger, created_by: Option<&str>) -> DbResult<LedgerAccount> {
        let mut tx = begin_write(&self.pool).await?;
        let created = insert_ledger(&mut tx, ledger, created_by).await?;

        if !ledger.amount.is_zero() {
            let (debit, credit) = if ledger.amount.is_positive() {
                (ledger.amount, Money::zero())
            } else {
                (Money::zero(), ledger.amount.abs())
            };
            upsert_log_in(
                &mut tx,
                &LogEntry {
                    ledger_id: created.id.clone(),
                    sub_ledger_id: None,
                    reference_no: created.id.clone(),
                    log_type: LogType::OpeningBalance,
                    debit,
                    credit,
                    date: Utc::now().date_naive(),
                    details: Some("Opening balance".to_string()),
                    created_by: created_by.map(str::to_string),
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    /// Renames a ledger and moves it to another head.
    pub async fn update_ledger(
        &self,
        id: &str,
        name: &str,
        ledger_type: Option<&str>,
        head: &GroupHead,
    ) -> DbResult<LedgerAccount> {
        let mut conn = self.pool.acquire().await?;
        let name = title_case(name);
        validate_name("name", &name)?;
        ensure_unique(&mut conn, "ledger_accounts", "name", &name, Some(id)).await?;

        let (head_group, head_primary) = head.to_parts();
        let result = sqlx::query(
            "UPDATE ledger_accounts SET name = ?2, ledger_type = ?3, head_group_id = ?4, \
             head_primarygroup_id = ?5, updated_at = ?6 WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(&name)
        .bind(ledger_type.map(normalize_ledger_type))
        .bind(head_group)
        .bind(head_primary)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Ledger", id));
        }
        fetch_ledger(&mut conn, id).await
    }

    /// Soft-deletes a ledger unless it is protected.
    pub async fn delete_ledger(&self, id: &str) -> DbResult<()> {
        let ledger = self.get_ledger(id).await?;
        ledger.ensure_deletable()?;

        sqlx::query("UPDATE ledger_accounts SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        debug!(id = %id, "Ledger deleted");
        Ok(())
    }

    /// Gets a live ledger.
    pub async fn get_ledger(&self, id: &str) -> DbResult<LedgerAccount> {
        let mut conn = self.pool.acquire().await?;
        fetch_ledger(&mut conn, id).await
    }

    pub async fn get_ledger_by_name(&self, name: &str) -> DbResult<Option<LedgerAccount>> {
        let sql = format!(
            "SELECT {} FROM ledger_accounts WHERE name = ?1 AND deleted_at IS NULL",
            LEDGER_COLUMNS
        );
        Ok(sqlx::query_as::<_, LedgerAccount>(&sql)
            .bind(title_case(name))
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Finds the ledger mirroring a record, e.g. `("customer", customer_id)`.
    pub async fn find_ledger_by_reference(
        &self,
        ledger_type: &str,
        reference_id: &str,
    ) -> DbResult<Option<LedgerAccount>> {
        let mut conn = self.pool.acquire().await?;
        find_by_reference(&mut conn, ledger_type, reference_id).await
    }

    // =========================================================================
    // Sub Ledgers
    // =========================================================================

    pub async fn create_sub_ledger(&self, name: &str) -> DbResult<SubLedgerAccount> {
        let name = title_case(name);
        validate_name("name", &name)?;
        let mut conn = self.pool.acquire().await?;
        ensure_unique(&mut conn, "sub_ledger_accounts", "name", &name, None).await?;
        insert_sub_ledger(&mut conn, &name).await
    }

    pub async fn get_or_create_sub_ledger(&self, name: &str) -> DbResult<SubLedgerAccount> {
        let mut conn = self.pool.acquire().await?;
        sub_ledger_named(&mut conn, name).await
    }

    // =========================================================================
    // Journal
    // =========================================================================

    /// Inserts a journal line, or updates the line with the same
    /// `(reference_no, log_type)`.
    pub async fn upsert_log(&self, entry: &LogEntry) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_log_in(&mut conn, entry).await
    }

    /// Removes every journal line owned by `reference_no`.
    pub async fn delete_logs(&self, reference_no: &str) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        remove_postings(&mut conn, reference_no).await
    }

    /// Journal lines of a ledger, oldest first, optionally limited to a date range.
    pub async fn ledger_logs(
        &self,
        ledger_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> DbResult<Vec<AccountLog>> {
        let sql = format!(
            "SELECT {} FROM account_logs WHERE ledger_id = ?1 \
             AND (?2 IS NULL OR log_date >= ?2) AND (?3 IS NULL OR log_date <= ?3) \
             ORDER BY log_date, created_at",
            LOG_COLUMNS
        );
        Ok(sqlx::query_as::<_, AccountLog>(&sql)
            .bind(ledger_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Σdebit − Σcredit over every journal line of the ledger.
    pub async fn ledger_balance(&self, ledger_id: &str) -> DbResult<Money> {
        let logs = self.ledger_logs(ledger_id, None, None).await?;
        Ok(ledger_balance(logs.iter().map(|l| (&l.debit, &l.credit))))
    }

    /// Lines owned by a document or voucher.
    pub async fn logs_for_reference(&self, reference_no: &str) -> DbResult<Vec<AccountLog>> {
        let sql = format!(
            "SELECT {} FROM account_logs WHERE reference_no = ?1 ORDER BY log_type, ledger_id",
            LOG_COLUMNS
        );
        Ok(sqlx::query_as::<_, AccountLog>(&sql)
            .bind(reference_no)
            .fetch_all(&self.pool)
            .await?)
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    /// Creates the default chart (primary groups, groups, ledgers, sub
    /// ledgers). Existing names are left alone, so this is safe to rerun.
    pub async fn seed_defaults(&self) -> DbResult<()> {
        let mut tx = begin_write(&self.pool).await?;

        for name in DEFAULT_PRIMARY_GROUPS {
            if primary_group_id(&mut tx, name).await?.is_none() {
                insert_primary_group(&mut tx, name, false, None).await?;
            }
        }

        for (name, primary) in DEFAULT_GROUPS {
            if group_id(&mut tx, name).await?.is_some() {
                continue;
            }
            let primary_id = primary_group_id(&mut tx, primary)
                .await?
                .ok_or_else(|| DbError::not_found("Primary group", *primary))?;
            insert_group(&mut tx, name, &GroupHead::PrimaryGroup(primary_id), None).await?;
        }

        for (name, ledger_type, group) in DEFAULT_LEDGERS {
            if ledger_id_named(&mut tx, name).await?.is_some() {
                continue;
            }
            let head = group_id(&mut tx, group)
                .await?
                .ok_or_else(|| DbError::not_found("Group", *group))?;
            let ledger = NewLedger {
                name: name.to_string(),
                ledger_type: Some(ledger_type.to_string()),
                reference_id: None,
                head: GroupHead::Group(head),
                amount: Money::zero(),
                is_deletable: false,
                is_default: true,
            };
            insert_ledger(&mut tx, &ledger, None).await?;
        }

        for name in DEFAULT_SUB_LEDGERS {
            sub_ledger_named(&mut tx, name).await?;
        }

        tx.commit().await?;
        info!("Default chart of accounts ready");
        Ok(())
    }
}

// =============================================================================
// Connection-level Helpers
// =============================================================================
// Used by other repositories inside their own transactions.

/// Fails with a duplicate error when a live row already uses `value`.
pub(crate) async fn ensure_unique(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    value: &str,
    except_id: Option<&str>,
) -> DbResult<()> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR id <> ?2)",
        table, column
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(value)
        .bind(except_id)
        .fetch_one(&mut *conn)
        .await?;
    if count > 0 {
        return Err(ValidationError::Duplicate {
            field: column.to_string(),
            value: value.to_string(),
        }
        .into());
    }
    Ok(())
}

async fn insert_primary_group(
    conn: &mut SqliteConnection,
    name: &str,
    is_deletable: bool,
    created_by: Option<&str>,
) -> DbResult<PrimaryGroup> {
    let name = title_case(name);
    validate_name("name", &name)?;
    ensure_unique(conn, "primary_groups", "name", &name, None).await?;

    let now = Utc::now();
    let group = PrimaryGroup {
        id: new_id(),
        name,
        is_deletable,
        created_by: created_by.map(str::to_string),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    sqlx::query(
        "INSERT INTO primary_groups (id, name, is_deletable, created_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&group.id)
    .bind(&group.name)
    .bind(group.is_deletable)
    .bind(&group.created_by)
    .bind(group.created_at)
    .bind(group.updated_at)
    .execute(&mut *conn)
    .await?;

    debug!(id = %group.id, name = %group.name, "Primary group created");
    Ok(group)
}

async fn insert_group(
    conn: &mut SqliteConnection,
    name: &str,
    head: &GroupHead,
    created_by: Option<&str>,
) -> DbResult<Group> {
    let name = title_case(name);
    validate_name("name", &name)?;
    ensure_unique(conn, "groups", "name", &name, None).await?;

    let (head_group, head_primary) = head.to_parts();
    let now = Utc::now();
    let group = Group {
        id: new_id(),
        name,
        head_group_id: head_group.map(str::to_string),
        head_primarygroup_id: head_primary.map(str::to_string),
        created_by: created_by.map(str::to_string),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    sqlx::query(
        "INSERT INTO groups (id, name, head_group_id, head_primarygroup_id, created_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&group.id)
    .bind(&group.name)
    .bind(&group.head_group_id)
    .bind(&group.head_primarygroup_id)
    .bind(&group.created_by)
    .bind(group.created_at)
    .bind(group.updated_at)
    .execute(&mut *conn)
    .await?;

    debug!(id = %group.id, name = %group.name, "Group created");
    Ok(group)
}

pub(crate) async fn insert_ledger(
    conn: &mut SqliteConnection,
    ledger: &NewLedger,
    created_by: Option<&str>,
) -> DbResult<LedgerAccount> {
    let name = title_case(&ledger.name);
    validate_name("name", &name)?;
    ensure_unique(conn, "ledger_accounts", "name", &name, None).await?;

    let (head_group, head_primary) = ledger.head.to_parts();
    let now = Utc::now();
    let created = LedgerAccount {
        id: new_id(),
        name,
        ledger_type: ledger.ledger_type.as_deref().map(normalize_ledger_type),
        reference_id: ledger.reference_id.clone(),
        head_group_id: head_group.map(str::to_string),
        head_primarygroup_id: head_primary.map(str::to_string),
        amount: ledger.amount,
        is_deletable: ledger.is_deletable,
        is_default: ledger.is_default,
        created_by: created_by.map(str::to_string),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    sqlx::query(
        "INSERT INTO ledger_accounts (id, name, ledger_type, reference_id, head_group_id, head_primarygroup_id, \
         amount, is_deletable, is_default, created_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )
    .bind(&created.id)
    .bind(&created.name)
    .bind(&created.ledger_type)
    .bind(&created.reference_id)
    .bind(&created.head_group_id)
    .bind(&created.head_primarygroup_id)
    .bind(created.amount)
    .bind(created.is_deletable)
    .bind(created.is_default)
    .bind(&created.created_by)
    .bind(created.created_at)
    .bind(created.updated_at)
    .execute(&mut *conn)
    .await?;

    debug!(id = %created.id, name = %created.name, "Ledger created");
    Ok(created)
}

pub(crate) async fn fetch_ledger(conn: &mut SqliteConnection, id: &str) -> DbResult<LedgerAccount> {
    let sql = format!(
        "SELECT {} FROM ledger_accounts WHERE id = ?1 AND deleted_at IS NULL",
        LEDGER_COLUMNS
    );
    sqlx::query_as::<_, LedgerAccount>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Ledger", id))
}

pub(crate) async fn find_by_reference(
    conn: &mut SqliteConnection,
    ledger_type: &str,
    reference_id: &str,
) -> DbResult<Option<LedgerAccount>> {
    let sql = format!(
        "SELECT {} FROM ledger_accounts WHERE ledger_type = ?1 AND reference_id = ?2 AND deleted_at IS NULL",
        LEDGER_COLUMNS
    );
    Ok(sqlx::query_as::<_, LedgerAccount>(&sql)
        .bind(normalize_ledger_type(ledger_type))
        .bind(reference_id)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Ledger id of a customer or supplier.
pub(crate) async fn party_ledger_id(conn: &mut SqliteConnection, kind: PartyKind, party_id: &str) -> DbResult<String> {
    find_by_reference(conn, kind.ledger_type(), party_id)
        .await?
        .map(|l| l.id)
        .ok_or_else(|| DbError::not_found(format!("{} ledger", kind), party_id))
}

async fn primary_group_id(conn: &mut SqliteConnection, name: &str) -> DbResult<Option<String>> {
    Ok(
        sqlx::query_scalar("SELECT id FROM primary_groups WHERE name = ?1 AND deleted_at IS NULL")
            .bind(title_case(name))
            .fetch_optional(&mut *conn)
            .await?,
    )
}

pub(crate) async fn group_id(conn: &mut SqliteConnection, name: &str) -> DbResult<Option<String>> {
    Ok(
        sqlx::query_scalar("SELECT id FROM groups WHERE name = ?1 AND deleted_at IS NULL")
            .bind(title_case(name))
            .fetch_optional(&mut *conn)
            .await?,
    )
}

async fn ledger_id_named(conn: &mut SqliteConnection, name: &str) -> DbResult<Option<String>> {
    Ok(
        sqlx::query_scalar("SELECT id FROM ledger_accounts WHERE name = ?1 AND deleted_at IS NULL")
            .bind(title_case(name))
            .fetch_optional(&mut *conn)
            .await?,
    )
}

async fn insert_sub_ledger(conn: &mut SqliteConnection, name: &str) -> DbResult<SubLedgerAccount> {
    let sub = SubLedgerAccount {
        id: new_id(),
        name: name.to_string(),
        created_at: Utc::now(),
        deleted_at: None,
    };
    sqlx::query("INSERT INTO sub_ledger_accounts (id, name, created_at) VALUES (?1, ?2, ?3)")
        .bind(&sub.id)
        .bind(&sub.name)
        .bind(sub.created_at)
        .execute(&mut *conn)
        .await?;
    Ok(sub)
}

/// Sub ledger with this name, created on first use.
pub(crate) async fn sub_ledger_named(conn: &mut SqliteConnection, name: &str) -> DbResult<SubLedgerAccount> {
    let name = title_case(name);
    let existing = sqlx::query_as::<_, SubLedgerAccount>(
        "SELECT id, name, created_at, deleted_at FROM sub_ledger_accounts WHERE name = ?1 AND deleted_at IS NULL",
    )
    .bind(&name)
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some(sub) => Ok(sub),
        None => insert_sub_ledger(conn, &name).await,
    }
}

pub(crate) async fn upsert_log_in(conn: &mut SqliteConnection, entry: &LogEntry) -> DbResult<()> {
    let updated = sqlx::query(
        "UPDATE account_logs SET ledger_id = ?3, sub_ledger_id = ?4, debit = ?5, credit = ?6, \
         log_date = ?7, details = ?8 WHERE reference_no = ?1 AND log_type = ?2",
    )
    .bind(&entry.reference_no)
    .bind(entry.log_type)
    .bind(&entry.ledger_id)
    .bind(&entry.sub_ledger_id)
    .bind(entry.debit)
    .bind(entry.credit)
    .bind(entry.date)
    .bind(&entry.details)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        insert_log(conn, entry).await?;
    }
    Ok(())
}

async fn insert_log(conn: &mut SqliteConnection, entry: &LogEntry) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO account_logs (id, ledger_id, sub_ledger_id, reference_no, log_type, debit, credit, \
         log_date, details, created_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )
    .bind(new_id())
    .bind(&entry.ledger_id)
    .bind(&entry.sub_ledger_id)
    .bind(&entry.reference_no)
    .bind(entry.log_type)
    .bind(entry.debit)
    .bind(entry.credit)
    .bind(entry.date)
    .bind(&entry.details)
    .bind(&entry.created_by)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Header data shared by every line of one posting set.
pub(crate) struct PostingContext<'a> {
    pub reference_no: &'a str,
    pub date: NaiveDate,
    pub sub_ledger: Option<&'a str>,
    pub details: Option<&'a str>,
    pub created_by: Option<&'a str>,
}

/// Replaces the journal lines owned by `ctx.reference_no` with `postings`.
pub(crate) async fn replace_postings(
    conn: &mut SqliteConnection,
    ctx: &PostingContext<'_>,
    postings: &[Posting],
) -> DbResult<()> {
    remove_postings(conn, ctx.reference_no).await?;

    let sub_ledger_id = match ctx.sub_ledger {
        Some(name) => Some(sub_ledger_named(conn, name).await?.id),
        None => None,
    };

    for posting in postings {
        insert_log(
            conn,
            &LogEntry {
                ledger_id: posting.ledger_id.clone(),
                sub_ledger_id: sub_ledger_id.clone(),
                reference_no: ctx.reference_no.to_string(),
                log_type: posting.log_type,
                debit: posting.debit,
                credit: posting.credit,
                date: ctx.date,
                details: ctx.details.map(str::to_string),
                created_by: ctx.created_by.map(str::to_string),
            },
        )
        .await?;
    }

    debug!(reference = %ctx.reference_no, lines = postings.len(), "Journal lines written");
    Ok(())
}

/// Like [`replace_postings`] but rejects an unbalanced set.
pub(crate) async fn replace_balanced_postings(
    conn: &mut SqliteConnection,
    ctx: &PostingContext<'_>,
    postings: &[Posting],
) -> DbResult<()> {
    ensure_balanced(postings)?;
    replace_postings(conn, ctx, postings).await
}

pub(crate) async fn remove_postings(conn: &mut SqliteConnection, reference_no: &str) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM account_logs WHERE reference_no = ?1")
        .bind(reference_no)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Soft-deletes the ledger mirroring a record.
pub(crate) async fn retire_reference_ledger(
    conn: &mut SqliteConnection,
    ledger_type: &str,
    reference_id: &str,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE ledger_accounts SET deleted_at = ?3, updated_at = ?3 \
         WHERE ledger_type = ?1 AND reference_id = ?2 AND deleted_at IS NULL",
    )
    .bind(normalize_ledger_type(ledger_type))
    .bind(reference_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.accounts().seed_defaults().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_seed_defaults_is_idempotent() {
        let db = db().await;
        db.accounts().seed_defaults().await.unwrap();

        let cash = db.accounts().get_ledger_by_name("cash").await.unwrap().unwrap();
        assert!(!cash.is_deletable);
        assert!(cash.is_default);
        assert!(db.accounts().get_group_by_name("customer").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_system_primary_group_not_deletable() {
        let db = db().await;
        let repo = db.accounts();

        let assets: String = sqlx::query_scalar("SELECT id FROM primary_groups WHERE name = 'Assets'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        let err = repo.delete_primary_group(&assets).await.unwrap_err();
        assert_eq!(err.to_string(), "Primary group is not deletable!");

        let custom = repo.create_primary_group("equity", true, None).await.unwrap();
        assert_eq!(custom.name, "Equity");
        repo.delete_primary_group(&custom.id).await.unwrap();
        assert!(repo.get_primary_group(&custom.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_names_unique_among_live_rows() {
        let db = db().await;
        let repo = db.accounts();
        let group = repo.get_group_by_name("Bank Accounts").await.unwrap().unwrap();

        let ledger = NewLedger {
            name: "city bank".into(),
            ledger_type: Some("Bank Account".into()),
            reference_id: None,
            head: GroupHead::Group(group.id.clone()),
            amount: Money::zero(),
            is_deletable: true,
            is_default: false,
        };
        let first = repo.create_ledger(&ledger, None).await.unwrap();
        assert_eq!(first.name, "City Bank");
        assert_eq!(first.ledger_type.as_deref(), Some("bank_account"));

        let dup = repo.create_ledger(&ledger, None).await.unwrap_err();
        assert!(matches!(
            dup.rule(),
            Some(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));

        repo.delete_ledger(&first.id).await.unwrap();
        repo.create_ledger(&ledger, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_opening_amount_is_journaled() {
        let db = db().await;
        let repo = db.accounts();
        let group = repo.get_group_by_name("Cash In Hand").await.unwrap().unwrap();

        let ledger = repo
            .create_ledger(
                &NewLedger {
                    name: "Petty Cash".into(),
                    ledger_type: Some("cash".into()),
                    reference_id: None,
                    head: GroupHead::Group(group.id),
                    amount: Money::from_major(500),
                    is_deletable: true,
                    is_default: false,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(repo.ledger_balance(&ledger.id).await.unwrap(), Money::from_major(500));
        let logs = repo.logs_for_reference(&ledger.id).await.unwrap();
        assert_eq!(logs[0].log_type, LogType::OpeningBalance);
    }

    #[tokio::test]
    async fn test_protected_ledger_not_deletable() {
        let db = db().await;
        let cash = db.accounts().get_ledger_by_name("Cash").await.unwrap().unwrap();
        assert!(db.accounts().delete_ledger(&cash.id).await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_log_replaces_same_key() {
        let db = db().await;
        let repo = db.accounts();
        let cash = repo.get_ledger_by_name("Cash").await.unwrap().unwrap();

        let mut entry = LogEntry {
            ledger_id: cash.id.clone(),
            sub_ledger_id: None,
            reference_no: "MAN-1".into(),
            log_type: LogType::Manual,
            debit: Money::from_major(10),
            credit: Money::zero(),
            date: Utc::now().date_naive(),
            details: None,
            created_by: None,
        };
        repo.upsert_log(&entry).await.unwrap();
        entry.debit = Money::from_major(25);
        repo.upsert_log(&entry).await.unwrap();

        assert_eq!(repo.logs_for_reference("MAN-1").await.unwrap().len(), 1);
        assert_eq!(repo.ledger_balance(&cash.id).await.unwrap(), Money::from_major(25));

        assert_eq!(repo.delete_logs("MAN-1").await.unwrap(), 1);
        assert!(repo.ledger_balance(&cash.id).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_group_head_check_constraint() {
        let db = db().await;
        let customer = db.accounts().get_group_by_name("Customer").await.unwrap().unwrap();
        let retail = db
            .accounts()
            .create_group("retail", GroupHead::Group(customer.id.clone()), None)
            .await
            .unwrap();
        assert_eq!(retail.head().unwrap(), GroupHead::Group(customer.id));
    }

    #[tokio::test]
    async fn test_sub_ledgers() {
        let db = db().await;
        let repo = db.accounts();
        let sale = repo.get_or_create_sub_ledger("sale").await.unwrap();
        assert_eq!(sale.name, "Sale");
        assert_eq!(repo.get_or_create_sub_ledger("Sale").await.unwrap().id, sale.id);
        assert!(repo.create_sub_ledger("SALE").await.is_err());
    }
}
