//! # Database Migrations
//!
//! Embedded SQL migrations for Bazaar.
//!
//! ## Schema Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      migrations/sqlite                                  │
//! │                                                                         │
//! │  001_accounts.sql  primary_groups, groups, ledger_accounts,            │
//! │                    sub_ledger_accounts, account_logs, vouchers          │
//! │                                                                         │
//! │  002_trade.sql     customers, suppliers, products,                     │
//! │                    inventory_transactions, sales / purchases /          │
//! │                    sale_returns / purchase_returns (+ items)            │
//! │                                                                         │
//! │  003_sms.sql       packages, sms_users (wallets), developer_apis,      │
//! │                    sms_apis, assign_sms_apis, single_sms,               │
//! │                    balance_logs, transactions                           │
//! │                                                                         │
//! │  004_contacts.sql  contact_groups, contacts                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Name format: `NNN_description.sql` (e.g., `004_add_sms_templates.sql`)
//! 3. Write idempotent SQL (use `IF NOT EXISTS` where possible)
//! 4. **NEVER** modify existing migrations - always add new ones

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
///
/// Idempotent: applied migrations are recorded in `_sqlx_migrations` and
/// skipped on the next run. Each migration runs in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)` for health checks.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
