//! # SMS Repository
//!
//! Users and their wallets, packages, gateways, message records and the
//! balance bookkeeping around a send.
//!
//! ## Deduction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  deduct_balance(client, parts)              one transaction             │
//! │                                                                         │
//! │  client ──► reseller (owner_user)  +  package  +  region                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Charge::for_parts ──► slot column, units                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE sms_users SET col = col − units WHERE id = client   AND col > units
//! │  UPDATE sms_users SET col = col − units WHERE id = reseller AND col > units
//! │       │                                                                 │
//! │       ├── either touched 0 rows ──► rollback, LowBalance { parts }      │
//! │       └── both touched          ──► BalanceLog ("decreasing balance")   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guard in the WHERE clause makes two concurrent sends for the same
//! wallet serialize on SQLite's write lock instead of both passing a stale
//! read.

use std::collections::HashMap;

use bazaar_core::sms::balance::{
    check_recharge, check_validity, deduct, BalanceLog, BillType, Charge, Package, PrefixCharge, Region, Slot, SlotKind,
    SmsUser, Transaction, TransactionType, UserRole, Wallet,
};
use bazaar_core::sms::gateway::{select_gateways, validate_api, Assignment, SmsApi};
use bazaar_core::sms::{DeveloperApi, GatewayType, OutgoingSms, SingleSms, SmsStatus, SmsType};
use bazaar_core::validation::validate_name;
use bazaar_core::{new_id, CoreError, Money, ValidationError};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::begin_write;
use crate::error::{DbError, DbResult};

const USER_COLUMNS: &str = "id, username, role, owner_user_id, package_id, region_type, balance_valid_till, \
     local_masking_balance, local_non_masking_balance, local_masking_message_amount, \
     local_non_masking_message_amount, international_masking_balance, international_non_masking_balance, \
     international_masking_message_amount, international_non_masking_message_amount, created_at, updated_at";

const PACKAGE_COLUMNS: &str = "id, name, owner_user_id, bill_type, is_deletable, masking_national_charge, \
     non_masking_national_charge, masking_international_charge, non_masking_international_charge, prefix_based, \
     created_at, updated_at";

const API_COLUMNS: &str = "id, name, vendor_name, url, priority, is_deletable, created_at, updated_at";

const SMS_COLUMNS: &str = "id, sender_id, sender_ip_address, msg_part_count, sms_api_id, receiver, message, status, \
     sms_type, gateway_type, is_sent, failure_reason, batch_id, sent_at, created_at, updated_at";

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSmsUser {
    pub username: String,
    pub role: UserRole,
    pub owner_user_id: Option<String>,
    pub package_id: Option<String>,
    pub region_type: Option<Region>,
    pub balance_valid_till: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPackage {
    pub name: String,
    pub owner_user_id: Option<String>,
    pub bill_type: BillType,
    pub masking_national_charge: Money,
    pub non_masking_national_charge: Money,
    pub masking_international_charge: Money,
    pub non_masking_international_charge: Money,
    pub prefix_based: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSmsApi {
    pub name: String,
    pub vendor_name: Option<String>,
    pub url: String,
    pub priority: i64,
    pub is_deletable: bool,
}

/// A reseller moving part of their own wallet into a client's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recharge {
    pub recharged_to: String,
    pub recharged_by: String,
    pub slot: Slot,
    /// Minor units for money slots, parts for quota slots.
    pub units: i64,
    pub balance_valid_till: Option<NaiveDate>,
    pub remarks: Option<String>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for SMS accounts, gateways and messages.
#[derive(Debug, Clone)]
pub struct SmsRepository {
    pool: SqlitePool,
}

async fn fetch_user(conn: &mut SqliteConnection, id: &str) -> DbResult<SmsUser> {
    let sql = format!("SELECT {} FROM sms_users WHERE id = ?1", USER_COLUMNS);
    sqlx::query_as::<_, SmsUser>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("SMS user", id))
}

async fn fetch_package(conn: &mut SqliteConnection, id: &str) -> DbResult<Package> {
    let sql = format!("SELECT {} FROM packages WHERE id = ?1", PACKAGE_COLUMNS);
    sqlx::query_as::<_, Package>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Package", id))
}

/// `col = col + delta` on one wallet slot. With `floor`, the row only
/// changes while the slot stays strictly above it.
async fn shift_slot(
    conn: &mut SqliteConnection,
    user_id: &str,
    slot: Slot,
    delta: i64,
    floor: Option<i64>,
) -> DbResult<bool> {
    let column = slot.column();
    let sql = match floor {
        Some(_) => format!(
            "UPDATE sms_users SET {col} = {col} + ?2, updated_at = ?3 WHERE id = ?1 AND {col} > ?4",
            col = column
        ),
        None => format!(
            "UPDATE sms_users SET {col} = {col} + ?2, updated_at = ?3 WHERE id = ?1",
            col = column
        ),
    };
    let result = sqlx::query(&sql)
        .bind(user_id)
        .bind(delta)
        .bind(Utc::now())
        .bind(floor.unwrap_or(0))
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

async fn insert_balance_log(conn: &mut SqliteConnection, log: &BalanceLog) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO balance_logs (id, sender_id, current_balance, after_operation_balance, \
         number_of_sms_count, note, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&log.id)
    .bind(&log.sender_id)
    .bind(log.current_balance)
    .bind(log.after_operation_balance)
    .bind(log.number_of_sms_count)
    .bind(&log.note)
    .bind(log.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_sms(conn: &mut SqliteConnection, sms: &SingleSms) -> DbResult<()> {
    let sql = format!(
        "INSERT INTO single_sms ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        SMS_COLUMNS
    );
    sqlx::query(&sql)
        .bind(&sms.id)
        .bind(&sms.sender_id)
        .bind(&sms.sender_ip_address)
        .bind(sms.msg_part_count)
        .bind(&sms.sms_api_id)
        .bind(&sms.receiver)
        .bind(&sms.message)
        .bind(sms.status)
        .bind(sms.sms_type)
        .bind(sms.gateway_type)
        .bind(sms.is_sent)
        .bind(&sms.failure_reason)
        .bind(&sms.batch_id)
        .bind(sms.sent_at)
        .bind(sms.created_at)
        .bind(sms.updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl SmsRepository {
    /// Creates a new SmsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SmsRepository { pool }
    }

    // ===== Users and Wallets =====

    pub async fn create_user(&self, input: &NewSmsUser) -> DbResult<SmsUser> {
        validate_name("username", &input.username)?;
        let now = Utc::now();
        let user = SmsUser {
            id: new_id(),
            username: input.username.trim().to_string(),
            role: input.role,
            owner_user_id: input.owner_user_id.clone(),
            package_id: input.package_id.clone(),
            region_type: input.region_type,
            balance_valid_till: input.balance_valid_till,
            wallet: Wallet::default(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO sms_users (id, username, role, owner_user_id, package_id, region_type, \
             balance_valid_till, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(user.role)
        .bind(&user.owner_user_id)
        .bind(&user.package_id)
        .bind(user.region_type)
        .bind(user.balance_valid_till)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(id = %user.id, username = %user.username, role = ?user.role, "SMS user created");
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> DbResult<Option<SmsUser>> {
        let sql = format!("SELECT {} FROM sms_users WHERE id = ?1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, SmsUser>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn wallet(&self, user_id: &str) -> DbResult<Wallet> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_user(&mut conn, user_id).await?.wallet)
    }

    /// Credits a slot from outside the reseller chain (an admin purchase).
    pub async fn top_up(&self, user_id: &str, slot: Slot, units: i64) -> DbResult<Wallet> {
        if units <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "amount".to_string(),
            }
            .into());
        }
        let mut conn = self.pool.acquire().await?;
        if !shift_slot(&mut conn, user_id, slot, units, None).await? {
            return Err(DbError::not_found("SMS user", user_id));
        }
        info!(user_id = %user_id, slot = %slot, units, "Wallet topped up");
        Ok(fetch_user(&mut conn, user_id).await?.wallet)
    }

    // ===== Packages =====

    pub async fn create_package(&self, input: &NewPackage) -> DbResult<Package> {
        validate_name("name", &input.name)?;
        let now = Utc::now();
        let package = Package {
            id: new_id(),
            name: input.name.trim().to_string(),
            owner_user_id: input.owner_user_id.clone(),
            bill_type: input.bill_type,
            is_deletable: true,
            masking_national_charge: input.masking_national_charge,
            non_masking_national_charge: input.non_masking_national_charge,
            masking_international_charge: input.masking_international_charge,
            non_masking_international_charge: input.non_masking_international_charge,
            prefix_based: input.prefix_based,
            created_at: now,
            updated_at: now,
        };

        let sql = format!(
            "INSERT INTO packages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            PACKAGE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&package.id)
            .bind(&package.name)
            .bind(&package.owner_user_id)
            .bind(package.bill_type)
            .bind(package.is_deletable)
            .bind(package.masking_national_charge)
            .bind(package.non_masking_national_charge)
            .bind(package.masking_international_charge)
            .bind(package.non_masking_international_charge)
            .bind(package.prefix_based)
            .bind(package.created_at)
            .bind(package.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(package)
    }

    pub async fn get_package(&self, id: &str) -> DbResult<Option<Package>> {
        let sql = format!("SELECT {} FROM packages WHERE id = ?1", PACKAGE_COLUMNS);
        Ok(sqlx::query_as::<_, Package>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Sets the per-operator charge of a package.
    pub async fn set_prefix_charge(&self, charge: &PrefixCharge) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO package_prefix_charges (package_id, prefix, masking_charge, non_masking_charge) \
             VALUES (?1, ?2, ?3, ?4) ON CONFLICT (package_id, prefix) \
             DO UPDATE SET masking_charge = excluded.masking_charge, non_masking_charge = excluded.non_masking_charge",
        )
        .bind(&charge.package_id)
        .bind(&charge.prefix)
        .bind(charge.masking_charge)
        .bind(charge.non_masking_charge)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn prefix_charges(&self, package_id: &str) -> DbResult<Vec<PrefixCharge>> {
        Ok(sqlx::query_as::<_, PrefixCharge>(
            "SELECT package_id, prefix, masking_charge, non_masking_charge FROM package_prefix_charges \
             WHERE package_id = ?1 ORDER BY prefix",
        )
        .bind(package_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // ===== Gateways =====

    pub async fn create_api(&self, input: &NewSmsApi) -> DbResult<SmsApi> {
        validate_api(&input.name, &input.url)?;
        let now = Utc::now();
        let api = SmsApi {
            id: new_id(),
            name: input.name.trim().to_string(),
            vendor_name: input.vendor_name.clone(),
            url: input.url.trim().to_string(),
            priority: input.priority,
            is_deletable: input.is_deletable,
            created_at: now,
            updated_at: now,
        };

        let sql = format!(
            "INSERT INTO sms_apis ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            API_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&api.id)
            .bind(&api.name)
            .bind(&api.vendor_name)
            .bind(&api.url)
            .bind(api.priority)
            .bind(api.is_deletable)
            .bind(api.created_at)
            .bind(api.updated_at)
            .execute(&self.pool)
            .await?;

        info!(id = %api.id, name = %api.name, "SMS API created");
        Ok(api)
    }

    /// Deletes a gateway unless it is protected.
    pub async fn delete_api(&self, id: &str) -> DbResult<()> {
        let api = self.get_api(id).await?.ok_or_else(|| DbError::not_found("SMS API", id))?;
        api.ensure_deletable()?;
        sqlx::query("DELETE FROM sms_apis WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        info!(id = %id, name = %api.name, "SMS API deleted");
        Ok(())
    }

    pub async fn get_api(&self, id: &str) -> DbResult<Option<SmsApi>> {
        let sql = format!("SELECT {} FROM sms_apis WHERE id = ?1", API_COLUMNS);
        Ok(sqlx::query_as::<_, SmsApi>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_apis(&self) -> DbResult<Vec<SmsApi>> {
        let sql = format!("SELECT {} FROM sms_apis ORDER BY priority, name", API_COLUMNS);
        Ok(sqlx::query_as::<_, SmsApi>(&sql).fetch_all(&self.pool).await?)
    }

    /// Assigns a gateway to a reseller, replacing an earlier assignment.
    pub async fn assign_api(
        &self,
        user_id: &str,
        sms_api_id: &str,
        priority: i64,
        is_shared: bool,
        share_percentage: i64,
    ) -> DbResult<Assignment> {
        if !(0..=100).contains(&share_percentage) {
            return Err(ValidationError::OutOfRange {
                field: "share_percentage".to_string(),
                min: 0,
                max: 100,
            }
            .into());
        }

        sqlx::query(
            "INSERT INTO assign_sms_apis (id, user_id, sms_api_id, priority, is_active, is_shared, share_percentage) \
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6) ON CONFLICT (user_id, sms_api_id) \
             DO UPDATE SET priority = excluded.priority, is_active = 1, is_shared = excluded.is_shared, \
             share_percentage = excluded.share_percentage",
        )
        .bind(new_id())
        .bind(user_id)
        .bind(sms_api_id)
        .bind(priority)
        .bind(is_shared)
        .bind(share_percentage)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, Assignment>(
            "SELECT id, user_id, sms_api_id, priority, is_active, is_shared, share_percentage \
             FROM assign_sms_apis WHERE user_id = ?1 AND sms_api_id = ?2",
        )
        .bind(user_id)
        .bind(sms_api_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from)
    }

    pub async fn set_assignment_active(&self, assignment_id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE assign_sms_apis SET is_active = ?2 WHERE id = ?1")
            .bind(assignment_id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Assignment", assignment_id));
        }
        Ok(())
    }

    pub async fn assignments(&self, user_id: &str) -> DbResult<Vec<Assignment>> {
        Ok(sqlx::query_as::<_, Assignment>(
            "SELECT id, user_id, sms_api_id, priority, is_active, is_shared, share_percentage \
             FROM assign_sms_apis WHERE user_id = ?1 ORDER BY priority",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Messages delivered per gateway id.
    pub async fn gateway_send_counts(&self) -> DbResult<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT sms_api_id, COUNT(*) FROM single_sms WHERE sms_api_id IS NOT NULL AND is_sent = 1 \
             GROUP BY sms_api_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Gateways a client's messages should try, best first.
    pub async fn gateways_for(&self, client_id: &str) -> DbResult<Vec<SmsApi>> {
        let client = self
            .get_user(client_id)
            .await?
            .ok_or_else(|| DbError::not_found("SMS user", client_id))?;
        let reseller = client.owner_user_id.as_deref().unwrap_or(client_id);

        let assignments = self.assignments(reseller).await?;
        let apis = self.list_apis().await?;
        let counts = self.gateway_send_counts().await?;
        Ok(select_gateways(&assignments, &apis, &counts))
    }

    // ===== Developer Keys =====

    pub async fn create_developer_key(&self, user_id: &str, api_key: &str) -> DbResult<DeveloperApi> {
        let key = DeveloperApi {
            id: new_id(),
            user_id: user_id.to_string(),
            api_key: api_key.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO developer_apis (id, user_id, api_key, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&key.id)
            .bind(&key.user_id)
            .bind(&key.api_key)
            .bind(key.created_at)
            .execute(&self.pool)
            .await?;
        Ok(key)
    }

    /// Owner of a developer API key.
    pub async fn developer_key_user(&self, api_key: &str) -> DbResult<Option<SmsUser>> {
        let sql = format!(
            "SELECT {} FROM sms_users WHERE id = (SELECT user_id FROM developer_apis WHERE api_key = ?1)",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, SmsUser>(&sql)
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ===== Balance =====

    /// Charges a send of `parts` parts to a client and their reseller.
    ///
    /// ## Errors
    /// - `LowBalance { parts }` when either wallet cannot cover the charge;
    ///   neither wallet changes
    /// - `BalanceExpired` past the client's validity date
    /// - `AccountNotConfigured` without reseller, package or region
    pub async fn deduct_balance(&self, client_id: &str, parts: i64) -> DbResult<Charge> {
        let mut tx = begin_write(&self.pool).await?;

        let client = fetch_user(&mut tx, client_id).await?;
        check_validity(client.balance_valid_till, Utc::now().date_naive())?;
        let billing = client.billing()?;
        let reseller = fetch_user(&mut tx, billing.owner_user_id).await?;
        let package = fetch_package(&mut tx, billing.package_id).await?;

        let outcome = deduct(&client.wallet, &reseller.wallet, &package, billing.region, parts)?;
        if outcome.low_balance {
            debug!(client = %client.username, parts, "Low balance");
            return Err(CoreError::LowBalance { parts }.into());
        }

        let charge = outcome.charge;
        let client_ok = shift_slot(&mut tx, &client.id, charge.slot, -charge.units, Some(charge.units)).await?;
        let reseller_ok = shift_slot(&mut tx, &reseller.id, charge.slot, -charge.units, Some(charge.units)).await?;
        if !(client_ok && reseller_ok) {
            warn!(client = %client.username, parts, "Wallet changed during deduction");
            return Err(CoreError::LowBalance { parts }.into());
        }

        insert_balance_log(&mut tx, &BalanceLog::for_charge(&client.id, &client.wallet, &charge, false)).await?;
        tx.commit().await?;

        info!(client = %client.username, slot = %charge.slot, units = charge.units, parts, "Balance deducted");
        Ok(charge)
    }

    /// Returns the cost of `parts` undelivered parts to client and reseller.
    pub async fn refund_balance(&self, client_id: &str, parts: i64) -> DbResult<Option<Charge>> {
        if parts <= 0 {
            return Ok(None);
        }
        let mut tx = begin_write(&self.pool).await?;

        let client = fetch_user(&mut tx, client_id).await?;
        let billing = client.billing()?;
        let package = fetch_package(&mut tx, billing.package_id).await?;
        let charge = Charge::for_parts(&package, billing.region, parts)?;

        if !shift_slot(&mut tx, &client.id, charge.slot, charge.units, None).await? {
            return Err(DbError::not_found("SMS user", &client.id));
        }
        if !shift_slot(&mut tx, billing.owner_user_id, charge.slot, charge.units, None).await? {
            return Err(DbError::not_found("SMS user", billing.owner_user_id));
        }
        insert_balance_log(&mut tx, &BalanceLog::for_charge(&client.id, &client.wallet, &charge, true)).await?;
        tx.commit().await?;

        info!(client = %client.username, parts, units = charge.units, "Balance refunded");
        Ok(Some(charge))
    }

    /// Moves balance from a reseller's wallet into one of their clients'.
    pub async fn recharge(&self, input: &Recharge) -> DbResult<Transaction> {
        let mut tx = begin_write(&self.pool).await?;

        let reseller = fetch_user(&mut tx, &input.recharged_by).await?;
        let client = fetch_user(&mut tx, &input.recharged_to).await?;
        if client.owner_user_id.as_deref() != Some(reseller.id.as_str()) {
            return Err(ValidationError::InvalidFormat {
                field: "recharged_to".to_string(),
                reason: format!("{} is not a client of {}", client.username, reseller.username),
            }
            .into());
        }
        check_recharge(&reseller.wallet, input.slot, input.units)?;

        // floor of units − 1 allows draining the slot to exactly zero
        if !shift_slot(&mut tx, &reseller.id, input.slot, -input.units, Some(input.units - 1)).await? {
            return Err(CoreError::InsufficientBalance {
                slot: input.slot.to_string(),
                available: reseller.wallet.get(input.slot),
                requested: input.units,
            }
            .into());
        }
        if !shift_slot(&mut tx, &client.id, input.slot, input.units, None).await? {
            return Err(DbError::not_found("SMS user", &client.id));
        }
        if let Some(valid_till) = input.balance_valid_till {
            sqlx::query("UPDATE sms_users SET balance_valid_till = ?2 WHERE id = ?1")
                .bind(&client.id)
                .bind(valid_till)
                .execute(&mut *tx)
                .await?;
        }

        let (balance, message_amount) = match input.slot.kind {
            SlotKind::Balance => (Money::from_minor(input.units), None),
            SlotKind::Messages => (Money::zero(), Some(input.units)),
        };
        let record = Transaction {
            id: new_id(),
            recharged_to: client.id.clone(),
            recharged_by: reseller.id.clone(),
            balance,
            message_amount,
            transaction_type: TransactionType::Credit,
            balance_type: input.slot.column().to_string(),
            region_type: input.slot.region,
            balance_valid_till: input.balance_valid_till,
            remarks: input.remarks.clone(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO transactions (id, recharged_to, recharged_by, balance, message_amount, transaction_type, \
             balance_type, region_type, balance_valid_till, remarks, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&record.id)
        .bind(&record.recharged_to)
        .bind(&record.recharged_by)
        .bind(record.balance)
        .bind(record.message_amount)
        .bind(record.transaction_type)
        .bind(&record.balance_type)
        .bind(record.region_type)
        .bind(record.balance_valid_till)
        .bind(&record.remarks)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(client = %client.username, reseller = %reseller.username, slot = %input.slot, units = input.units, "Recharged");
        Ok(record)
    }

    pub async fn balance_logs(&self, user_id: &str) -> DbResult<Vec<BalanceLog>> {
        Ok(sqlx::query_as::<_, BalanceLog>(
            "SELECT id, sender_id, current_balance, after_operation_balance, number_of_sms_count, note, created_at \
             FROM balance_logs WHERE sender_id = ?1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn transactions(&self, user_id: &str) -> DbResult<Vec<Transaction>> {
        Ok(sqlx::query_as::<_, Transaction>(
            "SELECT id, recharged_to, recharged_by, balance, message_amount, transaction_type, balance_type, \
             region_type, balance_valid_till, remarks, created_at FROM transactions \
             WHERE recharged_to = ?1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // ===== Messages =====

    /// Stores one pending record per outgoing message under a new batch id.
    pub async fn create_pending_batch(
        &self,
        sender_id: &str,
        ip: Option<&str>,
        gateway_type: GatewayType,
        messages: &[OutgoingSms],
    ) -> DbResult<(String, Vec<SingleSms>)> {
        let batch_id = new_id();
        let mut tx = begin_write(&self.pool).await?;
        let mut created = Vec::with_capacity(messages.len());

        for outgoing in messages {
            let now = Utc::now();
            let sms = SingleSms {
                id: new_id(),
                sender_id: sender_id.to_string(),
                sender_ip_address: ip.map(str::to_string),
                msg_part_count: outgoing.msg_part_count,
                sms_api_id: None,
                receiver: outgoing.receiver.clone(),
                message: outgoing.message.clone(),
                status: SmsStatus::Pending,
                sms_type: SmsType::Outgoing,
                gateway_type,
                is_sent: false,
                failure_reason: None,
                batch_id: Some(batch_id.clone()),
                sent_at: None,
                created_at: now,
                updated_at: now,
            };
            insert_sms(&mut tx, &sms).await?;
            created.push(sms);
        }

        tx.commit().await?;
        debug!(batch_id = %batch_id, count = created.len(), "Pending batch stored");
        Ok((batch_id, created))
    }

    pub async fn mark_sent(&self, sms_id: &str, sms_api_id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE single_sms SET status = ?2, sms_api_id = ?3, is_sent = 1, failure_reason = NULL, \
             sent_at = ?4, updated_at = ?4 WHERE id = ?1",
        )
        .bind(sms_id)
        .bind(SmsStatus::Sent)
        .bind(sms_api_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SMS", sms_id));
        }
        Ok(())
    }

    pub async fn mark_failed(&self, sms_id: &str, reason: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE single_sms SET status = ?2, failure_reason = ?3, updated_at = ?4 WHERE id = ?1 AND is_sent = 0",
        )
        .bind(sms_id)
        .bind(SmsStatus::Failed)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SMS", sms_id));
        }
        Ok(())
    }

    /// Records one failed attempt: a FAILED copy naming the gateway, and the
    /// original marked failed with the same reason.
    pub async fn record_failure(&self, original: &SingleSms, sms_api_id: &str, reason: &str) -> DbResult<SingleSms> {
        let mut tx = begin_write(&self.pool).await?;
        let now = Utc::now();
        let copy = SingleSms {
            id: new_id(),
            sms_api_id: Some(sms_api_id.to_string()),
            status: SmsStatus::Failed,
            is_sent: false,
            failure_reason: Some(reason.to_string()),
            batch_id: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
            ..original.clone()
        };
        insert_sms(&mut tx, &copy).await?;

        sqlx::query("UPDATE single_sms SET status = ?2, failure_reason = ?3, updated_at = ?4 WHERE id = ?1")
            .bind(&original.id)
            .bind(SmsStatus::Failed)
            .bind(reason)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(sms_id = %original.id, api = %sms_api_id, reason = %reason, "Send attempt failed");
        Ok(copy)
    }

    /// Σ parts of a batch's originals that no gateway delivered.
    pub async fn failed_parts(&self, batch_id: &str) -> DbResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COALESCE(SUM(msg_part_count), 0) FROM single_sms \
             WHERE batch_id = ?1 AND sms_api_id IS NULL AND is_sent = 0",
        )
        .bind(batch_id)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn get_sms(&self, id: &str) -> DbResult<Option<SingleSms>> {
        let sql = format!("SELECT {} FROM single_sms WHERE id = ?1", SMS_COLUMNS);
        Ok(sqlx::query_as::<_, SingleSms>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn batch_messages(&self, batch_id: &str) -> DbResult<Vec<SingleSms>> {
        let sql = format!(
            "SELECT {} FROM single_sms WHERE batch_id = ?1 ORDER BY created_at",
            SMS_COLUMNS
        );
        Ok(sqlx::query_as::<_, SingleSms>(&sql)
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Failure copies written for one receiver by a sender.
    pub async fn failure_copies(&self, sender_id: &str, receiver: &str) -> DbResult<Vec<SingleSms>> {
        let sql = format!(
            "SELECT {} FROM single_sms WHERE sender_id = ?1 AND receiver = ?2 AND batch_id IS NULL \
             AND status = 'failed' ORDER BY created_at",
            SMS_COLUMNS
        );
        Ok(sqlx::query_as::<_, SingleSms>(&sql)
            .bind(sender_id)
            .bind(receiver)
            .fetch_all(&self.pool)
            .await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
