//! # Repository Module
//!
//! Database repositories for Bazaar.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Caller (seed binary, SMS engine, tests)                                │
//! │       │                                                                 │
//! │       │  db.sales().create_sale(&input)                                 │
//! │       ▼                                                                 │
//! │  SaleRepository ──► document helpers ──► inventory + journal helpers    │
//! │       │                                                                 │
//! │       │  one transaction per operation                                  │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories own the pool. The `pub(crate)` helpers in each module take
//! a `&mut SqliteConnection` instead so one operation can span several
//! modules inside a single transaction.
//!
//! ## Available Repositories
//!
//! - [`AccountRepository`] - Chart of accounts and the journal
//! - [`PartyRepository`] - Customers and suppliers with their ledgers
//! - [`ProductRepository`] - Product CRUD and search
//! - [`InventoryRepository`] - Stock movements and adjustments
//! - [`SaleRepository`] / [`PurchaseRepository`] / [`ReturnRepository`] - Trade documents
//! - [`VoucherRepository`] - Payment, receipt and contra vouchers
//! - [`SmsRepository`] - SMS users, wallets, gateways and messages
//! - [`ContactRepository`] - Per-user contacts and contact groups
//! - [`ReportRepository`] - Stock, balance sheet, customer due and SMS reports

pub mod accounts;
pub mod contact;
mod document;
pub mod inventory;
pub mod party;
pub mod product;
pub mod purchase;
pub mod report;
pub mod returns;
pub mod sale;
pub mod sms;
pub mod voucher;

pub use accounts::{AccountRepository, LogEntry};
pub use contact::ContactRepository;
pub use inventory::{InventoryRepository, NewMovement};
pub use party::PartyRepository;
pub use product::ProductRepository;
pub use purchase::PurchaseRepository;
pub use report::ReportRepository;
pub use returns::ReturnRepository;
pub use sale::SaleRepository;
pub use sms::{NewPackage, NewSmsApi, NewSmsUser, Recharge, SmsRepository};
pub use voucher::VoucherRepository;

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::DbResult;

/// Opens a transaction holding SQLite's write lock from the start.
///
/// A deferred transaction that reads first cannot upgrade to a writer once
/// another connection has committed; it fails with `SQLITE_BUSY` without
/// waiting on the busy timeout. `BEGIN IMMEDIATE` queues writers on the lock
/// instead, so read-check-write operations serialize.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Shared setup for repository tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use bazaar_core::inventory::AdjustmentType;
    use bazaar_core::sms::balance::{BillType, Region, UserRole};
    use bazaar_core::trade::{DocumentInput, LineInput};
    use bazaar_core::{Money, NewParty, NewProduct, PartyKind};
    use chrono::Utc;

    use super::sms::{NewPackage, NewSmsApi, NewSmsUser};
    use crate::pool::{Database, DbConfig};

    /// A seeded chart with one customer, one supplier and one product.
    pub(crate) struct Shop {
        pub db: Database,
        pub customer: String,
        pub supplier: String,
        pub product: String,
        pub cash: String,
    }

    impl Shop {
        pub async fn stock(&self, quantity: i64) {
            self.db
                .inventory()
                .adjust(&self.product, quantity, AdjustmentType::Increase, None, None)
                .await
                .unwrap();
        }
    }

    pub(crate) async fn shop() -> Shop {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.accounts().seed_defaults().await.unwrap();

        let party = |name: &str| NewParty {
            name: name.into(),
            ..NewParty::default()
        };
        let customer = db
            .parties()
            .create(PartyKind::Customer, &party("Rahim Store"), None)
            .await
            .unwrap();
        let supplier = db
            .parties()
            .create(PartyKind::Supplier, &party("Karim Traders"), None)
            .await
            .unwrap();
        let product = db
            .products()
            .insert(
                &NewProduct {
                    name: "Lentils 1kg".into(),
                    sku: "LEN-1".into(),
                    category: None,
                    brand: None,
                    unit: Some("pcs".into()),
                    price: Money::from_major(100),
                    cost: Money::from_major(80),
                },
                None,
            )
            .await
            .unwrap();
        let cash = db.accounts().get_ledger_by_name("Cash").await.unwrap().unwrap();

        Shop {
            db,
            customer: customer.id,
            supplier: supplier.id,
            product: product.id,
            cash: cash.id,
        }
    }

    pub(crate) fn document_input(
        party: &str,
        payment_ledger: Option<&str>,
        lines: Vec<LineInput>,
        paid: Money,
    ) -> DocumentInput {
        DocumentInput {
            party_id: party.to_string(),
            payment_ledger_id: payment_ledger.map(str::to_string),
            date: Utc::now().date_naive(),
            due_date: None,
            lines,
            discount: Money::zero(),
            tax: Money::zero(),
            paid,
            note: None,
            source_id: None,
            created_by: None,
        }
    }

    /// A reseller with one client on a package, and one assigned gateway.
    pub(crate) struct SmsAccounts {
        pub db: Database,
        pub reseller: String,
        pub client: String,
        pub api: String,
    }

    pub(crate) async fn sms_accounts(prefix_based: bool) -> SmsAccounts {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sms_accounts_on(db, prefix_based).await
    }

    pub(crate) async fn sms_accounts_on(db: Database, prefix_based: bool) -> SmsAccounts {
        let sms = db.sms();

        let reseller = sms
            .create_user(&NewSmsUser {
                username: "reseller".into(),
                role: UserRole::Reseller,
                owner_user_id: None,
                package_id: None,
                region_type: None,
                balance_valid_till: None,
            })
            .await
            .unwrap();
        let package = sms
            .create_package(&NewPackage {
                name: "Standard".into(),
                owner_user_id: Some(reseller.id.clone()),
                bill_type: BillType::default(),
                non_masking_national_charge: Money::from_minor(35),
                masking_national_charge: Money::from_minor(50),
                prefix_based,
                ..NewPackage::default()
            })
            .await
            .unwrap();
        let client = sms
            .create_user(&NewSmsUser {
                username: "client".into(),
                role: UserRole::Client,
                owner_user_id: Some(reseller.id.clone()),
                package_id: Some(package.id),
                region_type: Some(Region::Local),
                balance_valid_till: None,
            })
            .await
            .unwrap();
        let api = sms
            .create_api(&NewSmsApi {
                name: "Gateway A".into(),
                vendor_name: Some("elitbuzz".into()),
                url: "https://gw.test/send?to={phone_number}&msg={message}".into(),
                priority: 1,
                is_deletable: true,
            })
            .await
            .unwrap();
        sms.assign_api(&reseller.id, &api.id, 1, false, 0).await.unwrap();

        SmsAccounts {
            db,
            reseller: reseller.id,
            client: client.id,
            api: api.id,
        }
    }
}
