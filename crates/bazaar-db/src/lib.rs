//! # bazaar-db: Database Layer for Bazaar
//!
//! SQLite storage for the back office and the SMS engine, through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bazaar Data Flow                                 │
//! │                                                                         │
//! │  bazaar-sms (SmsService, reconciler)        seed binary                 │
//! │       │                                         │                       │
//! │       ▼                                         ▼                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     bazaar-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │   │   │
//! │  │   │               │    │ accounts, sale │    │ 001_accounts │   │   │
//! │  │   │ SqlitePool    │◄───│ purchase, sms  │    │ 002_trade    │   │   │
//! │  │   │               │    │ voucher, ...   │    │ 003_sms      │   │   │
//! │  │   │               │    │                │    │ 004_contacts │   │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (WAL)                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business rules come from `bazaar_core`; this crate applies their
//! results atomically. A sale's items, stock movements and journal lines
//! land in one transaction, and so do both wallet updates of an SMS charge.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bazaar_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("bazaar.db")).await?;
//! db.accounts().seed_defaults().await?;
//! let sale = db.sales().create_sale(&input).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::{
    AccountRepository, ContactRepository, InventoryRepository, PartyRepository, ProductRepository, PurchaseRepository,
    ReportRepository, ReturnRepository, SaleRepository, SmsRepository, VoucherRepository,
};
