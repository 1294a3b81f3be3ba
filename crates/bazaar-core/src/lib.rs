//! # bazaar-core: Pure Business Logic for Bazaar
//!
//! Rules of the back office with zero I/O: money, the chart of accounts and
//! posting rules, stock movements, trade documents, reports and SMS billing.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bazaar Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                bazaar-sms (engine + developer API)              │   │
//! │  │    SmsService ──► Dispatcher ──► Reconciler ──► BalanceMonitor  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    bazaar-db (repositories)                     │   │
//! │  │     accounts, parties, products, inventory, trade, sms          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ bazaar-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌──────────┐ ┌───────────┐ ┌───────┐ ┌───────┐   │   │
//! │  │   │  money  │ │ accounts │ │ inventory │ │ trade │ │  sms  │   │   │
//! │  │   └─────────┘ └──────────┘ └───────────┘ └───────┘ └───────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer money in minor units
//! - [`validation`] - Field validators and name normalizers
//! - [`types`] - Parties and products
//! - [`accounts`] - Chart of accounts, journal posting rules, voucher approval
//! - [`inventory`] - Signed stock movements
//! - [`trade`] - Sales, purchases, returns and their numbering
//! - [`reports`] - Stock, balance sheet and customer due aggregations
//! - [`sms`] - Message parts, two-tier balance, gateway choice, vendor replies
//!
//! ## Example Usage
//!
//! ```rust
//! use bazaar_core::sms::message::MessageQuote;
//! use bazaar_core::Money;
//!
//! let quote = MessageQuote::new("Your order has shipped", "01711000000 01811000000");
//! assert_eq!(quote.total_parts, 2);
//!
//! let charge = Money::parse("0.35").unwrap().checked_times(quote.total_parts).unwrap();
//! assert_eq!(charge.to_string(), "0.70");
//! ```
//!
//! ## Features
//!
//! - `sqlx`: derives `sqlx::Type` / `sqlx::FromRow` on records so the
//!   database crate can map rows straight into these types.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod accounts;
pub mod error;
pub mod inventory;
pub mod money;
pub mod reports;
pub mod sms;
pub mod trade;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;
