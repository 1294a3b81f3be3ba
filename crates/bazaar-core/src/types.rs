//! # Domain Types
//!
//! Shared record types: audit columns, parties and products.
//!
//! ## Audit Columns
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every persisted record carries:                                        │
//! │                                                                         │
//! │  id          UUID v4 (TEXT)                                             │
//! │  created_by  user id or NULL (system)                                   │
//! │  updated_by  user id or NULL                                            │
//! │  created_at  UTC timestamp                                              │
//! │  updated_at  UTC timestamp                                              │
//! │  deleted_at  NULL while live; set by soft delete                        │
//! │                                                                         │
//! │  Unique business keys (names, SKUs) are unique among LIVE rows only.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

/// Generates a new record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Party
// =============================================================================

/// The two kinds of trading partner. Each one owns a ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Customer,
    Supplier,
}

impl PartyKind {
    /// Ledger type key of the party's ledger.
    pub fn ledger_type(&self) -> &'static str {
        match self {
            PartyKind::Customer => "customer",
            PartyKind::Supplier => "supplier",
        }
    }

    /// Name of the group the party's ledger hangs under.
    pub fn head_group_name(&self) -> &'static str {
        match self {
            PartyKind::Customer => "Customer",
            PartyKind::Supplier => "Supplier",
        }
    }

    /// Table holding parties of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            PartyKind::Customer => "customers",
            PartyKind::Supplier => "suppliers",
        }
    }
}

impl std::fmt::Display for PartyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ledger_type())
    }
}

/// A customer or supplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Party {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fields needed to create or edit a party.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewParty {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

// =============================================================================
// Product
// =============================================================================

/// A stock-keeping product. Quantity on hand is never stored here; it is
/// derived from the inventory transaction ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub unit: Option<String>,
    /// Selling price.
    pub price: Money,
    /// Purchase cost.
    pub cost: Money,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fields needed to create a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub unit: Option<String>,
    pub price: Money,
    pub cost: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_kind_ledger_mapping() {
        assert_eq!(PartyKind::Customer.ledger_type(), "customer");
        assert_eq!(PartyKind::Supplier.head_group_name(), "Supplier");
        assert_eq!(PartyKind::Supplier.to_string(), "supplier");
    }

    #[test]
    fn test_new_id_is_uuid() {
        let id = new_id();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(id, new_id());
    }
}
