//! # Inventory Module
//!
//! Stock is never stored as a number on the product. It is the sum of an
//! append-only ledger of signed movements.
//!
//! ## Movement Signs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Transaction type     Sign    Origin                                    │
//! │  ─────────────────    ────    ─────────────────────────────             │
//! │  purchase              +      purchase item                             │
//! │  sale_return           +      sale return item                          │
//! │  transfer_in           +      inter-store transfer                      │
//! │  sale                  −      sale item                                 │
//! │  purchase_return       −      purchase return item                      │
//! │  transfer_out          −      inter-store transfer                      │
//! │  adjustment            ±      increase / decrease                       │
//! │                                                                         │
//! │  current stock = Σ signed quantity                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Stock at or below this (and above zero) is reported as low.
pub const LOW_STOCK_THRESHOLD: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    Sale,
    PurchaseReturn,
    SaleReturn,
    Adjustment,
    TransferIn,
    TransferOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    Increase,
    Decrease,
}

/// Signed quantity stored for a movement.
///
/// Quantities on documents are entered as positive numbers. The sign comes
/// from the type alone, so `(Sale, 5)` and `(Sale, -5)` both store `-5`.
pub fn signed_quantity(
    kind: TransactionType,
    quantity: i64,
    adjustment: Option<AdjustmentType>,
) -> i64 {
    let q = quantity.abs();
    match kind {
        TransactionType::Purchase | TransactionType::SaleReturn | TransactionType::TransferIn => q,
        TransactionType::Sale | TransactionType::PurchaseReturn | TransactionType::TransferOut => -q,
        TransactionType::Adjustment => match adjustment {
            Some(AdjustmentType::Decrease) => -q,
            _ => q,
        },
    }
}

/// Sum of signed quantities.
pub fn current_stock(quantities: impl IntoIterator<Item = i64>) -> i64 {
    quantities.into_iter().sum()
}

/// Rejects a decrease larger than the stock on hand.
pub fn check_adjustment(current: i64, quantity: i64, kind: AdjustmentType) -> CoreResult<()> {
    if kind == AdjustmentType::Decrease && quantity > current {
        return Err(CoreError::StockDecreaseTooLarge {
            requested: quantity,
            available: current,
        });
    }
    Ok(())
}

/// Rejects a sale of more units than are on hand.
pub fn check_available(product: &str, current: i64, requested: i64) -> CoreResult<()> {
    if requested > current {
        return Err(CoreError::InsufficientStock {
            product: product.to_string(),
            available: current,
            requested,
        });
    }
    Ok(())
}

// =============================================================================
// Stock Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
}

impl StockStatus {
    pub fn classify(stock: i64) -> Self {
        if stock <= 0 {
            StockStatus::OutOfStock
        } else if stock <= LOW_STOCK_THRESHOLD {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// One movement in the stock ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryTransaction {
    pub id: String,
    pub product_id: String,
    pub transaction_type: TransactionType,
    pub adjustment_type: Option<AdjustmentType>,
    /// Signed quantity.
    pub quantity: i64,
    /// Document item this movement belongs to (sale item, purchase item...).
    pub reference_id: Option<String>,
    pub transaction_date: NaiveDate,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}
