//! # Inventory Repository
//!
//! The append-only stock ledger.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  inventory_transactions                                                 │
//! │                                                                         │
//! │  purchase        +10   ref = purchase item                             │
//! │  sale             -3   ref = sale item                                 │
//! │  sale_return      +1   ref = sale return item                          │
//! │  adjustment       -2   (decrease, checked against stock on hand)       │
//! │  ─────────────────────                                                  │
//! │  current stock     6   = Σ quantity                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Document lines own their movement through `reference_id`, so saving a
//! line again updates its movement instead of appending a second one.

use bazaar_core::inventory::{
    check_adjustment, signed_quantity, AdjustmentType, InventoryTransaction, TransactionType,
};
use bazaar_core::validation::validate_quantity;
use bazaar_core::{new_id, Product};
use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::begin_write;
use crate::error::DbResult;

const TRANSACTION_COLUMNS: &str = "id, product_id, transaction_type, adjustment_type, quantity, reference_id, \
     transaction_date, note, created_by, created_at";

/// A stock movement to record. `quantity` is entered unsigned.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: String,
    pub transaction_type: TransactionType,
    pub adjustment_type: Option<AdjustmentType>,
    pub quantity: i64,
    pub reference_id: Option<String>,
    pub date: NaiveDate,
    pub note: Option<String>,
    pub created_by: Option<String>,
}

/// Repository for inventory transactions.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Appends a movement.
    pub async fn record(&self, movement: &NewMovement) -> DbResult<InventoryTransaction> {
        let mut conn = self.pool.acquire().await?;
        insert_movement(&mut conn, movement).await
    }

    /// Writes the movement owned by a document item, replacing an earlier one.
    pub async fn upsert_for_item(&self, movement: &NewMovement) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_item_movement(&mut conn, movement).await
    }

    /// Removes the movements owned by a document item.
    pub async fn delete_for_item(&self, reference_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM inventory_transactions WHERE reference_id = ?1")
            .bind(reference_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Σ signed quantity of a product.
    pub async fn current_stock(&self, product_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        stock_of(&mut conn, product_id).await
    }

    /// Records a manual adjustment.
    ///
    /// ## Errors
    /// - "Cannot decrease stock by X. Current stock is only Y." when a
    ///   decrease exceeds stock on hand
    pub async fn adjust(
        &self,
        product_id: &str,
        quantity: i64,
        kind: AdjustmentType,
        note: Option<&str>,
        created_by: Option<&str>,
    ) -> DbResult<InventoryTransaction> {
        validate_quantity(quantity)?;
        let mut tx = begin_write(&self.pool).await?;

        let current = stock_of(&mut tx, product_id).await?;
        check_adjustment(current, quantity, kind)?;

        let recorded = insert_movement(
            &mut tx,
            &NewMovement {
                product_id: product_id.to_string(),
                transaction_type: TransactionType::Adjustment,
                adjustment_type: Some(kind),
                quantity,
                reference_id: None,
                date: Utc::now().date_naive(),
                note: note.map(str::to_string),
                created_by: created_by.map(str::to_string),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(recorded)
    }

    /// Movements of a product, oldest first.
    pub async fn transactions_for_product(&self, product_id: &str) -> DbResult<Vec<InventoryTransaction>> {
        let sql = format!(
            "SELECT {} FROM inventory_transactions WHERE product_id = ?1 ORDER BY transaction_date, created_at",
            TRANSACTION_COLUMNS
        );
        Ok(sqlx::query_as::<_, InventoryTransaction>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Every live product with its current stock.
    pub async fn stock_levels(&self) -> DbResult<Vec<(Product, i64)>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT id, name, slug, sku, category, brand, unit, price, cost, is_active, \
             created_by, created_at, updated_at, deleted_at FROM products WHERE deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let totals: Vec<(String, i64)> = sqlx::query_as(
            "SELECT product_id, COALESCE(SUM(quantity), 0) FROM inventory_transactions GROUP BY product_id",
        )
        .fetch_all(&self.pool)
        .await?;
        let totals: std::collections::HashMap<String, i64> = totals.into_iter().collect();

        Ok(products
            .into_iter()
            .map(|p| {
                let stock = totals.get(&p.id).copied().unwrap_or(0);
                (p, stock)
            })
            .collect())
    }
}

// =============================================================================
// Connection-level Helpers
// =============================================================================

pub(crate) async fn stock_of(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
    Ok(
        sqlx::query_scalar("SELECT COALESCE(SUM(quantity), 0) FROM inventory_transactions WHERE product_id = ?1")
            .bind(product_id)
            .fetch_one(&mut *conn)
            .await?,
    )
}

pub(crate) async fn insert_movement(
    conn: &mut SqliteConnection,
    movement: &NewMovement,
) -> DbResult<InventoryTransaction> {
    let record = InventoryTransaction {
        id: new_id(),
        product_id: movement.product_id.clone(),
        transaction_type: movement.transaction_type,
        adjustment_type: movement.adjustment_type,
        quantity: signed_quantity(movement.transaction_type, movement.quantity, movement.adjustment_type),
        reference_id: movement.reference_id.clone(),
        transaction_date: movement.date,
        note: movement.note.clone(),
        created_by: movement.created_by.clone(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO inventory_transactions (id, product_id, transaction_type, adjustment_type, quantity, \
         reference_id, transaction_date, note, created_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(&record.id)
    .bind(&record.product_id)
    .bind(record.transaction_type)
    .bind(record.adjustment_type)
    .bind(record.quantity)
    .bind(&record.reference_id)
    .bind(record.transaction_date)
    .bind(&record.note)
    .bind(&record.created_by)
    .bind(record.created_at)
    .execute(&mut *conn)
    .await?;

    debug!(
        product_id = %record.product_id,
        kind = ?record.transaction_type,
        quantity = record.quantity,
        "Stock movement recorded"
    );
    Ok(record)
}

pub(crate) async fn upsert_item_movement(conn: &mut SqliteConnection, movement: &NewMovement) -> DbResult<()> {
    let quantity = signed_quantity(movement.transaction_type, movement.quantity, movement.adjustment_type);
    let updated = sqlx::query(
        "UPDATE inventory_transactions SET product_id = ?3, quantity = ?4, transaction_date = ?5, note = ?6 \
         WHERE reference_id = ?1 AND transaction_type = ?2",
    )
    .bind(&movement.reference_id)
    .bind(movement.transaction_type)
    .bind(&movement.product_id)
    .bind(quantity)
    .bind(movement.date)
    .bind(&movement.note)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        insert_movement(conn, movement).await?;
    }
    Ok(())
}

/// Removes the movements of every item of a document.
pub(crate) async fn delete_document_movements(
    conn: &mut SqliteConnection,
    item_table: &str,
    document_id: &str,
) -> DbResult<u64> {
    let sql = format!(
        "DELETE FROM inventory_transactions WHERE reference_id IN (SELECT id FROM {} WHERE document_id = ?1)",
        item_table
    );
    let result = sqlx::query(&sql).bind(document_id).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use bazaar_core::{CoreError, Money, NewProduct};

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert(
                &NewProduct {
                    name: "Rice 5kg".into(),
                    sku: "RICE-5".into(),
                    category: None,
                    brand: None,
                    unit: None,
                    price: Money::from_major(450),
                    cost: Money::from_major(400),
                },
                None,
            )
            .await
            .unwrap();
        (db, product.id)
    }

    fn movement(product_id: &str, kind: TransactionType, qty: i64, reference: Option<&str>) -> NewMovement {
        NewMovement {
            product_id: product_id.into(),
            transaction_type: kind,
            adjustment_type: None,
            quantity: qty,
            reference_id: reference.map(str::to_string),
            date: Utc::now().date_naive(),
            note: None,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn test_signs_follow_transaction_type() {
        let (db, product) = setup().await;
        let repo = db.inventory();

        let purchase = repo.record(&movement(&product, TransactionType::Purchase, 10, None)).await.unwrap();
        let sale = repo.record(&movement(&product, TransactionType::Sale, 3, None)).await.unwrap();
        let back = repo.record(&movement(&product, TransactionType::SaleReturn, -1, None)).await.unwrap();

        assert_eq!(purchase.quantity, 10);
        assert_eq!(sale.quantity, -3);
        assert_eq!(back.quantity, 1);
        assert_eq!(repo.current_stock(&product).await.unwrap(), 8);
        assert_eq!(repo.transactions_for_product(&product).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_adjust_decrease_checked() {
        let (db, product) = setup().await;
        let repo = db.inventory();
        repo.adjust(&product, 3, AdjustmentType::Increase, Some("count"), None)
            .await
            .unwrap();

        let err = repo
            .adjust(&product, 5, AdjustmentType::Decrease, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot decrease stock by 5. Current stock is only 3.");
        assert!(matches!(err.rule(), Some(CoreError::StockDecreaseTooLarge { .. })));

        repo.adjust(&product, 3, AdjustmentType::Decrease, None, None).await.unwrap();
        assert_eq!(repo.current_stock(&product).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_item_movement_is_replaced() {
        let (db, product) = setup().await;
        let repo = db.inventory();

        repo.upsert_for_item(&movement(&product, TransactionType::Purchase, 10, Some("item-1")))
            .await
            .unwrap();
        repo.upsert_for_item(&movement(&product, TransactionType::Purchase, 7, Some("item-1")))
            .await
            .unwrap();
        assert_eq!(repo.current_stock(&product).await.unwrap(), 7);

        assert_eq!(repo.delete_for_item("item-1").await.unwrap(), 1);
        assert_eq!(repo.current_stock(&product).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stock_levels() {
        let (db, product) = setup().await;
        db.inventory()
            .record(&movement(&product, TransactionType::Purchase, 4, None))
            .await
            .unwrap();
        let levels = db.inventory().stock_levels().await.unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].1, 4);
    }
}
