//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE                                                             │
//! │     └── create_sale() → Document { status: draft }                     │
//! │         ├── stock checked per product                                  │
//! │         ├── one "sale" movement per item                               │
//! │         └── customer credited, payment ledger debited                  │
//! │                                                                         │
//! │  2. SETTLE                                                             │
//! │     └── update_payment() → paid/due rewritten, journal reposted        │
//! │                                                                         │
//! │  3. PROGRESS                                                           │
//! │     └── set_status(confirmed | delivered)                              │
//! │                                                                         │
//! │  4. (OPTIONAL) CANCEL                                                  │
//! │     └── cancel() → postings and stock movements removed                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use bazaar_core::inventory::check_available;
use bazaar_core::trade::{
    ensure_not_cancelled, Document, DocumentInput, DocumentItem, DocumentKind, SaleStatus,
};
use bazaar_core::Money;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::accounts::fetch_ledger;
use super::document::{
    cancel_document, fetch_document, fetch_items, find_document, insert_document, post_document, update_status,
    settle, write_settlement, DOCUMENT_COLUMNS,
};
use super::inventory::stock_of;
use super::product;
use super::begin_write;
use crate::error::DbResult;

const KIND: DocumentKind = DocumentKind::Sale;

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

/// Fails when any product lacks the stock the lines take out.
pub(crate) async fn check_stock(conn: &mut SqliteConnection, input: &DocumentInput) -> DbResult<()> {
    let mut requested: HashMap<&str, i64> = HashMap::new();
    for line in &input.lines {
        *requested.entry(line.product_id.as_str()).or_default() += line.quantity;
    }

    for (product_id, quantity) in requested {
        let product = product::fetch(conn, product_id).await?;
        let available = stock_of(conn, product_id).await?;
        check_available(&product.name, available, quantity)?;
    }
    Ok(())
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Creates a sale with its items, stock movements and journal lines.
    ///
    /// ## Errors
    /// - Insufficient stock for any product
    /// - Paid more than total, due date before sale date, no items
    /// - Unknown customer or payment ledger
    pub async fn create_sale(&self, input: &DocumentInput) -> DbResult<Document> {
        let totals = input.validate(KIND.label())?;
        let mut tx = begin_write(&self.pool).await?;

        check_stock(&mut tx, input).await?;
        let (sale, _) = insert_document(&mut tx, KIND, input, &totals, SaleStatus::default().as_str()).await?;

        tx.commit().await?;
        info!(number = %sale.number, total = %sale.total, due = %sale.due, "Sale created");
        Ok(sale)
    }

    /// Records a new paid amount and reposts the payment line.
    pub async fn update_payment(&self, id: &str, paid: Money, payment_ledger_id: Option<&str>) -> DbResult<Document> {
        let mut tx = begin_write(&self.pool).await?;

        let current = fetch_document(&mut tx, KIND, id).await?;
        ensure_not_cancelled(KIND.label(), &current.status, "take payment")?;
        if let Some(ledger) = payment_ledger_id {
            fetch_ledger(&mut tx, ledger).await?;
        }

        let due = settle(current.total, paid)?;
        let ledger = payment_ledger_id.or(current.payment_ledger_id.as_deref());
        write_settlement(&mut tx, KIND, id, paid, due, ledger).await?;

        let updated = fetch_document(&mut tx, KIND, id).await?;
        post_document(&mut tx, KIND, &updated).await?;

        tx.commit().await?;
        debug!(number = %updated.number, paid = %paid, due = %updated.due, "Sale payment updated");
        Ok(updated)
    }

    /// Moves a sale to another status. Cancelling goes through [`Self::cancel`].
    pub async fn set_status(&self, id: &str, status: SaleStatus) -> DbResult<Document> {
        if status == SaleStatus::Cancelled {
            return self.cancel(id).await;
        }
        let mut tx = begin_write(&self.pool).await?;
        let updated = update_status(&mut tx, KIND, id, status.as_str()).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Cancels a sale, removing its journal lines and stock movements.
    pub async fn cancel(&self, id: &str) -> DbResult<Document> {
        let mut tx = begin_write(&self.pool).await?;
        let cancelled = cancel_document(&mut tx, KIND, id).await?;
        tx.commit().await?;
        info!(number = %cancelled.number, "Sale cancelled");
        Ok(cancelled)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Document>> {
        let mut conn = self.pool.acquire().await?;
        find_document(&mut conn, KIND, id).await
    }

    pub async fn items(&self, id: &str) -> DbResult<Vec<DocumentItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_items(&mut conn, KIND, id).await
    }

    /// Live sales with money still owed, paired with the customer name.
    pub async fn due_sales(&self) -> DbResult<Vec<(Document, Option<String>)>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE due > 0 AND status <> 'cancelled' AND deleted_at IS NULL \
             ORDER BY document_date",
            DOCUMENT_COLUMNS
        );
        let sales = sqlx::query_as::<_, Document>(&sql).fetch_all(&self.pool).await?;

        let names: Vec<(String, String)> =
            sqlx::query_as("SELECT id, name FROM customers WHERE deleted_at IS NULL")
                .fetch_all(&self.pool)
                .await?;
        let names: HashMap<String, String> = names.into_iter().collect();

        Ok(sales
            .into_iter()
            .map(|sale| {
                let name = sale.party_id.as_ref().and_then(|id| names.get(id).cloned());
                (sale, name)
            })
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{document_input, shop};
    use bazaar_core::trade::LineInput;
    use bazaar_core::CoreError;

    #[tokio::test]
    async fn test_create_sale_moves_stock_and_posts_journal() {
        let shop = shop().await;
        shop.stock(20).await;

        let input = document_input(
            &shop.customer,
            Some(&shop.cash),
            vec![LineInput::new(&shop.product, 5, Money::from_major(100))],
            Money::from_major(300),
        );
        let sale = shop.db.sales().create_sale(&input).await.unwrap();

        assert!(sale.number.starts_with("SO-"));
        assert!(sale.number.ends_with("-00001"));
        assert_eq!(sale.total, Money::from_major(500));
        assert_eq!(sale.due, Money::from_major(200));
        assert_eq!(sale.status, "draft");
        assert_eq!(shop.db.inventory().current_stock(&shop.product).await.unwrap(), 15);

        let logs = shop.db.accounts().logs_for_reference(&sale.number).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(shop.db.sales().items(&sale.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_numbers_increase() {
        let shop = shop().await;
        shop.stock(20).await;
        let line = || vec![LineInput::new(&shop.product, 1, Money::from_major(10))];

        let first = shop
            .db
            .sales()
            .create_sale(&document_input(&shop.customer, None, line(), Money::zero()))
            .await
            .unwrap();
        let second = shop
            .db
            .sales()
            .create_sale(&document_input(&shop.customer, None, line(), Money::zero()))
            .await
            .unwrap();
        assert!(first.number.ends_with("-00001"));
        assert!(second.number.ends_with("-00002"));
    }

    #[tokio::test]
    async fn test_numbers_continue_past_five_digits() {
        let shop = shop().await;
        shop.stock(20).await;
        let new_sale = || {
            document_input(
                &shop.customer,
                None,
                vec![LineInput::new(&shop.product, 1, Money::from_major(10))],
                Money::zero(),
            )
        };

        let first = shop.db.sales().create_sale(&new_sale()).await.unwrap();
        let high = first.number.replace("-00001", "-99999");
        sqlx::query("UPDATE sales SET number = ?2 WHERE id = ?1")
            .bind(&first.id)
            .bind(&high)
            .execute(shop.db.pool())
            .await
            .unwrap();

        let next = shop.db.sales().create_sale(&new_sale()).await.unwrap();
        let after = shop.db.sales().create_sale(&new_sale()).await.unwrap();
        assert!(next.number.ends_with("-100000"));
        assert!(after.number.ends_with("-100001"));
    }

    #[tokio::test]
    async fn test_insufficient_stock_rejected() {
        let shop = shop().await;
        shop.stock(2).await;

        let input = document_input(
            &shop.customer,
            None,
            vec![LineInput::new(&shop.product, 3, Money::from_major(100))],
            Money::zero(),
        );
        let err = shop.db.sales().create_sale(&input).await.unwrap_err();
        assert!(matches!(err.rule(), Some(CoreError::InsufficientStock { .. })));
        assert_eq!(shop.db.inventory().current_stock(&shop.product).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_payment_reposts() {
        let shop = shop().await;
        shop.stock(10).await;
        let sale = shop
            .db
            .sales()
            .create_sale(&document_input(
                &shop.customer,
                None,
                vec![LineInput::new(&shop.product, 2, Money::from_major(50))],
                Money::zero(),
            ))
            .await
            .unwrap();
        assert_eq!(shop.db.accounts().logs_for_reference(&sale.number).await.unwrap().len(), 1);

        let paid = shop
            .db
            .sales()
            .update_payment(&sale.id, Money::from_major(100), Some(&shop.cash))
            .await
            .unwrap();
        assert!(paid.due.is_zero());
        assert_eq!(shop.db.accounts().logs_for_reference(&sale.number).await.unwrap().len(), 2);
        assert_eq!(
            shop.db.accounts().ledger_balance(&shop.cash).await.unwrap(),
            Money::from_major(100)
        );

        assert!(shop
            .db
            .sales()
            .update_payment(&sale.id, Money::from_major(101), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cancel_reverses_side_effects() {
        let shop = shop().await;
        shop.stock(10).await;
        let sale = shop
            .db
            .sales()
            .create_sale(&document_input(
                &shop.customer,
                Some(&shop.cash),
                vec![LineInput::new(&shop.product, 4, Money::from_major(25))],
                Money::from_major(100),
            ))
            .await
            .unwrap();

        let cancelled = shop.db.sales().set_status(&sale.id, SaleStatus::Cancelled).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert_eq!(shop.db.inventory().current_stock(&shop.product).await.unwrap(), 10);
        assert!(shop.db.accounts().logs_for_reference(&sale.number).await.unwrap().is_empty());

        let err = shop.db.sales().set_status(&sale.id, SaleStatus::Delivered).await.unwrap_err();
        assert!(matches!(err.rule(), Some(CoreError::InvalidStatus { .. })));
    }

    #[tokio::test]
    async fn test_due_sales_carry_customer_name() {
        let shop = shop().await;
        shop.stock(10).await;
        shop.db
            .sales()
            .create_sale(&document_input(
                &shop.customer,
                None,
                vec![LineInput::new(&shop.product, 1, Money::from_major(80))],
                Money::zero(),
            ))
            .await
            .unwrap();

        let due = shop.db.sales().due_sales().await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1.as_deref(), Some("Rahim Store"));
    }
}
