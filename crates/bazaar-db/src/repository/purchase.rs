//! # Purchase Repository
//!
//! Purchases from suppliers. Saving a purchase adds one "purchase" stock
//! movement per item and debits the supplier ledger with the total; a paid
//! amount credits the payment ledger.

use bazaar_core::trade::{Document, DocumentInput, DocumentItem, DocumentKind, PurchaseStatus};
use sqlx::SqlitePool;
use tracing::info;

use super::document::{cancel_document, fetch_items, find_document, insert_document, update_status};
use super::begin_write;
use crate::error::DbResult;

const KIND: DocumentKind = DocumentKind::Purchase;

/// Repository for purchase database operations.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Creates a purchase with its items, stock movements and journal lines.
    pub async fn create_purchase(&self, input: &DocumentInput) -> DbResult<Document> {
        let totals = input.validate(KIND.label())?;
        let mut tx = begin_write(&self.pool).await?;
        let (purchase, _) =
            insert_document(&mut tx, KIND, input, &totals, PurchaseStatus::default().as_str()).await?;
        tx.commit().await?;

        info!(number = %purchase.number, total = %purchase.total, "Purchase created");
        Ok(purchase)
    }

    pub async fn set_status(&self, id: &str, status: PurchaseStatus) -> DbResult<Document> {
        if status == PurchaseStatus::Cancelled {
            return self.cancel(id).await;
        }
        let mut tx = begin_write(&self.pool).await?;
        let updated = update_status(&mut tx, KIND, id, status.as_str()).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Cancels a purchase, removing its journal lines and stock movements.
    pub async fn cancel(&self, id: &str) -> DbResult<Document> {
        let mut tx = begin_write(&self.pool).await?;
        let cancelled = cancel_document(&mut tx, KIND, id).await?;
        tx.commit().await?;
        info!(number = %cancelled.number, "Purchase cancelled");
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{document_input, shop};
    use bazaar_core::trade::LineInput;
    use bazaar_core::Money;

    #[tokio::test]
    async fn test_purchase_adds_stock_and_debits_supplier() {
        let shop = shop().await;
        let input = document_input(
            &shop.supplier,
            Some(&shop.cash),
            vec![LineInput::new(&shop.product, 12, Money::from_major(40)).with_discount(500)],
            Money::from_major(200),
        );
        let purchase = shop.db.purchases().create_purchase(&input).await.unwrap();

        assert!(purchase.number.starts_with("PO-"));
        // 12 × 40 = 480, less 5%
        assert_eq!(purchase.total, Money::from_minor(45_600));
        assert_eq!(shop.db.inventory().current_stock(&shop.product).await.unwrap(), 12);

        let supplier_ledger = shop
            .db
            .accounts()
            .find_ledger_by_reference("supplier", &shop.supplier)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            shop.db.accounts().ledger_balance(&supplier_ledger.id).await.unwrap(),
            Money::from_minor(45_600)
        );
        assert_eq!(
            shop.db.accounts().ledger_balance(&shop.cash).await.unwrap(),
            Money::from_major(-200)
        );
    }

    #[tokio::test]
    async fn test_purchase_requires_supplier() {
        let shop = shop().await;
        let input = document_input(
            &shop.customer,
            None,
            vec![LineInput::new(&shop.product, 1, Money::from_major(40))],
            Money::zero(),
        );
        assert!(shop.db.purchases().create_purchase(&input).await.is_err());
    }

    #[tokio::test]
    async fn test_status_then_cancel() {
        let shop = shop().await;
        let purchase = shop
            .db
            .purchases()
            .create_purchase(&document_input(
                &shop.supplier,
                None,
                vec![LineInput::new(&shop.product, 3, Money::from_major(10))],
                Money::zero(),
            ))
            .await
            .unwrap();

        let received = shop
            .db
            .purchases()
            .set_status(&purchase.id, PurchaseStatus::Received)
            .await
            .unwrap();
        assert_eq!(received.status, "received");

        shop.db.purchases().cancel(&purchase.id).await.unwrap();
        assert_eq!(shop.db.inventory().current_stock(&shop.product).await.unwrap(), 0);
        assert_eq!(shop.db.purchases().items(&purchase.id).await.unwrap().len(), 1);
        assert!(shop.db.purchases().cancel(&purchase.id).await.is_err());
    }
}
