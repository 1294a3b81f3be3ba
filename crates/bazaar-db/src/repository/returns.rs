//! # Return Repository
//!
//! Sale returns and purchase returns.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_sale_return(input, source = SO-2024-00007)                      │
//! │                                                                         │
//! │  source live and not cancelled?                                        │
//! │  Σ qty per product  ≤  sold − already returned                          │
//! │  refund            ≤  source due                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SR-2024-00001 saved (party = source party)                             │
//! │       ├── "sale_return" movements put stock back                        │
//! │       ├── customer debited, payment ledger credited with the refund     │
//! │       └── source due −= (return total − refund), floored at zero        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A purchase return takes goods out, so it needs the stock on hand.

use bazaar_core::trade::{
    check_refund, check_return_quantities, ensure_not_cancelled, Document, DocumentInput, DocumentItem, DocumentKind,
    ReturnStatus,
};
use bazaar_core::{Money, ValidationError};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use super::document::{
    fetch_document, fetch_items, find_document, insert_document, quantities_on, returned_quantities,
    write_settlement,
};
use super::begin_write;
use super::sale::check_stock;
use crate::error::DbResult;

/// Repository for sale and purchase returns.
#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
}

async fn create_return(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    source_kind: DocumentKind,
    input: &DocumentInput,
) -> DbResult<Document> {
    let totals = input.validate(kind.label())?;
    let source_id = input.source_id.as_deref().ok_or_else(|| ValidationError::Required {
        field: "source".to_string(),
    })?;

    let source = fetch_document(conn, source_kind, source_id).await?;
    ensure_not_cancelled(source_kind.label(), &source.status, "accept a return")?;

    let sold = quantities_on(conn, source_kind, source_id).await?;
    let returned = returned_quantities(conn, kind, source_id).await?;
    check_return_quantities(&input.lines, &sold, &returned)?;
    check_refund(totals.paid, source.due)?;
    if kind == DocumentKind::PurchaseReturn {
        check_stock(conn, input).await?;
    }

    let mut input = input.clone();
    if let Some(party) = source.party_id.clone() {
        input.party_id = party;
    }
    let (created, _) = insert_document(conn, kind, &input, &totals, ReturnStatus::default().as_str()).await?;

    let credited = totals.total - totals.paid;
    let source_due = (source.due - credited).clamp_non_negative();
    write_settlement(
        conn,
        source_kind,
        &source.id,
        source.paid,
        source_due,
        source.payment_ledger_id.as_deref(),
    )
    .await?;

    Ok(created)
}

impl ReturnRepository {
    /// Creates a new ReturnRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReturnRepository { pool }
    }

    /// Returns goods against a sale.
    ///
    /// ## Errors
    /// - "Refund amount cannot exceed the due amount" when the refund is
    ///   larger than the sale's due
    /// - A product returned beyond what was sold minus earlier returns
    /// - Missing, unknown or cancelled source sale
    pub async fn create_sale_return(&self, input: &DocumentInput) -> DbResult<Document> {
        let mut tx = begin_write(&self.pool).await?;
        let created = create_return(&mut tx, DocumentKind::SaleReturn, DocumentKind::Sale, input).await?;
        tx.commit().await?;
        info!(number = %created.number, total = %created.total, refunded = %created.paid, "Sale return created");
        Ok(created)
    }

    /// Returns goods against a purchase.
    pub async fn create_purchase_return(&self, input: &DocumentInput) -> DbResult<Document> {
        let mut tx = begin_write(&self.pool).await?;
        let created = create_return(&mut tx, DocumentKind::PurchaseReturn, DocumentKind::Purchase, input).await?;
        tx.commit().await?;
        info!(number = %created.number, total = %created.total, refunded = %created.paid, "Purchase return created");
        Ok(created)
    }

    pub async fn get(&self, kind: DocumentKind, id: &str) -> DbResult<Option<Document>> {
        let mut conn = self.pool.acquire().await?;
        find_document(&mut conn, kind, id).await
    }

    pub async fn items(&self, kind: DocumentKind, id: &str) -> DbResult<Vec<DocumentItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_items(&mut conn, kind, id).await
    }

    /// Total refunded on live returns of a source document.
    pub async fn refunded_for(&self, kind: DocumentKind, source_id: &str) -> DbResult<Money> {
        let sql = format!(
            "SELECT COALESCE(SUM(paid), 0) FROM {} WHERE source_id = ?1 AND status <> 'cancelled' \
             AND deleted_at IS NULL",
            kind.table()
        );
        Ok(sqlx::query_scalar(&sql).bind(source_id).fetch_one(&self.pool).await?)
    }
}
