//! # Trade Documents
//!
//! Shared persistence for sales, purchases and both kinds of return. The
//! four document tables share one column layout, so every repository in
//! this family goes through the helpers here.
//!
//! ## Saving a Document
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  one transaction                                                        │
//! │                                                                         │
//! │  1. number      latest "SO-2024-%" ──► next_document_number            │
//! │  2. header      sales / purchases / sale_returns / purchase_returns     │
//! │  3. items       one row per line, priced by LineInput::totals           │
//! │  4. stock       one movement per item (reference_id = item id)          │
//! │  5. journal     party + payment postings (reference_no = number)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use bazaar_core::accounts::{
    purchase_postings, purchase_return_postings, sale_postings, sale_return_postings, DocumentLedgers,
};
use bazaar_core::trade::{
    ensure_not_cancelled, next_document_number, Document, DocumentInput, DocumentItem, DocumentKind,
    DocumentTotals,
};
use bazaar_core::validation::validate_non_negative;
use bazaar_core::{new_id, CoreError, CoreResult, Money};
use chrono::{Datelike, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use super::accounts::{fetch_ledger, party_ledger_id, remove_postings, replace_postings, PostingContext};
use super::inventory::{delete_document_movements, upsert_item_movement, NewMovement};
use crate::error::{DbError, DbResult};

pub(crate) const DOCUMENT_COLUMNS: &str = "id, number, party_id, payment_ledger_id, source_id, document_date, \
     due_date, subtotal, discount, tax, total, paid, due, note, status, created_by, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, document_id, product_id, source_item_id, quantity, unit_price, discount_bps, discount_amount, total_price";

/// Highest number issued for this kind and year, including deleted rows.
async fn latest_number(conn: &mut SqliteConnection, kind: DocumentKind, year: i32) -> DbResult<Option<String>> {
    let sql = format!(
        "SELECT number FROM {} WHERE number LIKE ?1 ORDER BY LENGTH(number) DESC, number DESC LIMIT 1",
        kind.table()
    );
    Ok(sqlx::query_scalar(&sql)
        .bind(format!("{}-{}-%", kind.prefix(), year))
        .fetch_optional(&mut *conn)
        .await?)
}

async fn ensure_party(conn: &mut SqliteConnection, kind: DocumentKind, party_id: &str) -> DbResult<()> {
    let party = kind.party();
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE id = ?1 AND deleted_at IS NULL",
        party.table()
    );
    let count: i64 = sqlx::query_scalar(&sql).bind(party_id).fetch_one(&mut *conn).await?;
    if count == 0 {
        return Err(DbError::not_found(party.to_string(), party_id));
    }
    Ok(())
}

/// Inserts header, items and stock movements, then posts the journal.
pub(crate) async fn insert_document(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    input: &DocumentInput,
    totals: &DocumentTotals,
    status: &str,
) -> DbResult<(Document, Vec<DocumentItem>)> {
    ensure_party(conn, kind, &input.party_id).await?;
    if let Some(ledger) = input.payment_ledger_id.as_deref() {
        fetch_ledger(conn, ledger).await?;
    }

    let latest = latest_number(conn, kind, input.date.year()).await?;
    let now = Utc::now();
    let document = Document {
        id: new_id(),
        number: next_document_number(kind, input.date.year(), latest.as_deref()),
        party_id: Some(input.party_id.clone()),
        payment_ledger_id: input.payment_ledger_id.clone(),
        source_id: input.source_id.clone(),
        document_date: input.date,
        due_date: input.due_date,
        subtotal: totals.subtotal,
        discount: totals.discount,
        tax: totals.tax,
        total: totals.total,
        paid: totals.paid,
        due: totals.due,
        note: input.note.clone(),
        status: status.to_string(),
        created_by: input.created_by.clone(),
        created_at: now,
        updated_at: now,
    };

    let sql = format!(
        "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        kind.table(),
        DOCUMENT_COLUMNS
    );
    sqlx::query(&sql)
        .bind(&document.id)
        .bind(&document.number)
        .bind(&document.party_id)
        .bind(&document.payment_ledger_id)
        .bind(&document.source_id)
        .bind(document.document_date)
        .bind(document.due_date)
        .bind(document.subtotal)
        .bind(document.discount)
        .bind(document.tax)
        .bind(document.total)
        .bind(document.paid)
        .bind(document.due)
        .bind(&document.note)
        .bind(&document.status)
        .bind(&document.created_by)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&mut *conn)
        .await?;

    let mut items = Vec::with_capacity(input.lines.len());
    let item_sql = format!(
        "INSERT INTO {} ({}, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        kind.item_table(),
        ITEM_COLUMNS
    );
    for line in &input.lines {
        let priced = line.totals()?;
        let item = DocumentItem {
            id: new_id(),
            document_id: document.id.clone(),
            product_id: line.product_id.clone(),
            source_item_id: line.source_item_id.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount_bps: line.discount_bps,
            discount_amount: priced.discount_amount,
            total_price: priced.total,
        };
        sqlx::query(&item_sql)
            .bind(&item.id)
            .bind(&item.document_id)
            .bind(&item.product_id)
            .bind(&item.source_item_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.discount_bps)
            .bind(item.discount_amount)
            .bind(item.total_price)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        upsert_item_movement(
            conn,
            &NewMovement {
                product_id: item.product_id.clone(),
                transaction_type: kind.transaction_type(),
                adjustment_type: None,
                quantity: item.quantity,
                reference_id: Some(item.id.clone()),
                date: document.document_date,
                note: Some(document.number.clone()),
                created_by: document.created_by.clone(),
            },
        )
        .await?;
        items.push(item);
    }

    post_document(conn, kind, &document).await?;

    debug!(
        number = %document.number,
        kind = kind.label(),
        items = items.len(),
        total = %document.total,
        "Document saved"
    );
    Ok((document, items))
}

/// Rewrites the journal lines of a document from its current header.
pub(crate) async fn post_document(conn: &mut SqliteConnection, kind: DocumentKind, document: &Document) -> DbResult<()> {
    let party_id = document
        .party_id
        .as_deref()
        .ok_or_else(|| DbError::Internal(format!("{} has no party", document.number)))?;
    let party_ledger = party_ledger_id(conn, kind.party(), party_id).await?;

    let ledgers = DocumentLedgers {
        party_ledger: &party_ledger,
        payment_ledger: document.payment_ledger_id.as_deref(),
        total: document.total,
        settled: document.paid,
    };
    let postings = match kind {
        DocumentKind::Sale => sale_postings(&ledgers),
        DocumentKind::Purchase => purchase_postings(&ledgers),
        DocumentKind::SaleReturn => sale_return_postings(&ledgers),
        DocumentKind::PurchaseReturn => purchase_return_postings(&ledgers),
    };

    let details = format!("{} {}", kind.label(), document.number);
    replace_postings(
        conn,
        &PostingContext {
            reference_no: &document.number,
            date: document.document_date,
            sub_ledger: Some(kind.label()),
            details: Some(&details),
            created_by: document.created_by.as_deref(),
        },
        &postings,
    )
    .await
}

pub(crate) async fn fetch_document(conn: &mut SqliteConnection, kind: DocumentKind, id: &str) -> DbResult<Document> {
    find_document(conn, kind, id)
        .await?
        .ok_or_else(|| DbError::not_found(kind.label(), id))
}

pub(crate) async fn find_document(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    id: &str,
) -> DbResult<Option<Document>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1 AND deleted_at IS NULL",
        DOCUMENT_COLUMNS,
        kind.table()
    );
    Ok(sqlx::query_as::<_, Document>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub(crate) async fn fetch_items(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    document_id: &str,
) -> DbResult<Vec<DocumentItem>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE document_id = ?1 ORDER BY created_at, id",
        ITEM_COLUMNS,
        kind.item_table()
    );
    Ok(sqlx::query_as::<_, DocumentItem>(&sql)
        .bind(document_id)
        .fetch_all(&mut *conn)
        .await?)
}

/// Sets a status other than cancelled. Cancelled documents stay cancelled.
pub(crate) async fn update_status(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    id: &str,
    status: &str,
) -> DbResult<Document> {
    let current = fetch_document(conn, kind, id).await?;
    ensure_not_cancelled(kind.label(), &current.status, "change status")?;

    let sql = format!(
        "UPDATE {} SET status = ?2, updated_at = ?3 WHERE id = ?1",
        kind.table()
    );
    sqlx::query(&sql).bind(id).bind(status).bind(Utc::now()).execute(&mut *conn).await?;
    fetch_document(conn, kind, id).await
}

/// Marks a document cancelled and removes its journal lines and stock movements.
pub(crate) async fn cancel_document(conn: &mut SqliteConnection, kind: DocumentKind, id: &str) -> DbResult<Document> {
    let current = fetch_document(conn, kind, id).await?;
    ensure_not_cancelled(kind.label(), &current.status, "cancel")?;

    let sql = format!(
        "UPDATE {} SET status = 'cancelled', updated_at = ?2 WHERE id = ?1",
        kind.table()
    );
    sqlx::query(&sql).bind(id).bind(Utc::now()).execute(&mut *conn).await?;

    let postings = remove_postings(conn, &current.number).await?;
    let movements = delete_document_movements(conn, kind.item_table(), id).await?;
    debug!(number = %current.number, postings, movements, "Document cancelled");

    fetch_document(conn, kind, id).await
}

/// Due after paying `paid` against `total`.
pub(crate) fn settle(total: Money, paid: Money) -> CoreResult<Money> {
    validate_non_negative("paid", paid)?;
    if paid > total {
        return Err(CoreError::OverPayment {
            paid: paid.to_string(),
            total: total.to_string(),
        });
    }
    Ok(total - paid)
}

/// Writes new paid/due amounts onto a header.
pub(crate) async fn write_settlement(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    id: &str,
    paid: Money,
    due: Money,
    payment_ledger_id: Option<&str>,
) -> DbResult<()> {
    let sql = format!(
        "UPDATE {} SET paid = ?2, due = ?3, payment_ledger_id = ?4, updated_at = ?5 WHERE id = ?1",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(id)
        .bind(paid)
        .bind(due)
        .bind(payment_ledger_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Quantity per product on a document.
pub(crate) async fn quantities_on(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    document_id: &str,
) -> DbResult<HashMap<String, i64>> {
    let sql = format!(
        "SELECT product_id, SUM(quantity) FROM {} WHERE document_id = ?1 GROUP BY product_id",
        kind.item_table()
    );
    let rows: Vec<(String, i64)> = sqlx::query_as(&sql).bind(document_id).fetch_all(&mut *conn).await?;
    Ok(rows.into_iter().collect())
}

/// Quantity per product already returned against a source document.
pub(crate) async fn returned_quantities(
    conn: &mut SqliteConnection,
    return_kind: DocumentKind,
    source_id: &str,
) -> DbResult<HashMap<String, i64>> {
    let sql = format!(
        "SELECT i.product_id, SUM(i.quantity) FROM {items} i JOIN {docs} d ON d.id = i.document_id \
         WHERE d.source_id = ?1 AND d.status <> 'cancelled' AND d.deleted_at IS NULL GROUP BY i.product_id",
        items = return_kind.item_table(),
        docs = return_kind.table()
    );
    let rows: Vec<(String, i64)> = sqlx::query_as(&sql).bind(source_id).fetch_all(&mut *conn).await?;
    Ok(rows.into_iter().collect())
}
