//! # Party Repository
//!
//! Customers and suppliers. Each party owns a ledger that mirrors it:
//!
//! ```text
//! create  ──► party row + ledger (type = customer|supplier, reference_id = party id,
//!                                 head = "Customer"|"Supplier" group)
//! update  ──► ledger renamed with the party
//! delete  ──► party and ledger soft-deleted together
//! ```

use bazaar_core::accounts::{GroupHead, NewLedger};
use bazaar_core::validation::{title_case, validate_name, validate_phone_number};
use bazaar_core::{new_id, Money, NewParty, Party, PartyKind};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::accounts::{find_by_reference, group_id, insert_ledger, retire_reference_ledger};
use super::begin_write;
use crate::error::{DbError, DbResult};

const PARTY_COLUMNS: &str = "id, name, phone, email, address, created_by, created_at, updated_at, deleted_at";

/// Repository for customers and suppliers.
#[derive(Debug, Clone)]
pub struct PartyRepository {
    pool: SqlitePool,
}

fn validate(input: &NewParty) -> DbResult<()> {
    validate_name("name", &input.name)?;
    if let Some(phone) = input.phone.as_deref().filter(|p| !p.is_empty()) {
        validate_phone_number(phone)?;
    }
    Ok(())
}

impl PartyRepository {
    /// Creates a new PartyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PartyRepository { pool }
    }

    /// Creates a party and its ledger in one transaction.
    pub async fn create(&self, kind: PartyKind, input: &NewParty, created_by: Option<&str>) -> DbResult<Party> {
        validate(input)?;

        let now = Utc::now();
        let party = Party {
            id: new_id(),
            name: input.name.trim().to_string(),
            phone: input.phone.clone(),
            email: input.email.clone(),
            address: input.address.clone(),
            created_by: created_by.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let mut tx = begin_write(&self.pool).await?;

        let sql = format!(
            "INSERT INTO {} (id, name, phone, email, address, created_by, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            kind.table()
        );
        sqlx::query(&sql)
            .bind(&party.id)
            .bind(&party.name)
            .bind(&party.phone)
            .bind(&party.email)
            .bind(&party.address)
            .bind(&party.created_by)
            .bind(party.created_at)
            .bind(party.updated_at)
            .execute(&mut *tx)
            .await?;

        let head = group_id(&mut tx, kind.head_group_name())
            .await?
            .ok_or_else(|| DbError::not_found("Group", kind.head_group_name()))?;
        insert_ledger(
            &mut tx,
            &NewLedger {
                name: party.name.clone(),
                ledger_type: Some(kind.ledger_type().to_string()),
                reference_id: Some(party.id.clone()),
                head: GroupHead::Group(head),
                amount: Money::zero(),
                is_deletable: true,
                is_default: false,
            },
            created_by,
        )
        .await?;

        tx.commit().await?;
        debug!(id = %party.id, kind = %kind, "Party created");
        Ok(party)
    }

    /// Updates contact details; a new name is carried to the ledger.
    pub async fn update(&self, kind: PartyKind, id: &str, input: &NewParty) -> DbResult<Party> {
        validate(input)?;
        let mut tx = begin_write(&self.pool).await?;

        let sql = format!(
            "UPDATE {} SET name = ?2, phone = ?3, email = ?4, address = ?5, updated_at = ?6 \
             WHERE id = ?1 AND deleted_at IS NULL",
            kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(input.name.trim())
            .bind(&input.phone)
            .bind(&input.email)
            .bind(&input.address)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found(kind.to_string(), id));
        }

        if let Some(ledger) = find_by_reference(&mut tx, kind.ledger_type(), id).await? {
            let name = title_case(input.name.trim());
            if ledger.name != name {
                super::accounts::ensure_unique(&mut tx, "ledger_accounts", "name", &name, Some(&ledger.id)).await?;
                sqlx::query("UPDATE ledger_accounts SET name = ?2, updated_at = ?3 WHERE id = ?1")
                    .bind(&ledger.id)
                    .bind(&name)
                    .bind(Utc::now())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        self.get_by_id(kind, id)
            .await?
            .ok_or_else(|| DbError::not_found(kind.to_string(), id))
    }

    /// Soft-deletes a party and its ledger.
    pub async fn delete(&self, kind: PartyKind, id: &str) -> DbResult<()> {
        let mut tx = begin_write(&self.pool).await?;
        let now = Utc::now();

        let sql = format!(
            "UPDATE {} SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            kind.table()
        );
        let result = sqlx::query(&sql).bind(id).bind(now).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found(kind.to_string(), id));
        }
        retire_reference_ledger(&mut tx, kind.ledger_type(), id).await?;

        tx.commit().await?;
        debug!(id = %id, kind = %kind, "Party deleted");
        Ok(())
    }

    pub async fn get_by_id(&self, kind: PartyKind, id: &str) -> DbResult<Option<Party>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1 AND deleted_at IS NULL",
            PARTY_COLUMNS,
            kind.table()
        );
        Ok(sqlx::query_as::<_, Party>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Live parties by name.
    pub async fn list(&self, kind: PartyKind) -> DbResult<Vec<Party>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE deleted_at IS NULL ORDER BY name",
            PARTY_COLUMNS,
            kind.table()
        );
        Ok(sqlx::query_as::<_, Party>(&sql).fetch_all(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.accounts().seed_defaults().await.unwrap();
        db
    }

    fn input(name: &str) -> NewParty {
        NewParty {
            name: name.into(),
            phone: Some("01711000000".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_party_creates_ledger() {
        let db = db().await;
        let customer = db.parties().create(PartyKind::Customer, &input("rahim store"), None).await.unwrap();

        let ledger = db
            .accounts()
            .find_ledger_by_reference("customer", &customer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.name, "Rahim Store");
        let group = db.accounts().get_group_by_name("Customer").await.unwrap().unwrap();
        assert_eq!(ledger.head_group_id, Some(group.id));
    }

    #[tokio::test]
    async fn test_rename_follows_to_ledger() {
        let db = db().await;
        let supplier = db.parties().create(PartyKind::Supplier, &input("Karim"), None).await.unwrap();

        let renamed = db
            .parties()
            .update(PartyKind::Supplier, &supplier.id, &input("Karim Traders"))
            .await
            .unwrap();
        assert_eq!(renamed.name, "Karim Traders");

        let ledger = db
            .accounts()
            .find_ledger_by_reference("supplier", &supplier.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.name, "Karim Traders");
    }

    #[tokio::test]
    async fn test_delete_retires_ledger() {
        let db = db().await;
        let customer = db.parties().create(PartyKind::Customer, &input("Walker"), None).await.unwrap();
        db.parties().delete(PartyKind::Customer, &customer.id).await.unwrap();

        assert!(db.parties().get_by_id(PartyKind::Customer, &customer.id).await.unwrap().is_none());
        assert!(db
            .accounts()
            .find_ledger_by_reference("customer", &customer.id)
            .await
            .unwrap()
            .is_none());
        assert!(db.parties().delete(PartyKind::Customer, &customer.id).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_phone_rejected() {
        let db = db().await;
        let mut bad = input("Bad Phone");
        bad.phone = Some("call me".into());
        assert!(db.parties().create(PartyKind::Customer, &bad, None).await.is_err());
        assert!(db.parties().list(PartyKind::Customer).await.unwrap().is_empty());
    }
}
