//! # Contact Repository
//!
//! Each SMS user's address book. Every read and write is scoped to the
//! owner, so one client never sees or sends to another's contacts.
//!
//! ```text
//! contact_groups (owner, name unique among live groups)
//!       │ 0..n
//!       ▼
//! contacts (owner, contact_no as 8801XXXXXXXXX, group optional)
//! ```
//!
//! Deleting a group soft-deletes its contacts with it.

use bazaar_core::new_id;
use bazaar_core::sms::contact::{
    validate_contact, validate_group_name, Contact, ContactGroup, ContactGroupSummary, ContactImport, NewContact,
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::begin_write;
use crate::error::{DbError, DbResult};

const GROUP_COLUMNS: &str = "id, name, owner_user_id, deleted_at, created_at, updated_at";

const CONTACT_COLUMNS: &str =
    "id, name, contact_no, owner_user_id, contact_group_id, deleted_at, created_at, updated_at";

async fn live_group(conn: &mut SqliteConnection, owner_id: &str, group_id: &str) -> DbResult<ContactGroup> {
    let sql = format!(
        "SELECT {} FROM contact_groups WHERE id = ?1 AND owner_user_id = ?2 AND deleted_at IS NULL",
        GROUP_COLUMNS
    );
    sqlx::query_as::<_, ContactGroup>(&sql)
        .bind(group_id)
        .bind(owner_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Contact group", group_id))
}

async fn group_by_name(conn: &mut SqliteConnection, owner_id: &str, name: &str) -> DbResult<Option<ContactGroup>> {
    let sql = format!(
        "SELECT {} FROM contact_groups WHERE owner_user_id = ?1 AND name = ?2 AND deleted_at IS NULL",
        GROUP_COLUMNS
    );
    Ok(sqlx::query_as::<_, ContactGroup>(&sql)
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?)
}

async fn insert_group(conn: &mut SqliteConnection, owner_id: &str, name: &str) -> DbResult<ContactGroup> {
    let now = Utc::now();
    let group = ContactGroup {
        id: new_id(),
        name: name.to_string(),
        owner_user_id: owner_id.to_string(),
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO contact_groups (id, name, owner_user_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&group.id)
    .bind(&group.name)
    .bind(&group.owner_user_id)
    .bind(group.created_at)
    .bind(group.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(group)
}

/// Returns the live contact with this number in this group, creating it
/// when there is none.
async fn get_or_insert_contact(
    conn: &mut SqliteConnection,
    owner_id: &str,
    name: Option<&str>,
    contact_no: &str,
    group_id: Option<&str>,
) -> DbResult<(Contact, bool)> {
    let sql = format!(
        "SELECT {} FROM contacts WHERE owner_user_id = ?1 AND contact_no = ?2 AND contact_group_id IS ?3 \
         AND deleted_at IS NULL",
        CONTACT_COLUMNS
    );
    if let Some(existing) = sqlx::query_as::<_, Contact>(&sql)
        .bind(owner_id)
        .bind(contact_no)
        .bind(group_id)
        .fetch_optional(&mut *conn)
        .await?
    {
        return Ok((existing, false));
    }

    let now = Utc::now();
    let contact = Contact {
        id: new_id(),
        name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
        contact_no: contact_no.to_string(),
        owner_user_id: owner_id.to_string(),
        contact_group_id: group_id.map(str::to_string),
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO contacts (id, name, contact_no, owner_user_id, contact_group_id, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&contact.id)
    .bind(&contact.name)
    .bind(&contact.contact_no)
    .bind(&contact.owner_user_id)
    .bind(&contact.contact_group_id)
    .bind(contact.created_at)
    .bind(contact.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok((contact, true))
}

#[derive(Debug, Clone)]
pub struct ContactRepository {
    pool: SqlitePool,
}

impl ContactRepository {
    /// Creates a new ContactRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ContactRepository { pool }
    }

    // ===== Groups =====

    pub async fn create_group(&self, owner_id: &str, name: &str) -> DbResult<ContactGroup> {
        validate_group_name(name)?;
        let name = name.trim();
        let mut tx = begin_write(&self.pool).await?;

        if group_by_name(&mut tx, owner_id, name).await?.is_some() {
            return Err(DbError::duplicate("group name", name));
        }
        let group = insert_group(&mut tx, owner_id, name).await?;

        tx.commit().await?;
        debug!(id = %group.id, owner = %owner_id, "Contact group created");
        Ok(group)
    }

    pub async fn rename_group(&self, owner_id: &str, group_id: &str, name: &str) -> DbResult<ContactGroup> {
        validate_group_name(name)?;
        let name = name.trim();
        let mut tx = begin_write(&self.pool).await?;

        let mut group = live_group(&mut tx, owner_id, group_id).await?;
        if let Some(other) = group_by_name(&mut tx, owner_id, name).await? {
            if other.id != group.id {
                return Err(DbError::duplicate("group name", name));
            }
        }
        group.name = name.to_string();
        group.updated_at = Utc::now();
        sqlx::query("UPDATE contact_groups SET name = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&group.id)
            .bind(&group.name)
            .bind(group.updated_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(group)
    }

    pub async fn get_group(&self, owner_id: &str, group_id: &str) -> DbResult<Option<ContactGroup>> {
        let mut conn = self.pool.acquire().await?;
        match live_group(&mut conn, owner_id, group_id).await {
            Ok(group) => Ok(Some(group)),
            Err(DbError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Live groups with their live contact counts, newest first.
    pub async fn list_groups(&self, owner_id: &str) -> DbResult<Vec<ContactGroupSummary>> {
        Ok(sqlx::query_as::<_, ContactGroupSummary>(
            "SELECT g.id, g.name, g.owner_user_id, g.deleted_at, g.created_at, g.updated_at, \
             (SELECT COUNT(*) FROM contacts c WHERE c.contact_group_id = g.id AND c.deleted_at IS NULL) AS contacts \
             FROM contact_groups g WHERE g.owner_user_id = ?1 AND g.deleted_at IS NULL \
             ORDER BY g.created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Soft-deletes a group and every contact in it.
    pub async fn delete_group(&self, owner_id: &str, group_id: &str) -> DbResult<()> {
        let mut tx = begin_write(&self.pool).await?;
        let group = live_group(&mut tx, owner_id, group_id).await?;
        let now = Utc::now();

        let removed = sqlx::query(
            "UPDATE contacts SET deleted_at = ?2, updated_at = ?2 WHERE contact_group_id = ?1 AND deleted_at IS NULL",
        )
        .bind(&group.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE contact_groups SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1")
            .bind(&group.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(id = %group.id, contacts = removed.rows_affected(), "Contact group deleted");
        Ok(())
    }

    // ===== Contacts =====

    /// Adds a contact, or returns the live one already holding this number
    /// in the same group.
    pub async fn add_contact(&self, owner_id: &str, input: &NewContact) -> DbResult<Contact> {
        let contact_no = validate_contact(input)?;
        let mut tx = begin_write(&self.pool).await?;

        if let Some(group_id) = input.contact_group_id.as_deref() {
            live_group(&mut tx, owner_id, group_id).await?;
        }
        let (contact, _) = get_or_insert_contact(
            &mut tx,
            owner_id,
            input.name.as_deref(),
            &contact_no,
            input.contact_group_id.as_deref(),
        )
        .await?;

        tx.commit().await?;
        Ok(contact)
    }

    pub async fn get_contact(&self, owner_id: &str, contact_id: &str) -> DbResult<Option<Contact>> {
        let sql = format!(
            "SELECT {} FROM contacts WHERE id = ?1 AND owner_user_id = ?2 AND deleted_at IS NULL",
            CONTACT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Contact>(&sql)
            .bind(contact_id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn delete_contact(&self, owner_id: &str, contact_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE contacts SET deleted_at = ?3, updated_at = ?3 \
             WHERE id = ?1 AND owner_user_id = ?2 AND deleted_at IS NULL",
        )
        .bind(contact_id)
        .bind(owner_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Contact", contact_id));
        }
        Ok(())
    }

    /// Live contacts, newest first; `search` matches name or number.
    pub async fn list_contacts(&self, owner_id: &str, search: Option<&str>) -> DbResult<Vec<Contact>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let sql = format!(
            "SELECT {} FROM contacts WHERE owner_user_id = ?1 AND deleted_at IS NULL \
             AND (?2 IS NULL OR name LIKE ?2 OR contact_no LIKE ?2) ORDER BY created_at DESC",
            CONTACT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Contact>(&sql)
            .bind(owner_id)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Live contacts of one of the owner's live groups.
    pub async fn group_contacts(&self, owner_id: &str, group_id: &str) -> DbResult<Vec<Contact>> {
        let mut conn = self.pool.acquire().await?;
        live_group(&mut conn, owner_id, group_id).await?;
        let sql = format!(
            "SELECT {} FROM contacts WHERE contact_group_id = ?1 AND deleted_at IS NULL ORDER BY created_at",
            CONTACT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Contact>(&sql)
            .bind(group_id)
            .fetch_all(&mut *conn)
            .await?)
    }

    /// Files uploaded rows under the named group, creating the group when
    /// the owner has none by that name. Unreadable numbers are counted and
    /// skipped; numbers already in the group are kept once.
    pub async fn import(&self, owner_id: &str, group_name: &str, rows: &[NewContact]) -> DbResult<ContactImport> {
        validate_group_name(group_name)?;
        let group_name = group_name.trim();
        let mut tx = begin_write(&self.pool).await?;

        let group = match group_by_name(&mut tx, owner_id, group_name).await? {
            Some(group) => group,
            None => insert_group(&mut tx, owner_id, group_name).await?,
        };

        let mut added = 0;
        let mut skipped = 0;
        for row in rows {
            let Ok(contact_no) = validate_contact(row) else {
                skipped += 1;
                continue;
            };
            let (_, created) =
                get_or_insert_contact(&mut tx, owner_id, row.name.as_deref(), &contact_no, Some(&group.id)).await?;
            if created {
                added += 1;
            }
        }

        tx.commit().await?;
        info!(group = %group.name, owner = %owner_id, added, skipped, "Contacts imported");
        Ok(ContactImport { group, added, skipped })
    }
}
