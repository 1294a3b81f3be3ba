//! Client address book: contacts, optionally filed under named groups.
//!
//! Numbers are kept in one canonical shape so the same phone typed as
//! `017 1100 0000`, `+8801711000000` or `8801711000000` is one contact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::validation::ValidationResult;

pub const MAX_GROUP_NAME_LEN: usize = 30;
pub const MAX_CONTACT_NAME_LEN: usize = 100;

/// Country and mobile prefix every stored number starts with.
pub const CONTACT_PREFIX: &str = "8801";
/// Subscriber digits kept after [`CONTACT_PREFIX`].
pub const SUBSCRIBER_DIGITS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ContactGroup {
    pub id: String,
    pub name: String,
    pub owner_user_id: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Contact {
    pub id: String,
    pub name: Option<String>,
    /// Canonical `8801XXXXXXXXX` form.
    pub contact_no: String,
    pub owner_user_id: String,
    pub contact_group_id: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub name: Option<String>,
    /// Any common spelling of the number; see [`normalize_contact_no`].
    pub contact_no: String,
    pub contact_group_id: Option<String>,
}

/// A group with the number of live contacts filed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ContactGroupSummary {
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub group: ContactGroup,
    pub contacts: i64,
}

/// Outcome of importing an uploaded contact sheet into one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactImport {
    pub group: ContactGroup,
    pub added: usize,
    /// Rows whose number could not be read.
    pub skipped: usize,
}

/// Who a group send goes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Every live contact in one of the sender's groups.
    Group(String),
    /// One of the sender's contacts.
    Contact(String),
}

/// Canonical form of a phone number, or `None` when it has fewer than nine
/// digits.
///
/// Whitespace is dropped and the last nine digits are kept behind
/// [`CONTACT_PREFIX`].
///
/// ```rust
/// use bazaar_core::sms::contact::normalize_contact_no;
///
/// assert_eq!(normalize_contact_no("017 1100 0000").as_deref(), Some("8801711000000"));
/// assert_eq!(normalize_contact_no("+8801711000000").as_deref(), Some("8801711000000"));
/// assert_eq!(normalize_contact_no("12345"), None);
/// ```
pub fn normalize_contact_no(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    if digits.len() < SUBSCRIBER_DIGITS || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}{}", CONTACT_PREFIX, &digits[digits.len() - SUBSCRIBER_DIGITS..]))
}

pub fn validate_group_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }
    if name.chars().count() > MAX_GROUP_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_GROUP_NAME_LEN,
        });
    }
    Ok(())
}

/// Validates a new contact and returns its canonical number.
pub fn validate_contact(contact: &NewContact) -> ValidationResult<String> {
    if let Some(name) = &contact.name {
        if name.chars().count() > MAX_CONTACT_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "name".to_string(),
                max: MAX_CONTACT_NAME_LEN,
            });
        }
    }
    normalize_contact_no(&contact.contact_no).ok_or_else(|| ValidationError::InvalidFormat {
        field: "contact_no".to_string(),
        reason: format!("'{}' needs at least {} digits", contact.contact_no.trim(), SUBSCRIBER_DIGITS),
    })
}
