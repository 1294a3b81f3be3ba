//! # Gateway Selection
//!
//! A gateway (`SmsApi`) is an HTTP GET template supplied by an SMS vendor.
//! Admins assign gateways to resellers; every client of that reseller sends
//! through the reseller's assignments.
//!
//! ## Selection Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reseller has active assignments?                                       │
//! │     yes ──► those gateways, by assignment priority                      │
//! │             shared ones above the least-used shared count move last     │
//! │     no  ──► every gateway, by gateway priority                          │
//! │                                                                         │
//! │  dispatcher walks the list; the first gateway that delivers wins        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## URL Template
//! ```text
//!   https://vendor/api?key=K&type={text_type}&to={phone_number}&msg={message}
//!                                  │                │               │
//!                        text | unicode       receiver      form-encoded body
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::sms::message::MessageType;
use crate::validation::validate_name;

pub const PHONE_PLACEHOLDER: &str = "{phone_number}";
pub const MESSAGE_PLACEHOLDER: &str = "{message}";
pub const TEXT_TYPE_PLACEHOLDER: &str = "{text_type}";

/// A vendor endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SmsApi {
    pub id: String,
    pub name: String,
    pub vendor_name: Option<String>,
    /// GET template with `{phone_number}`, `{message}` and optionally
    /// `{text_type}` placeholders.
    pub url: String,
    pub priority: i64,
    pub is_deletable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SmsApi {
    pub fn ensure_deletable(&self) -> CoreResult<()> {
        if self.is_deletable {
            Ok(())
        } else {
            Err(CoreError::NotDeletable {
                entity: "SMS API".to_string(),
                name: self.name.clone(),
            })
        }
    }
}

/// Validates a new gateway's name and URL template.
pub fn validate_api(name: &str, url: &str) -> CoreResult<()> {
    validate_name("name", name)?;
    if !url.contains(PHONE_PLACEHOLDER) || !url.contains(MESSAGE_PLACEHOLDER) {
        return Err(crate::error::ValidationError::InvalidFormat {
            field: "url".to_string(),
            reason: format!("must contain {} and {}", PHONE_PLACEHOLDER, MESSAGE_PLACEHOLDER),
        }
        .into());
    }
    Ok(())
}

/// A gateway assigned to a reseller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Assignment {
    pub id: String,
    /// Reseller the gateway is assigned to.
    pub user_id: String,
    pub sms_api_id: String,
    pub priority: i64,
    pub is_active: bool,
    /// Load-balanced with the reseller's other shared assignments.
    pub is_shared: bool,
    pub share_percentage: i64,
}

/// A shared assignment is eligible when its gateway has sent no more
/// messages than the least-used shared gateway of the same reseller.
/// Unshared assignments are always eligible, and so is everything before
/// the first message has gone out.
pub fn is_eligible(assignment: &Assignment, shared: &[&Assignment], send_counts: &HashMap<String, i64>) -> bool {
    if !assignment.is_shared || send_counts.values().all(|c| *c == 0) {
        return true;
    }

    let count_of = |a: &Assignment| send_counts.get(&a.sms_api_id).copied().unwrap_or(0);
    let min = shared.iter().map(|a| count_of(*a)).min().unwrap_or(0);
    count_of(assignment) <= min
}

/// Orders the gateways a client of this reseller will try.
///
/// `assignments` are the reseller's assignments (active or not), `apis`
/// every known gateway and `send_counts` the number of messages each gateway
/// id has sent.
pub fn select_gateways(
    assignments: &[Assignment],
    apis: &[SmsApi],
    send_counts: &HashMap<String, i64>,
) -> Vec<SmsApi> {
    let mut active: Vec<&Assignment> = assignments.iter().filter(|a| a.is_active).collect();

    if active.is_empty() {
        let mut all = apis.to_vec();
        all.sort_by_key(|api| api.priority);
        return all;
    }

    active.sort_by_key(|a| a.priority);
    let shared: Vec<&Assignment> = active.iter().copied().filter(|a| a.is_shared).collect();

    let (eligible, deferred): (Vec<&Assignment>, Vec<&Assignment>) = active
        .iter()
        .copied()
        .partition(|a| is_eligible(*a, &shared, send_counts));

    eligible
        .into_iter()
        .chain(deferred)
        .filter_map(|a| apis.iter().find(|api| api.id == a.sms_api_id).cloned())
        .collect()
}

/// Fills a gateway template for one receiver.
///
/// The message is form-url-encoded, so spaces become `+`.
///
/// ## Example
/// ```rust
/// use bazaar_core::sms::gateway::render_url;
///
/// let url = render_url(
///     "https://gw/send?type={text_type}&to={phone_number}&msg={message}",
///     "01711000000",
///     "Hi there & bye",
/// );
/// assert_eq!(url, "https://gw/send?type=text&to=01711000000&msg=Hi+there+%26+bye");
/// ```
pub fn render_url(template: &str, phone: &str, message: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    template
        .replace(TEXT_TYPE_PLACEHOLDER, MessageType::detect(message).as_str())
        .replace(PHONE_PLACEHOLDER, phone)
        .replace(MESSAGE_PLACEHOLDER, &encoded)
}
