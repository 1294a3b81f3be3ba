//! # SMS Billing
//!
//! Pure rules of the SMS side of the back office.
//!
//! ## Send Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  message + receivers ──► MessageQuote (parts × receivers)   [message]   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  client & reseller wallets ──► deduct / low balance         [balance]   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  one PENDING SingleSms per receiver                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  assignments ──► ordered gateways ──► rendered URL          [gateway]   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  vendor reply ──► Sent | Failed(reason)                     [vendor]    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  undelivered parts ──► refund                               [balance]   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! I/O (HTTP calls, retries, timers) lives in `bazaar-sms`.

pub mod balance;
pub mod contact;
pub mod gateway;
pub mod message;
pub mod vendor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SmsStatus {
    Pending,
    Failed,
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SmsType {
    Incoming,
    Outgoing,
}

/// Channel a message was submitted through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum GatewayType {
    /// Developer HTTP API.
    Https,
    /// Web panel.
    Panel,
}

/// One message to one receiver.
///
/// `sms_api_id` stays empty until a gateway delivers the message, so an
/// undelivered original is recognisable by `sms_api_id IS NULL AND NOT
/// is_sent`. Failure copies carry the gateway that failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SingleSms {
    pub id: String,
    pub sender_id: String,
    pub sender_ip_address: Option<String>,
    pub msg_part_count: i64,
    pub sms_api_id: Option<String>,
    pub receiver: String,
    pub message: String,
    pub status: SmsStatus,
    pub sms_type: SmsType,
    pub gateway_type: GatewayType,
    pub is_sent: bool,
    pub failure_reason: Option<String>,
    /// Send request the message was created by. Failure copies have none.
    pub batch_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for one pending message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingSms {
    pub receiver: String,
    pub message: String,
    pub msg_part_count: i64,
}

/// API key a developer uses to send through the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DeveloperApi {
    pub id: String,
    pub user_id: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}
