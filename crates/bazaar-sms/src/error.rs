//! # SMS Engine Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SMS Error Categories                              │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Vendor              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  RequestFailed  │  │  Rejected               │ │
//! │  │  ConfigLoad/Save│  │  Timeout        │  │  NoGateway              │ │
//! │  │  InvalidUrl     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Balance/Rules  │  │    Database     │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Rule(CoreError)│  │  Database       │  │  ShuttingDown           │ │
//! │  │  LowBalance ... │  │  (DbError)      │  │  ChannelError           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bazaar_core::{CoreError, ValidationError};
use bazaar_db::DbError;
use thiserror::Error;

pub type SmsResult<T> = Result<T, SmsError>;

#[derive(Debug, Error)]
pub enum SmsError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid SMS configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The gateway could not be reached or the body could not be read.
    #[error("Gateway request failed: {0}")]
    RequestFailed(String),

    #[error("Gateway request timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Vendor Errors
    // =========================================================================
    /// The gateway answered but did not accept the message.
    #[error("{gateway} rejected the message: {reason}")]
    Rejected { gateway: String, reason: String },

    #[error("No SMS gateway is available")]
    NoGateway,

    // =========================================================================
    // Balance and Business Rules
    // =========================================================================
    /// Low balance, expired validity, unconfigured accounts, bad input.
    #[error(transparent)]
    Rule(#[from] CoreError),

    // =========================================================================
    // Database Errors
    // =========================================================================
    #[error(transparent)]
    Database(DbError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("SMS engine is shutting down")]
    ShuttingDown,

    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

/// Rule failures raised inside a repository surface as `Rule`, so callers
/// match low balance the same way whichever layer refused.
impl From<DbError> for SmsError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Rule(rule) => SmsError::Rule(rule),
            other => SmsError::Database(other),
        }
    }
}

impl From<ValidationError> for SmsError {
    fn from(err: ValidationError) -> Self {
        SmsError::Rule(CoreError::from(err))
    }
}

impl From<reqwest::Error> for SmsError {
    fn from(err: reqwest::Error) -> Self {
        SmsError::RequestFailed(err.to_string())
    }
}

impl From<url::ParseError> for SmsError {
    fn from(err: url::ParseError) -> Self {
        SmsError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SmsError {
    fn from(err: std::io::Error) -> Self {
        SmsError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SmsError {
    fn from(err: toml::de::Error) -> Self {
        SmsError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SmsError {
    fn from(err: toml::ser::Error) -> Self {
        SmsError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SmsError {
    /// Whether another attempt on the same gateway may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SmsError::RequestFailed(_) | SmsError::Timeout(_) | SmsError::Rejected { .. }
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SmsError::InvalidConfig(_)
                | SmsError::InvalidUrl(_)
                | SmsError::ConfigLoadFailed(_)
                | SmsError::ConfigSaveFailed(_)
        )
    }

    /// The business rule behind this error, if any.
    pub fn rule(&self) -> Option<&CoreError> {
        match self {
            SmsError::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    /// Parts that could not be paid for, when the send was refused for
    /// low balance.
    pub fn low_balance_parts(&self) -> Option<i64> {
        match self.rule() {
            Some(CoreError::LowBalance { parts }) => Some(*parts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SmsError::RequestFailed("connection reset".into()).is_retryable());
        assert!(SmsError::Timeout(30).is_retryable());
        assert!(SmsError::Rejected {
            gateway: "Primary".into(),
            reason: "Invalid Number".into()
        }
        .is_retryable());

        assert!(!SmsError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SmsError::NoGateway.is_retryable());
        assert!(!SmsError::Rule(CoreError::LowBalance { parts: 3 }).is_retryable());
    }

    #[test]
    fn test_db_rule_errors_unwrap_into_rule() {
        let err: SmsError = DbError::Rule(CoreError::LowBalance { parts: 12 }).into();
        assert_eq!(err.low_balance_parts(), Some(12));
        assert_eq!(err.to_string(), "You do not have enough balance to send 12 messages.");

        let err: SmsError = DbError::not_found("SMS user", "u-1").into();
        assert!(matches!(err, SmsError::Database(_)));
        assert!(err.low_balance_parts().is_none());
    }

    #[test]
    fn test_config_errors() {
        assert!(SmsError::InvalidUrl("nope".into()).is_config_error());
        assert!(!SmsError::ShuttingDown.is_config_error());
    }
}
