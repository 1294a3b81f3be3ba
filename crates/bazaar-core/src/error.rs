//! # Error Types
//!
//! Domain-specific error types for bazaar-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bazaar-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  bazaar-db errors                                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  bazaar-sms errors                                                      │
//! │  └── SmsError         - Dispatch, vendor and config failures           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SmsError → API reply    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Display strings are shown to operators as-is, so they read like the
/// messages of the back office UI.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A primary group flagged as system-owned was targeted for deletion.
    #[error("Primary group is not deletable!")]
    PrimaryGroupNotDeletable,

    /// A ledger, gateway or other protected record was targeted for deletion.
    #[error("{entity} '{name}' is not deletable")]
    NotDeletable { entity: String, name: String },

    /// A group or ledger was created without any parent.
    #[error("Must provide either head group or head primary group")]
    MissingHead,

    /// A group or ledger was created with both parents.
    #[error("Must provide either head group or head primary group, but not both")]
    AmbiguousHead,

    /// A stock decrease exceeds the quantity on hand.
    ///
    /// ## When This Occurs
    /// - Adjustment of type `decrease` larger than current stock
    #[error("Cannot decrease stock by {requested}. Current stock is only {available}.")]
    StockDecreaseTooLarge { requested: i64, available: i64 },

    /// Insufficient stock to complete a sale.
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// A return tries to send back more units than the source document holds.
    #[error("Cannot return {requested} of {product}: only {returnable} returnable")]
    ReturnQuantityExceeded {
        product: String,
        returnable: i64,
        requested: i64,
    },

    /// A return refund is larger than the source document's outstanding due.
    #[error("Refund amount cannot exceed the due amount ({due})")]
    RefundExceedsDue { due: String },

    /// Paid amount is larger than the document total.
    #[error("Paid amount {paid} exceeds total {total}")]
    OverPayment { paid: String, total: String },

    /// A document is not in a state that allows the requested operation.
    #[error("{document} is {status}, cannot {action}")]
    InvalidStatus {
        document: String,
        status: String,
        action: String,
    },

    /// Client or reseller wallet cannot cover the message parts.
    #[error("You do not have enough balance to send {parts} messages.")]
    LowBalance { parts: i64 },

    /// A reseller tried to recharge a client with more than they hold.
    #[error("Insufficient {slot}: available {available}, requested {requested}")]
    InsufficientBalance {
        slot: String,
        available: i64,
        requested: i64,
    },

    /// Client's balance validity date has passed.
    #[error("Balance validity expired on {0}")]
    BalanceExpired(String),

    /// The client has no package, region or reseller configured.
    #[error("SMS account is not configured: {0}")]
    AccountNotConfigured(String),

    /// A vendor reply could not be understood.
    #[error("Unexpected vendor response: {0}")]
    VendorResponse(String),

    /// Posting set is not balanced (debits differ from credits).
    #[error("Journal entry is not balanced: debit {debit}, credit {credit}")]
    UnbalancedEntry { debit: String, credit: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Arithmetic on the value left the representable range.
    #[error("{field} is too large")]
    TooLarge { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    Negative { field: String },

    /// Invalid format (e.g., invalid phone number, invalid amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value among non-deleted rows.
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Due date earlier than the document date.
    #[error("Due date cannot be before the {document} date")]
    DueBeforeDate { document: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
