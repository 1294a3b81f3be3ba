//! # Validation Module
//!
//! Input validation and name normalization shared by every record type.
//!
//! ## Normalization Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Input                         Normalized                               │
//! │  ─────────────────────────     ─────────────────────────                │
//! │  "cash in HAND"  (ledger)  ──► "Cash In Hand"       title_case          │
//! │  "Bank Account"  (type)    ──► "bank_account"       normalize_ledger_type│
//! │  "Red Shirt XL"  (product) ──► "red-shirt-xl"       slugify             │
//! │  "red-shirt-xl" taken      ──► "red-shirt-xl-1"     unique_slug         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::{Money, FULL_BPS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of any display name.
pub const MAX_NAME_LEN: usize = 255;

// =============================================================================
// Normalizers
// =============================================================================

/// Capitalizes the first letter of every whitespace-separated word and
/// lower-cases the rest. Runs of whitespace collapse to a single space.
///
/// ## Example
/// ```rust
/// use bazaar_core::validation::title_case;
///
/// assert_eq!(title_case("  cash in HAND "), "Cash In Hand");
/// ```
pub fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalizes a ledger type key: trim, spaces to `_`, lower-case.
pub fn normalize_ledger_type(raw: &str) -> String {
    raw.trim().replace(' ', "_").to_lowercase()
}

/// Builds a URL-safe slug from a name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;

    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Returns `base` if free, otherwise the first `base-N` (N = 1, 2, ...) that
/// `is_taken` rejects.
pub fn unique_slug(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (ledger, group, customer, product).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a SKU: 1-50 characters of letters, digits, `-` and `_`.
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a receiver phone number: digits with an optional leading `+`,
/// 6 to 15 digits long.
pub fn validate_phone_number(phone: &str) -> ValidationResult<()> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);

    if digits.is_empty() {
        return Err(ValidationError::Required {
            field: "phone".to_string(),
        });
    }

    if !digits.chars().all(|c| c.is_ascii_digit()) || !(6..=15).contains(&digits.len()) {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: format!("'{}' is not a valid phone number", phone),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Line quantity must be positive.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Unit price may be zero (free items) but never negative.
pub fn validate_unit_price(price: Money) -> ValidationResult<()> {
    validate_non_negative("unit_price", price)
}

/// Any stored amount that must not be negative.
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Discount percentage in basis points: 0 (0%) to 10000 (100%).
pub fn validate_discount_percent(bps: i64) -> ValidationResult<()> {
    if !(0..=FULL_BPS).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: "discount_percentage".to_string(),
            min: 0,
            max: 100,
        });
    }
    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// The due date, when set, cannot precede the document date.
pub fn validate_due_date(
    document: &str,
    date: NaiveDate,
    due: Option<NaiveDate>,
) -> ValidationResult<()> {
    match due {
        Some(due) if due < date => Err(ValidationError::DueBeforeDate {
            document: document.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("cash in hand"), "Cash In Hand");
        assert_eq!(title_case("BANK   accounts"), "Bank Accounts");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_normalize_ledger_type() {
        assert_eq!(normalize_ledger_type(" Bank Account "), "bank_account");
        assert_eq!(normalize_ledger_type("customer"), "customer");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Red Shirt (XL)"), "red-shirt-xl");
        assert_eq!(slugify("  --Tea--  "), "tea");
    }

    #[test]
    fn test_unique_slug() {
        let taken = ["tea", "tea-1"];
        assert_eq!(unique_slug("tea", |s| taken.contains(&s)), "tea-2");
        assert_eq!(unique_slug("coffee", |s| taken.contains(&s)), "coffee");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Cash").is_ok());
        assert!(validate_name("name", "   ").is_err());
        assert!(validate_name("name", &"x".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("TEA-250G").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("has space").is_err());
    }

    #[test]
    fn test_validate_phone_number() {
        assert!(validate_phone_number("01712345678").is_ok());
        assert!(validate_phone_number("+8801712345678").is_ok());
        assert!(validate_phone_number("01712-345").is_err());
        assert!(validate_phone_number("+").is_err());
        assert!(validate_phone_number("123").is_err());
    }

    #[test]
    fn test_numeric_validators() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_unit_price(Money::zero()).is_ok());
        assert!(validate_unit_price(Money::from_minor(-1)).is_err());
        assert!(validate_discount_percent(0).is_ok());
        assert!(validate_discount_percent(10_000).is_ok());
        assert!(validate_discount_percent(10_001).is_err());
        assert!(validate_discount_percent(-1).is_err());
    }

    #[test]
    fn test_validate_due_date() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let before = NaiveDate::from_ymd_opt(2024, 5, 9).unwrap();
        assert!(validate_due_date("sale", date, None).is_ok());
        assert!(validate_due_date("sale", date, Some(date)).is_ok());
        assert!(validate_due_date("sale", date, Some(before)).is_err());
    }
}
