//! # Validation Module
//!
//! Input validation utilities for shopkit records.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Host application (forms, request DTOs)                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - field rules, called by repositories            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE constraints (sku, slug, order number, coupon code)         │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use shopkit_core::validation::{validate_sku, validate_quantity};
//!
//! assert!(validate_sku("TSHIRT-RED-M").is_ok());
//! assert!(validate_quantity(5).is_ok());
//! ```

use crate::error::ValidationError;
use crate::money::Rate;
use crate::MAX_LINE_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn validate_code_like(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Only ASCII letters, digits, hyphens, underscores
///
/// ## Example
/// ```rust
/// use shopkit_core::validation::validate_sku;
///
/// assert!(validate_sku("TSHIRT-RED-M").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    validate_code_like("sku", sku, 64)
}

/// Validates a coupon code. Same character rules as SKUs, at most 50 chars.
pub fn validate_coupon_code(code: &str) -> ValidationResult<()> {
    validate_code_like("code", code, 50)
}

/// Validates an order number.
pub fn validate_order_number(number: &str) -> ValidationResult<()> {
    validate_code_like("order_number", number, 32)
}

/// Validates a display name (product, variant, category, attribute).
///
/// ## Rules
/// - Must not be empty
/// - At most 255 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 255 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 255,
        });
    }

    Ok(())
}

/// Validates a URL slug.
///
/// ## Rules
/// - Lowercase ASCII letters, digits and hyphens only
/// - Must not start or end with a hyphen
/// - At most 255 characters
///
/// ## Example
/// ```rust
/// use shopkit_core::validation::validate_slug;
///
/// assert!(validate_slug("summer-collection").is_ok());
/// assert!(validate_slug("Summer Collection").is_err());
/// ```
pub fn validate_slug(slug: &str) -> ValidationResult<()> {
    if slug.is_empty() {
        return Err(ValidationError::Required {
            field: "slug".to_string(),
        });
    }

    if slug.len() > 255 {
        return Err(ValidationError::TooLong {
            field: "slug".to_string(),
            max: 255,
        });
    }

    let valid_chars = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if !valid_chars || slug.starts_with('-') || slug.ends_with('-') {
        return Err(ValidationError::InvalidFormat {
            field: "slug".to_string(),
            reason: "must be lowercase letters, numbers and inner hyphens".to_string(),
        });
    }

    Ok(())
}

/// Builds a slug from a display name ("Summer Tee 2.0" → "summer-tee-2-0").
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Validates an email address (shape only, no deliverability).
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(ValidationError::Required {
            field: "email".to_string(),
        });
    }

    let invalid = || ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: "must look like name@domain.tld".to_string(),
    };

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }

    Ok(())
}

/// Validates a search query.
///
/// ## Returns
/// The trimmed query string.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stock counter (on hand, reserved, reorder threshold).
pub fn validate_stock_level(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates an amount in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items, free shipping)
///
/// ## Example
/// ```rust
/// use shopkit_core::validation::validate_amount_cents;
///
/// assert!(validate_amount_cents("price", 1999).is_ok());
/// assert!(validate_amount_cents("price", 0).is_ok());
/// assert!(validate_amount_cents("price", -100).is_err());
/// ```
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents (strictly positive).
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::must_be_positive("payment amount"));
    }

    Ok(())
}

/// Validates a percentage rate (0% to 100%).
pub fn validate_percentage(field: &str, rate: Rate) -> ValidationResult<()> {
    if !rate.is_percentage() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: Rate::FULL_BPS as i64,
        });
    }

    Ok(())
}

/// Validates an optional usage limit (must be positive when set).
pub fn validate_limit(field: &str, limit: Option<i64>) -> ValidationResult<()> {
    match limit {
        Some(value) if value <= 0 => Err(ValidationError::must_be_positive(field)),
        _ => Ok(()),
    }
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use shopkit_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("TSHIRT-RED-M").is_ok());
        assert!(validate_sku("ABC123").is_ok());
        assert!(validate_sku("variant_1").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_coupon_code() {
        assert!(validate_coupon_code("SAVE10").is_ok());
        assert!(validate_coupon_code("SAVE 10").is_err());
        assert!(validate_coupon_code(&"X".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Classic Tee").is_ok());
        assert!(validate_name("name", "").is_err());
        assert!(validate_name("name", &"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("classic-tee").is_ok());
        assert!(validate_slug("tee-2").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("-tee").is_err());
        assert!(validate_slug("tee-").is_err());
        assert!(validate_slug("Classic_Tee").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Summer Tee 2.0"), "summer-tee-2-0");
        assert_eq!(slugify("  Hoodies & Sweaters  "), "hoodies-sweaters");
        assert!(validate_slug(&slugify("Women's Shoes")).is_ok());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jane@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("jane").is_err());
        assert!(validate_email("jane@localhost").is_err());
        assert!(validate_email("jane@@example.com").is_err());
        assert!(validate_email("ja ne@example.com").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_amount_cents("price", 0).is_ok());
        assert!(validate_amount_cents("price", 1999).is_ok());
        assert!(validate_amount_cents("price", -100).is_err());

        assert!(validate_payment_amount(1).is_ok());
        assert!(validate_payment_amount(0).is_err());
    }

    #[test]
    fn test_validate_percentage() {
        assert!(validate_percentage("value", Rate::from_bps(0)).is_ok());
        assert!(validate_percentage("value", Rate::from_bps(10_000)).is_ok());
        assert!(validate_percentage("value", Rate::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_validate_limit() {
        assert!(validate_limit("usage_limit", None).is_ok());
        assert!(validate_limit("usage_limit", Some(5)).is_ok());
        assert!(validate_limit("usage_limit", Some(0)).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }
}
