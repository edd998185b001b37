//! # Error Types
//!
//! Domain-specific error types for shopkit-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shopkit-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  shopkit-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                         (wraps CoreError for workflow failures)        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → host application        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// All of these are local validation failures surfaced synchronously to the
/// caller. Nothing here is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Requested quantity exceeds what the stock ledger can cover.
    ///
    /// ## When This Occurs
    /// - `reserve(qty)` with `qty > available`
    /// - `reduce(qty)` with `qty > on_hand`
    /// - Placing an order for more units than are available
    ///
    /// `available` is the figure the failed check compared against
    /// (available units for reservations, on-hand units for reductions).
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Coupon is invalid, expired, exhausted, or the amount is below the
    /// minimum purchase.
    #[error("Discount {code} not applicable: {reason}")]
    DiscountNotApplicable { code: String, reason: String },

    /// The aggregated order total would be negative.
    #[error("Invalid order total: {total}")]
    InvalidTotal { total: Money },

    /// A monetary or stock computation overflowed `i64`.
    #[error("Arithmetic overflow while computing {context}")]
    ArithmeticOverflow { context: String },

    /// A variant attribute does not match the attribute registry.
    #[error("Invalid attribute {code}: {reason}")]
    InvalidAttribute { code: String, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a DiscountNotApplicable error.
    pub fn not_applicable(code: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::DiscountNotApplicable {
            code: code.into(),
            reason: reason.into(),
        }
    }

    /// Creates an ArithmeticOverflow error.
    pub fn overflow(context: impl Into<String>) -> Self {
        CoreError::ArithmeticOverflow {
            context: context.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet field requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
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

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., the same SKU twice in one submission).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    /// Creates a MustBePositive error for a field.
    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
