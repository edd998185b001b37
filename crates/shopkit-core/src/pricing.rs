//! # Price Snapshots
//!
//! Line pricing frozen at order time.
//!
//! ## Snapshot Pattern
//! SKU, name and unit price are copied from the variant when the order is
//! placed. Later catalog edits (price changes, renames, deleting the
//! variant) never change a placed order.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

/// Computes `quantity × unit_price`.
///
/// No rounding happens: both operands are exact integers.
///
/// ## Errors
/// - `Validation` for a non-positive quantity or a negative price
/// - `ArithmeticOverflow` if the product does not fit in `i64` cents
///
/// ## Example
/// ```rust
/// use shopkit_core::money::Money;
/// use shopkit_core::pricing::line_total;
///
/// let total = line_total(3, Money::from_cents(1999)).unwrap();
/// assert_eq!(total, Money::from_cents(5997)); // $59.97
/// ```
pub fn line_total(quantity: i64, unit_price: Money) -> CoreResult<Money> {
    if quantity <= 0 {
        return Err(ValidationError::must_be_positive("quantity").into());
    }

    if unit_price.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: i64::MAX,
        }
        .into());
    }

    unit_price
        .checked_mul_quantity(quantity)
        .ok_or_else(|| CoreError::overflow("line total"))
}

/// A frozen order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Variant the line was created from. `None` once the variant is deleted.
    pub variant_id: Option<String>,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

impl PriceSnapshot {
    /// Captures a line, validating quantity and price up front.
    pub fn capture(
        variant_id: Option<String>,
        sku: impl Into<String>,
        name: impl Into<String>,
        unit_price: Money,
        quantity: i64,
    ) -> CoreResult<Self> {
        // Validates both operands before the snapshot exists
        line_total(quantity, unit_price)?;

        Ok(PriceSnapshot {
            variant_id,
            sku: sku.into(),
            name: name.into(),
            unit_price,
            quantity,
        })
    }

    /// Line total derived from the frozen values.
    pub fn line_total(&self) -> CoreResult<Money> {
        line_total(self.quantity, self.unit_price)
    }
}
