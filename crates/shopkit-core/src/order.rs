//! # Order Aggregation
//!
//! Turns price snapshots, a coupon and checkout settings into order totals.
//!
//! ## Aggregation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lines ──► Σ line_total ──────────────────────────► subtotal            │
//! │                                                        │                │
//! │  coupon ──► calculate_discount(subtotal) ────────────► discount         │
//! │                                                        │                │
//! │  tax_rate × (subtotal - discount) ───────────────────► tax              │
//! │                                                        │                │
//! │  flat rate, waived at free_shipping_threshold ───────► shipping         │
//! │                                                        │                │
//! │  total = subtotal + tax + shipping - discount   (rejected if < 0)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::discount::DiscountPolicy;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, Rate};
use crate::pricing::PriceSnapshot;
use crate::stock::StockLedger;
use crate::validation::{validate_amount_cents, validate_percentage};

// =============================================================================
// Totals
// =============================================================================

/// Money breakdown of an order.
///
/// Invariant: `total = subtotal + tax + shipping - discount` and `total ≥ 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
}

/// Sums line totals and applies tax, shipping and discount.
///
/// A result below zero is rejected with `InvalidTotal`; nothing is clamped.
///
/// ## Example
/// ```rust
/// use shopkit_core::money::Money;
/// use shopkit_core::order::calculate_total;
///
/// let totals = calculate_total(
///     &[Money::from_cents(5997)],
///     Money::from_cents(500),
///     Money::from_cents(1000),
///     Money::from_cents(500),
/// )
/// .unwrap();
/// assert_eq!(totals.total, Money::from_cents(6997));
/// ```
pub fn calculate_total(
    line_totals: &[Money],
    tax: Money,
    shipping: Money,
    discount: Money,
) -> CoreResult<OrderTotals> {
    validate_amount_cents("tax", tax.cents())?;
    validate_amount_cents("shipping", shipping.cents())?;
    validate_amount_cents("discount", discount.cents())?;

    let subtotal = line_totals
        .iter()
        .try_fold(Money::zero(), |acc, line| acc.checked_add(*line))
        .ok_or_else(|| CoreError::overflow("subtotal"))?;

    let total = subtotal
        .checked_add(tax)
        .and_then(|m| m.checked_add(shipping))
        .and_then(|m| m.checked_sub(discount))
        .ok_or_else(|| CoreError::overflow("order total"))?;

    if total.is_negative() {
        return Err(CoreError::InvalidTotal { total });
    }

    Ok(OrderTotals {
        subtotal,
        tax,
        shipping,
        discount,
        total,
    })
}

// =============================================================================
// Fulfillability
// =============================================================================

/// One line's demand against a stock ledger.
#[derive(Debug, Clone, Copy)]
pub struct StockRequest<'a> {
    pub ledger: &'a StockLedger,
    pub quantity: i64,
}

/// Confirms every line can be covered by available stock.
///
/// Quantities for the same SKU are summed first, so two lines of 3 against
/// 5 available fail even though each line alone would fit.
pub fn ensure_fulfillable(requests: &[StockRequest<'_>]) -> CoreResult<()> {
    let mut demand: BTreeMap<&str, (i64, &StockLedger)> = BTreeMap::new();

    for request in requests {
        let entry = demand
            .entry(request.ledger.sku())
            .or_insert((0, request.ledger));
        entry.0 = entry
            .0
            .checked_add(request.quantity)
            .ok_or_else(|| CoreError::overflow("requested quantity"))?;
    }

    for (sku, (requested, ledger)) in demand {
        if !ledger.can_fulfill(requested) {
            return Err(CoreError::InsufficientStock {
                sku: sku.to_string(),
                available: ledger.available(),
                requested,
            });
        }
    }

    Ok(())
}

// =============================================================================
// Checkout Settings
// =============================================================================

/// Store-wide pricing knobs applied at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSettings {
    pub tax_rate: Rate,
    pub flat_shipping: Money,
    /// Subtotal at or above which shipping is free. `None` = never free.
    pub free_shipping_threshold: Option<Money>,
}

impl CheckoutSettings {
    pub fn validate(&self) -> CoreResult<()> {
        validate_percentage("tax_rate", self.tax_rate)?;
        validate_amount_cents("flat_shipping", self.flat_shipping.cents())?;
        if let Some(threshold) = self.free_shipping_threshold {
            validate_amount_cents("free_shipping_threshold", threshold.cents())?;
        }
        Ok(())
    }

    /// Shipping charged for a given subtotal.
    pub fn shipping_for(&self, subtotal: Money) -> Money {
        match self.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Money::zero(),
            _ => self.flat_shipping,
        }
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings {
            tax_rate: Rate::zero(),
            flat_shipping: Money::zero(),
            free_shipping_threshold: None,
        }
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// A coupon being applied by a specific customer.
#[derive(Debug, Clone, Copy)]
pub struct AppliedCoupon<'a> {
    pub policy: &'a DiscountPolicy,
    /// How many times this customer already redeemed the coupon.
    pub customer_uses: i64,
}

/// Prices a whole order.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderAggregator {
    settings: CheckoutSettings,
}

impl OrderAggregator {
    pub fn new(settings: CheckoutSettings) -> Self {
        OrderAggregator { settings }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    /// Computes totals for `lines`, applying `coupon` if given.
    ///
    /// ## Errors
    /// - `Validation` for invalid settings, an empty order or invalid lines
    /// - `DiscountNotApplicable` from the coupon
    /// - `InvalidTotal` if the result would be negative
    pub fn price(
        &self,
        lines: &[PriceSnapshot],
        coupon: Option<AppliedCoupon<'_>>,
        now: DateTime<Utc>,
    ) -> CoreResult<OrderTotals> {
        // A tax rate above 100% could push tax past i64
        self.settings.validate()?;

        if lines.is_empty() {
            return Err(ValidationError::Required {
                field: "lines".to_string(),
            }
            .into());
        }

        let line_totals = lines
            .iter()
            .map(PriceSnapshot::line_total)
            .collect::<CoreResult<Vec<_>>>()?;

        let subtotal = line_totals
            .iter()
            .try_fold(Money::zero(), |acc, line| acc.checked_add(*line))
            .ok_or_else(|| CoreError::overflow("subtotal"))?;

        let discount = match coupon {
            Some(applied) => applied.policy.calculate_discount_for_customer(
                subtotal,
                now,
                applied.customer_uses,
            )?,
            None => Money::zero(),
        };

        let tax = (subtotal - discount).percentage_of(self.settings.tax_rate);
        let shipping = self.settings.shipping_for(subtotal);

        calculate_total(&line_totals, tax, shipping, discount)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
