//! # Discount Policy
//!
//! Coupon validation and discount computation.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Customer enters code "SAVE10"                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  is_valid(now)                                                         │
//! │       ├── inactive?                 → DiscountNotApplicable             │
//! │       ├── outside valid window?     → DiscountNotApplicable             │
//! │       ├── times_used ≥ usage_limit? → DiscountNotApplicable             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  amount < min_purchase?             → DiscountNotApplicable             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Percentage: amount × rate, capped at max_discount                      │
//! │  Fixed:      min(value, amount)                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage counters (`times_used`, per-customer redemptions) are tracked by
//! the storage layer; the policy only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, Rate};
use crate::validation::{validate_amount_cents, validate_coupon_code, validate_limit, validate_percentage};

/// How a coupon reduces the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum DiscountKind {
    /// Percentage of the amount, in basis points (1000 = 10%).
    Percentage(Rate),
    /// Flat amount off.
    Fixed(Money),
}

/// A coupon's rules, detached from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountPolicy {
    pub code: String,
    pub kind: DiscountKind,
    /// Upper bound for percentage discounts.
    pub max_discount: Option<Money>,
    pub min_purchase: Money,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: Option<i64>,
    pub per_customer_limit: Option<i64>,
    /// Redemptions so far across all customers.
    pub times_used: i64,
    pub is_active: bool,
}

impl DiscountPolicy {
    /// Creates an active, unlimited policy with no minimum purchase.
    pub fn new(
        code: impl Into<String>,
        kind: DiscountKind,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        DiscountPolicy {
            code: code.into(),
            kind,
            max_discount: None,
            min_purchase: Money::zero(),
            valid_from,
            valid_until,
            usage_limit: None,
            per_customer_limit: None,
            times_used: 0,
            is_active: true,
        }
    }

    /// Checks the policy's own fields for consistency.
    pub fn validate(&self) -> CoreResult<()> {
        validate_coupon_code(&self.code)?;

        match self.kind {
            DiscountKind::Percentage(rate) => validate_percentage("value", rate)?,
            DiscountKind::Fixed(value) => validate_amount_cents("value", value.cents())?,
        }

        if let Some(max) = self.max_discount {
            validate_amount_cents("max_discount", max.cents())?;
        }
        validate_amount_cents("min_purchase", self.min_purchase.cents())?;
        validate_limit("usage_limit", self.usage_limit)?;
        validate_limit("per_customer_limit", self.per_customer_limit)?;

        if self.valid_until < self.valid_from {
            return Err(ValidationError::InvalidFormat {
                field: "valid_until".to_string(),
                reason: "must not be before valid_from".to_string(),
            }
            .into());
        }

        Ok(())
    }

    fn invalid_reason(&self, now: DateTime<Utc>) -> Option<String> {
        if !self.is_active {
            return Some("coupon is inactive".to_string());
        }
        if now < self.valid_from {
            return Some("coupon is not yet valid".to_string());
        }
        if now > self.valid_until {
            return Some("coupon has expired".to_string());
        }
        match self.usage_limit {
            Some(limit) if self.times_used >= limit => {
                Some("coupon usage limit reached".to_string())
            }
            _ => None,
        }
    }

    /// True iff active, `valid_from ≤ now ≤ valid_until`, and the global
    /// usage limit (if any) has not been reached.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.invalid_reason(now).is_none()
    }

    /// [`is_valid`](Self::is_valid) plus the per-customer limit.
    pub fn is_valid_for_customer(&self, now: DateTime<Utc>, customer_uses: i64) -> bool {
        self.is_valid(now) && !self.customer_limit_reached(customer_uses)
    }

    fn customer_limit_reached(&self, customer_uses: i64) -> bool {
        matches!(self.per_customer_limit, Some(limit) if customer_uses >= limit)
    }

    /// Computes the discount for `amount`.
    ///
    /// ## Errors
    /// - `DiscountNotApplicable` when the policy is invalid at `now` or
    ///   `amount < min_purchase`
    /// - `Validation` when `amount` is negative
    ///
    /// ## Example
    /// ```rust
    /// use chrono::{Duration, Utc};
    /// use shopkit_core::discount::{DiscountKind, DiscountPolicy};
    /// use shopkit_core::money::{Money, Rate};
    ///
    /// let now = Utc::now();
    /// let mut policy = DiscountPolicy::new(
    ///     "SAVE10",
    ///     DiscountKind::Percentage(Rate::from_bps(1000)),
    ///     now - Duration::days(1),
    ///     now + Duration::days(1),
    /// );
    /// policy.max_discount = Some(Money::from_cents(500));
    ///
    /// // 10% of $100 is $10, clamped to $5
    /// let discount = policy.calculate_discount(Money::from_cents(10000), now).unwrap();
    /// assert_eq!(discount, Money::from_cents(500));
    /// ```
    pub fn calculate_discount(&self, amount: Money, now: DateTime<Utc>) -> CoreResult<Money> {
        validate_amount_cents("amount", amount.cents())?;

        if let Some(reason) = self.invalid_reason(now) {
            return Err(CoreError::not_applicable(&self.code, reason));
        }

        if amount < self.min_purchase {
            return Err(CoreError::not_applicable(
                &self.code,
                format!("minimum purchase of {} not met", self.min_purchase),
            ));
        }

        let discount = match self.kind {
            DiscountKind::Percentage(rate) => {
                let raw = amount.percentage_of(rate);
                match self.max_discount {
                    Some(max) => raw.min(max),
                    None => raw,
                }
            }
            DiscountKind::Fixed(value) => value.min(amount),
        };

        Ok(discount.min(amount))
    }

    /// [`calculate_discount`](Self::calculate_discount) for a customer who
    /// has already redeemed this coupon `customer_uses` times.
    pub fn calculate_discount_for_customer(
        &self,
        amount: Money,
        now: DateTime<Utc>,
        customer_uses: i64,
    ) -> CoreResult<Money> {
        if self.customer_limit_reached(customer_uses) {
            return Err(CoreError::not_applicable(
                &self.code,
                "per-customer usage limit reached",
            ));
        }

        self.calculate_discount(amount, now)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
