//! # Stock Ledger
//!
//! On-hand vs. reserved bookkeeping for one sellable unit (a variant).
//!
//! ## Counters
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  on_hand   ████████████████████████████████  (physically in stock)      │
//! │  reserved  ███████████                       (held for open orders)     │
//! │  available            █████████████████████  = on_hand - reserved       │
//! │                                                                         │
//! │  reserve(n)  : reserved += n            (fails if n > available)        │
//! │  release(n)  : reserved -= min(n, reserved)                             │
//! │  reduce(n)   : on_hand -= n, reserved -= min(n, reserved)               │
//! │                                          (fails if n > on_hand)         │
//! │  restock(n)  : on_hand += n                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invariant: `0 ≤ reserved ≤ on_hand`. Every operation either succeeds and
//! keeps the invariant or fails and leaves the ledger untouched.
//!
//! Concurrent mutation of the same unit is the storage layer's problem; the
//! ledger is a plain value.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::validation::validate_stock_level;

/// Stock counters for one SKU.
///
/// ## Example
/// ```rust
/// use shopkit_core::stock::StockLedger;
///
/// let mut ledger = StockLedger::new("TSHIRT-RED-M", 10, 0, 2).unwrap();
/// ledger.reserve(4).unwrap();
/// assert_eq!(ledger.available(), 6);
///
/// ledger.reduce(4).unwrap(); // fulfillment consumes the reservation
/// assert_eq!(ledger.on_hand(), 6);
/// assert_eq!(ledger.reserved(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedger {
    sku: String,
    on_hand: i64,
    reserved: i64,
    reorder_threshold: i64,
}

impl StockLedger {
    /// Creates a ledger, validating all counters.
    pub fn new(
        sku: impl Into<String>,
        on_hand: i64,
        reserved: i64,
        reorder_threshold: i64,
    ) -> CoreResult<Self> {
        validate_stock_level("on_hand", on_hand)?;
        validate_stock_level("reserved", reserved)?;
        validate_stock_level("reorder_threshold", reorder_threshold)?;

        if reserved > on_hand {
            return Err(ValidationError::OutOfRange {
                field: "reserved".to_string(),
                min: 0,
                max: on_hand,
            }
            .into());
        }

        Ok(StockLedger {
            sku: sku.into(),
            on_hand,
            reserved,
            reorder_threshold,
        })
    }

    /// SKU this ledger tracks.
    pub fn sku(&self) -> &str {
        &self.sku
    }

    #[inline]
    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    #[inline]
    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    #[inline]
    pub fn reorder_threshold(&self) -> i64 {
        self.reorder_threshold
    }

    /// Units that can still be reserved.
    #[inline]
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    /// True when on-hand stock is at or below the reorder threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.on_hand <= self.reorder_threshold
    }

    /// Whether `qty` more units could be reserved right now.
    #[inline]
    pub fn can_fulfill(&self, qty: i64) -> bool {
        qty <= self.available()
    }

    /// Places a hold on `qty` units.
    ///
    /// ## Errors
    /// - `InsufficientStock` when `qty > available`
    /// - `Validation` when `qty` is negative
    ///
    /// No dedup key: reserving twice holds twice.
    pub fn reserve(&mut self, qty: i64) -> CoreResult<()> {
        validate_stock_level("quantity", qty)?;

        if qty > self.available() {
            return Err(CoreError::InsufficientStock {
                sku: self.sku.clone(),
                available: self.available(),
                requested: qty,
            });
        }

        self.reserved += qty;
        Ok(())
    }

    /// Releases up to `qty` reserved units. Returns how many were released.
    pub fn release(&mut self, qty: i64) -> CoreResult<i64> {
        validate_stock_level("quantity", qty)?;

        let released = qty.min(self.reserved);
        self.reserved -= released;
        Ok(released)
    }

    /// Removes `qty` units from stock, consuming up to `qty` reserved units.
    ///
    /// Models fulfillment of an order that previously reserved its stock.
    ///
    /// ## Errors
    /// - `InsufficientStock` when `qty > on_hand`
    pub fn reduce(&mut self, qty: i64) -> CoreResult<()> {
        validate_stock_level("quantity", qty)?;

        if qty > self.on_hand {
            return Err(CoreError::InsufficientStock {
                sku: self.sku.clone(),
                available: self.on_hand,
                requested: qty,
            });
        }

        self.on_hand -= qty;
        self.reserved -= qty.min(self.reserved);
        Ok(())
    }

    /// Adds received units to on-hand stock.
    pub fn restock(&mut self, qty: i64) -> CoreResult<()> {
        validate_stock_level("quantity", qty)?;

        self.on_hand = self
            .on_hand
            .checked_add(qty)
            .ok_or_else(|| CoreError::overflow("on_hand"))?;
        Ok(())
    }

    /// Overwrites on-hand stock after a physical count.
    ///
    /// Fails if the new level would drop below what is already reserved.
    pub fn set_on_hand(&mut self, on_hand: i64) -> CoreResult<()> {
        validate_stock_level("on_hand", on_hand)?;

        if on_hand < self.reserved {
            return Err(CoreError::InsufficientStock {
                sku: self.sku.clone(),
                available: on_hand,
                requested: self.reserved,
            });
        }

        self.on_hand = on_hand;
        Ok(())
    }

    /// Changes the low-stock threshold.
    pub fn set_reorder_threshold(&mut self, threshold: i64) -> CoreResult<()> {
        validate_stock_level("reorder_threshold", threshold)?;
        self.reorder_threshold = threshold;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(on_hand: i64, reserved: i64) -> StockLedger {
        StockLedger::new("TSHIRT-RED-M", on_hand, reserved, 3).unwrap()
    }

    #[test]
    fn test_new_validates_counters() {
        assert!(StockLedger::new("A", 5, 5, 0).is_ok());
        assert!(StockLedger::new("A", 5, 6, 0).is_err());
        assert!(StockLedger::new("A", -1, 0, 0).is_err());
        assert!(StockLedger::new("A", 5, -1, 0).is_err());
        assert!(StockLedger::new("A", 5, 0, -1).is_err());
    }

    #[test]
    fn test_derived_values() {
        let l = ledger(10, 4);
        assert_eq!(l.available(), 6);
        assert!(!l.is_low_stock());
        assert!(l.can_fulfill(6));
        assert!(!l.can_fulfill(7));

        // on_hand equal to the threshold counts as low
        assert!(ledger(3, 0).is_low_stock());
    }

    #[test]
    fn test_reserve_then_release_restores_reserved() {
        for qty in 0..=6 {
            let mut l = ledger(10, 4);
            l.reserve(qty).unwrap();
            assert_eq!(l.reserved(), 4 + qty);
            assert_eq!(l.release(qty).unwrap(), qty);
            assert_eq!(l.reserved(), 4);
        }
    }

    #[test]
    fn test_reserve_over_available_fails_and_leaves_state() {
        let mut l = ledger(10, 4);
        let before = l.clone();

        let err = l.reserve(7).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                sku: "TSHIRT-RED-M".to_string(),
                available: 6,
                requested: 7,
            }
        );
        assert_eq!(l, before);
    }

    #[test]
    fn test_release_is_clamped() {
        let mut l = ledger(10, 2);
        assert_eq!(l.release(5).unwrap(), 2);
        assert_eq!(l.reserved(), 0);
        assert_eq!(l.release(1).unwrap(), 0);
        assert_eq!(l.reserved(), 0);
    }

    #[test]
    fn test_reduce_consumes_reservation() {
        let mut l = ledger(10, 4);
        l.reduce(4).unwrap();
        assert_eq!(l.on_hand(), 6);
        assert_eq!(l.reserved(), 0);

        // Reducing more than reserved clamps reserved at zero
        let mut l = ledger(10, 2);
        l.reduce(5).unwrap();
        assert_eq!(l.on_hand(), 5);
        assert_eq!(l.reserved(), 0);
    }

    #[test]
    fn test_reduce_over_on_hand_fails() {
        let mut l = ledger(3, 1);
        let before = l.clone();
        assert!(matches!(
            l.reduce(4),
            Err(CoreError::InsufficientStock { available: 3, requested: 4, .. })
        ));
        assert_eq!(l, before);
    }

    #[test]
    fn test_negative_quantities_rejected() {
        let mut l = ledger(10, 4);
        assert!(matches!(l.reserve(-1), Err(CoreError::Validation(_))));
        assert!(matches!(l.release(-1), Err(CoreError::Validation(_))));
        assert!(matches!(l.reduce(-1), Err(CoreError::Validation(_))));
        assert!(matches!(l.restock(-1), Err(CoreError::Validation(_))));
        assert_eq!(l, ledger(10, 4));
    }

    #[test]
    fn test_restock_and_counts() {
        let mut l = ledger(2, 1);
        l.restock(8).unwrap();
        assert_eq!(l.on_hand(), 10);

        assert!(l.set_on_hand(0).is_err());
        l.set_on_hand(1).unwrap();
        assert_eq!(l.available(), 0);

        l.set_reorder_threshold(0).unwrap();
        assert!(!l.is_low_stock());
        assert!(l.set_reorder_threshold(-5).is_err());
    }
}
