//! # shopkit-core: Pure Business Logic for shopkit
//!
//! Entity types and the arithmetic that runs over them: stock bookkeeping,
//! price snapshots, coupon rules and order totals. Zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        shopkit Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Host application (storefront, admin UI, jobs)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    shopkit-db (Database Layer)                  │   │
//! │  │     SQLite schema, repositories, admin CRUD surface             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ shopkit-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   stock   │  │  pricing  │  │ discount  │  │   order   │  │   │
//! │  │   │StockLedger│  │ Snapshot  │  │  Policy   │  │ Aggregator│  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Persisted entities (Product, ProductVariant, Order, Coupon, ...)
//! - [`money`] - Money (integer cents) and Rate (basis points)
//! - [`stock`] - StockLedger: reserve / release / reduce
//! - [`pricing`] - Price snapshots and line totals
//! - [`discount`] - Coupon validation and discount computation
//! - [`order`] - Order totals and fulfillability checks
//! - [`attributes`] - Typed variant attributes and their registry
//! - [`error`] - Domain error types
//! - [`validation`] - Field validation
//!
//! ## Example Usage
//!
//! ```rust
//! use shopkit_core::money::Money;
//! use shopkit_core::order::calculate_total;
//! use shopkit_core::pricing::line_total;
//!
//! let line = line_total(3, Money::from_cents(1999)).unwrap();
//! let totals = calculate_total(
//!     &[line],
//!     Money::from_cents(500),
//!     Money::from_cents(1000),
//!     Money::from_cents(500),
//! )
//! .unwrap();
//!
//! assert_eq!(totals.total.to_string(), "$69.97");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod attributes;
pub mod discount;
pub mod error;
pub mod money;
pub mod order;
pub mod pricing;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use attributes::{AttributeDefinition, AttributeKind, AttributeMap, AttributeRegistry, AttributeValue};
pub use discount::{DiscountKind, DiscountPolicy};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Rate};
pub use order::{calculate_total, CheckoutSettings, OrderAggregator, OrderTotals};
pub use pricing::{line_total, PriceSnapshot};
pub use stock::StockLedger;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single line in one order.
///
/// Guards against typos (1000 instead of 10) at checkout.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum number of lines in one order.
pub const MAX_ORDER_LINES: usize = 100;
