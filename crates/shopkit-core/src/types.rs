//! # Domain Types
//!
//! Persisted entity types used throughout shopkit.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Category ◄── Product ──► ProductImage                                  │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │            ProductVariant ──► Inventory (1:1)                           │
//! │              (sku)   ▲                                                  │
//! │                      │ nullable (SET NULL on delete)                    │
//! │  Coupon ◄── Order ──► OrderItem (snapshot sku/name/price)               │
//! │    ▲          │                                                         │
//! │    │          └─────► Payment (transaction_id)                          │
//! │  CouponRedemption                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, slug, order_number, code, transaction_id) -
//!   human-readable and unique

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::discount::{DiscountKind, DiscountPolicy};
use crate::error::{CoreResult, ValidationError};
use crate::money::{Money, Rate};
use crate::order::OrderTotals;
use crate::pricing::PriceSnapshot;
use crate::stock::StockLedger;

// =============================================================================
// Status Enums
// =============================================================================

macro_rules! str_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The stored (snake_case) representation.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ValidationError::NotAllowed {
                        field: stringify!($name).to_string(),
                        allowed: $name::ALL.iter().map(|v| v.as_str().to_string()).collect(),
                    }),
                }
            }
        }
    };
}

/// Publication state of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

str_enum!(ProductStatus {
    Draft => "draft",
    Active => "active",
    Archived => "archived",
});

/// Fulfillment state of an order. Set directly by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, stock reserved.
    #[default]
    Pending,
    Processing,
    /// Stock reduced, parcel on its way.
    Shipped,
    Delivered,
    /// Reservations released.
    Cancelled,
    Refunded,
}

str_enum!(OrderStatus {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl OrderStatus {
    /// Whether the order still holds stock reservations.
    pub const fn holds_reservation(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }
}

/// Payment state of an order or a single payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

str_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Paypal,
    BankTransfer,
    CashOnDelivery,
}

str_enum!(PaymentMethod {
    Card => "card",
    Paypal => "paypal",
    BankTransfer => "bank_transfer",
    CashOnDelivery => "cash_on_delivery",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `value` is in basis points (1000 = 10%).
    Percentage,
    /// `value` is in cents.
    Fixed,
}

str_enum!(DiscountType {
    Percentage => "percentage",
    Fixed => "fixed",
});

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product available for sale. Sellable units are its variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    /// Price used by variants without their own price.
    pub base_price_cents: i64,
    pub status: ProductStatus,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_cents(self.base_price_cents)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductImage {
    pub id: String,
    pub product_id: String,
    pub url: String,
    pub alt_text: Option<String>,
    /// Display order, ascending.
    pub position: i64,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// A purchasable variant of a product (e.g. "Classic Tee / Red / M").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    /// Stock Keeping Unit - unique business identifier.
    pub sku: String,
    pub name: String,
    /// Overrides the product's base price when set.
    pub price_cents: Option<i64>,
    /// "Was" price for display.
    pub compare_at_price_cents: Option<i64>,
    pub weight_grams: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductVariant {
    /// The variant's own price, falling back to the product's base price.
    pub fn effective_price(&self, product: &Product) -> Money {
        Money::from_cents(self.price_cents.unwrap_or(product.base_price_cents))
    }
}

/// Stock counters for one variant (one-to-one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Inventory {
    pub id: String,
    pub variant_id: String,
    pub on_hand: i64,
    pub reserved: i64,
    pub reorder_threshold: i64,
    pub updated_at: DateTime<Utc>,
}

impl Inventory {
    /// Builds the stock ledger for this row.
    pub fn ledger(&self, sku: impl Into<String>) -> CoreResult<StockLedger> {
        StockLedger::new(sku, self.on_hand, self.reserved, self.reorder_threshold)
    }

    #[inline]
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.on_hand <= self.reorder_threshold
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub customer_email: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub coupon_id: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn totals(&self) -> OrderTotals {
        OrderTotals {
            subtotal: Money::from_cents(self.subtotal_cents),
            tax: Money::from_cents(self.tax_cents),
            shipping: Money::from_cents(self.shipping_cents),
            discount: Money::from_cents(self.discount_cents),
            total: Money::from_cents(self.total_cents),
        }
    }
}

/// A line item. Uses the snapshot pattern to freeze variant data at order time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    /// `None` once the variant has been deleted.
    pub variant_id: Option<String>,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn snapshot(&self) -> PriceSnapshot {
        PriceSnapshot {
            variant_id: self.variant_id.clone(),
            sku: self.sku_snapshot.clone(),
            name: self.name_snapshot.clone(),
            unit_price: Money::from_cents(self.unit_price_cents),
            quantity: self.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    /// Processor reference, unique across payments.
    pub transaction_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Coupons
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Coupon {
    pub id: String,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Basis points for percentage coupons, cents for fixed ones.
    pub value: i64,
    pub max_discount_cents: Option<i64>,
    pub min_purchase_cents: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: Option<i64>,
    pub per_customer_limit: Option<i64>,
    pub times_used: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// The coupon's rules as a [`DiscountPolicy`], validated.
    pub fn policy(&self) -> CoreResult<DiscountPolicy> {
        let kind = match self.discount_type {
            DiscountType::Percentage => {
                let bps = u32::try_from(self.value).map_err(|_| ValidationError::OutOfRange {
                    field: "value".to_string(),
                    min: 0,
                    max: Rate::FULL_BPS as i64,
                })?;
                DiscountKind::Percentage(Rate::from_bps(bps))
            }
            DiscountType::Fixed => DiscountKind::Fixed(Money::from_cents(self.value)),
        };

        let policy = DiscountPolicy {
            code: self.code.clone(),
            kind,
            max_discount: self.max_discount_cents.map(Money::from_cents),
            min_purchase: Money::from_cents(self.min_purchase_cents),
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            usage_limit: self.usage_limit,
            per_customer_limit: self.per_customer_limit,
            times_used: self.times_used,
            is_active: self.is_active,
        };
        policy.validate()?;

        Ok(policy)
    }
}

/// One use of a coupon by one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CouponRedemption {
    pub id: String,
    pub coupon_id: String,
    pub order_id: String,
    pub customer_email: String,
    pub discount_cents: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
