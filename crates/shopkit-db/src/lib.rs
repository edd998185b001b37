//! # shopkit-db: Database Layer for shopkit
//!
//! SQLite schema, repositories and the admin CRUD surface for the shopkit
//! catalog, inventory, order and coupon data.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        shopkit Data Flow                                │
//! │                                                                         │
//! │  Host application (checkout handler, admin screen)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    shopkit-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ProductRepo   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo     │    │ 001_catalog  │  │   │
//! │  │   │ Connection    │    │ CouponRepo    │    │ 002_orders   │  │   │
//! │  │   │ Management    │    │ ...           │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ StockLedger, OrderAggregator   │   │
//! │  │                                ▼                                │   │
//! │  │                      shopkit-core (pure logic)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - `SHOPKIT_*` environment configuration
//! - [`admin`] - Generic list/get/create/update/delete surface
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopkit_db::{Database, NewOrder, ShopConfig};
//!
//! let config = ShopConfig::load()?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let order = NewOrder::new("ada@example.com").line("TEE-M", 2);
//! let placed = db.orders().place_order(order, &config.checkout_settings()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod admin;
pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use admin::{AdminResource, ListParams, Page};
pub use config::{ConfigError, ShopConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::attribute::AttributeRepository;
pub use repository::category::CategoryRepository;
pub use repository::coupon::CouponRepository;
pub use repository::inventory::{InventoryRepository, StockLevel};
pub use repository::order::{NewOrder, NewOrderLine, OrderDetail, OrderRepository};
pub use repository::payment::{NewPayment, PaymentRepository};
pub use repository::product::{ProductDetail, ProductRepository};
pub use repository::variant::VariantRepository;
