//! # Repository Module
//!
//! Database repository implementations for shopkit.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Host application (storefront handler, admin screen)                    │
//! │       │                                                                 │
//! │       │  db.orders().place_order(new_order, &settings)                  │
//! │       │  db.products().list(&ListParams::new().search("tee"))           │
//! │       ▼                                                                 │
//! │  OrderRepository / ProductRepository / ...                              │
//! │  ├── domain operations (place_order, reserve, save_with_inlines)        │
//! │  └── AdminResource (list, get, create, update, delete)                  │
//! │       │                                                                 │
//! │       │  SQL, one transaction per operation                             │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`category::CategoryRepository`] - Category tree
//! - [`product::ProductRepository`] - Products with inline variants and images
//! - [`variant::VariantRepository`] - Variants and their typed attributes
//! - [`attribute::AttributeRepository`] - Attribute definitions
//! - [`inventory::InventoryRepository`] - Stock levels per variant
//! - [`coupon::CouponRepository`] - Coupons and redemptions
//! - [`order::OrderRepository`] - Order placement and lifecycle
//! - [`payment::PaymentRepository`] - Payments against orders

pub mod attribute;
pub mod category;
pub mod coupon;
pub mod inventory;
pub mod order;
pub mod payment;
pub mod product;
pub mod variant;

/// Fixtures shared by the repository tests.
#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use shopkit_core::validation::slugify;
    use shopkit_core::{
        Category, Coupon, DiscountType, Product, ProductImage, ProductStatus, ProductVariant,
    };

    use crate::admin::AdminResource;
    use crate::pool::{Database, DbConfig};

    pub async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub fn category(name: &str, parent_id: Option<&str>) -> Category {
        let now = Utc::now();
        Category {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug: slugify(name),
            parent_id: parent_id.map(str::to_string),
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn seed_category(db: &Database, name: &str) -> Category {
        db.categories().create(&category(name, None)).await.unwrap()
    }

    /// An active product with a slug derived from `name`.
    pub fn product(name: &str, base_price_cents: i64) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug: slugify(name),
            description: None,
            category_id: None,
            base_price_cents,
            status: ProductStatus::Active,
            is_featured: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn seed_product(db: &Database, name: &str, base_price_cents: i64) -> Product {
        db.products()
            .create(&product(name, base_price_cents))
            .await
            .unwrap()
    }

    pub fn variant(product_id: &str, sku: &str, price_cents: Option<i64>) -> ProductVariant {
        let now = Utc::now();
        ProductVariant {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            sku: sku.to_string(),
            name: sku.to_string(),
            price_cents,
            compare_at_price_cents: None,
            weight_grams: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// One product with a single variant priced at the product's base
    /// price, stocked with `on_hand` units.
    pub async fn seed_variant(
        db: &Database,
        sku: &str,
        price_cents: i64,
        on_hand: i64,
    ) -> ProductVariant {
        let mut p = product(sku, price_cents);
        p.slug = sku.to_lowercase();
        let p = db.products().create(&p).await.unwrap();

        let v = db
            .variants()
            .create(&variant(&p.id, sku, None))
            .await
            .unwrap();
        if on_hand > 0 {
            db.inventory().restock(sku, on_hand).await.unwrap();
        }
        v
    }

    pub fn image(product_id: &str, url: &str, position: i64, is_primary: bool) -> ProductImage {
        ProductImage {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            url: url.to_string(),
            alt_text: None,
            position,
            is_primary,
            created_at: Utc::now(),
        }
    }

    /// An active coupon valid from yesterday for 30 days, no limits.
    pub fn coupon(code: &str, discount_type: DiscountType, value: i64) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            description: None,
            discount_type,
            value,
            max_discount_cents: None,
            min_purchase_cents: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            usage_limit: None,
            per_customer_limit: None,
            times_used: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
