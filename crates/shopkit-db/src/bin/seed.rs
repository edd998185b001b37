//! # Seed Data Generator
//!
//! Populates a database with catalog data for development.
//!
//! ## Usage
//! ```bash
//! # Generate 200 products (default)
//! cargo run -p shopkit-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p shopkit-db --bin seed -- --count 1000
//!
//! # Specify database path (defaults to SHOPKIT_DATABASE_PATH)
//! cargo run -p shopkit-db --bin seed -- --db ./data/shop.db
//! ```
//!
//! ## Generated Data
//! - One category per product family, nested under "Apparel" / "Home"
//! - A `size` choice attribute
//! - Products with one variant per size, each stocked and given the
//!   configured reorder threshold
//! - A `WELCOME10` coupon (10% off, 100 uses, one per customer)

use chrono::{Duration, Utc};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use shopkit_core::validation::slugify;
use shopkit_core::{
    AttributeDefinition, AttributeMap, AttributeValue, Category, Coupon, DiscountType, Product,
    ProductImage, ProductStatus, ProductVariant,
};
use shopkit_db::repository::product::generate_product_id;
use shopkit_db::{AdminResource, Database, ShopConfig};

/// Product families: (parent category, category, code, names)
const FAMILIES: &[(&str, &str, &str, &[&str])] = &[
    (
        "Apparel",
        "T-Shirts",
        "TEE",
        &["Classic Tee", "Pocket Tee", "Heavyweight Tee", "Raglan Tee", "Ringer Tee"],
    ),
    (
        "Apparel",
        "Hoodies",
        "HOD",
        &["Zip Hoodie", "Pullover Hoodie", "Fleece Hoodie", "Tech Hoodie"],
    ),
    (
        "Apparel",
        "Caps",
        "CAP",
        &["Dad Cap", "Trucker Cap", "Beanie", "Bucket Hat"],
    ),
    (
        "Home",
        "Mugs",
        "MUG",
        &["Enamel Mug", "Ceramic Mug", "Travel Mug", "Espresso Cup"],
    ),
    (
        "Home",
        "Posters",
        "PST",
        &["City Poster", "Map Poster", "Botanical Print", "Retro Print"],
    ),
];

/// Sizes and their price addon in cents.
const SIZES: &[(&str, i64)] = &[("S", 0), ("M", 0), ("L", 200), ("XL", 400)];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shopkit=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut config = ShopConfig::load()?;
    let mut count: usize = 200;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("shopkit Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: SHOPKIT_DATABASE_PATH)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(database = %config.database_path.display(), products = count, "Seeding");

    let db = Database::new(config.db_config()).await?;

    let existing = db.products().list(&Default::default()).await?.total;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        return Ok(());
    }

    let start = std::time::Instant::now();

    let size = AttributeDefinition::choice("size", "Size", SIZES.iter().map(|(name, _)| *name));
    db.attributes().create(&size).await?;

    // Families share the count evenly; names repeat with an edition suffix
    let per_family = count.div_ceil(FAMILIES.len());
    let mut parents: Vec<Category> = Vec::new();
    let mut generated = 0;

    for (family_idx, (parent_name, category_name, code, names)) in FAMILIES.iter().enumerate() {
        if generated >= count {
            break;
        }

        let parent_id = match parents.iter().find(|c| c.name == *parent_name) {
            Some(parent) => parent.id.clone(),
            None => {
                let parent = db.categories().create(&new_category(parent_name, None)).await?;
                let id = parent.id.clone();
                parents.push(parent);
                id
            }
        };
        let category = db
            .categories()
            .create(&new_category(category_name, Some(parent_id)))
            .await?;

        for n in 0..per_family.min(count - generated) {
            let edition = n / names.len();
            let name = names[n % names.len()];
            let display_name = if edition == 0 {
                name.to_string()
            } else {
                format!("{} {}", name, edition + 1)
            };

            let seed = family_idx * 1000 + n;
            match seed_product(&db, &config, &category, code, &display_name, seed).await {
                Ok(()) => generated += 1,
                Err(e) => warn!(product = %display_name, error = %e, "Failed to seed product"),
            }
        }
    }

    let now = Utc::now();
    let welcome = Coupon {
        id: Uuid::new_v4().to_string(),
        code: "WELCOME10".to_string(),
        description: Some("10% off your first order".to_string()),
        discount_type: DiscountType::Percentage,
        value: 1000,
        max_discount_cents: Some(2500),
        min_purchase_cents: 0,
        valid_from: now,
        valid_until: now + Duration::days(90),
        usage_limit: Some(100),
        per_customer_limit: Some(1),
        times_used: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db.coupons().create(&welcome).await?;

    let elapsed = start.elapsed();
    info!(products = generated, elapsed = ?elapsed, "Seed complete");

    let low = db.inventory().low_stock(10).await?;
    info!(low_stock = low.len(), "Variants at or below their reorder threshold");

    db.close().await;
    Ok(())
}

fn new_category(name: &str, parent_id: Option<String>) -> Category {
    let now = Utc::now();
    Category {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        slug: slugify(name),
        parent_id,
        description: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// One product with a variant per size, stocked and tagged with its size.
async fn seed_product(
    db: &Database,
    config: &ShopConfig,
    category: &Category,
    code: &str,
    name: &str,
    seed: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();

    // $9.99 - $49.99
    let base_price_cents = 999 + ((seed * 37) % 4000) as i64;

    let product = Product {
        id: generate_product_id(),
        name: name.to_string(),
        slug: slugify(name),
        description: Some(format!("{} from the {} range", name, category.name)),
        category_id: Some(category.id.clone()),
        base_price_cents,
        status: ProductStatus::Active,
        is_featured: seed % 7 == 0,
        created_at: now,
        updated_at: now,
    };

    let variants: Vec<ProductVariant> = SIZES
        .iter()
        .map(|(size, addon)| ProductVariant {
            id: Uuid::new_v4().to_string(),
            product_id: product.id.clone(),
            sku: format!("{}-{:04}-{}", code, seed, size),
            name: format!("{} / {}", name, size),
            price_cents: (*addon > 0).then(|| base_price_cents + addon),
            compare_at_price_cents: None,
            weight_grams: Some(200 + (seed % 300) as i64),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .collect();

    let images = vec![ProductImage {
        id: Uuid::new_v4().to_string(),
        product_id: product.id.clone(),
        url: format!("https://cdn.example.com/{}/front.jpg", product.slug),
        alt_text: Some(name.to_string()),
        position: 0,
        is_primary: true,
        created_at: now,
    }];

    db.products()
        .save_with_inlines(&product, &variants, &images)
        .await?;

    for (variant, (size, _)) in variants.iter().zip(SIZES) {
        let mut attributes = AttributeMap::new();
        attributes.insert("size".to_string(), AttributeValue::Choice(size.to_string()));
        db.variants().set_attributes(&variant.id, &attributes).await?;

        // 0 - 60 units, so some variants start below their threshold
        let on_hand = ((seed * 13 + variant.sku.len()) % 61) as i64;
        if on_hand > 0 {
            db.inventory().restock(&variant.sku, on_hand).await?;
        }
        db.inventory()
            .set_reorder_threshold(&variant.sku, config.low_stock_threshold)
            .await?;
    }

    Ok(())
}
