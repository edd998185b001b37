//! # Order Repository
//!
//! Order placement and the stock effects of an order's lifecycle.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. PLACE (one transaction)                                             │
//! │     └── place_order() → Order { status: Pending }                       │
//! │         ├── load variants, capture price snapshots                      │
//! │         ├── check stock for every line, then reserve                    │
//! │         ├── evaluate coupon (global + per-customer limits)              │
//! │         ├── aggregate totals                                            │
//! │         ├── insert order + items                                        │
//! │         └── record redemption, bump times_used                          │
//! │                                                                         │
//! │  2. PROCESS                                                             │
//! │     └── update_status(Processing) → reservations kept                   │
//! │                                                                         │
//! │  3a. FULFILL                                                            │
//! │     └── fulfill_order() → Shipped, stock reduced, reservations consumed │
//! │                                                                         │
//! │  3b. CANCEL                                                             │
//! │     └── cancel_order() → Cancelled, reservations + coupon released      │
//! │                                                                         │
//! │  Any failure rolls the whole step back.                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shopkit_core::order::{ensure_fulfillable, AppliedCoupon, StockRequest};
use shopkit_core::validation::{
    validate_coupon_code, validate_email, validate_order_number, validate_quantity, validate_sku,
};
use shopkit_core::{
    calculate_total, CheckoutSettings, Coupon, Inventory, Money, Order, OrderAggregator, OrderItem,
    OrderStatus, Payment, PaymentStatus, PriceSnapshot, ProductStatus, StockLedger,
    ValidationError, MAX_ORDER_LINES,
};

use crate::admin::{fetch_page, AdminResource, Clause, ListParams, ListSpec, Page};
use crate::error::{DbError, DbResult};
use crate::repository::coupon::{count_customer_redemptions, find_by_code, redeem, unredeem};
use crate::repository::inventory::{load_ledger_by_sku, load_ledger_by_variant, store_ledger};
use crate::repository::payment::{derive_payment_status, payments_of};

const LIST: ListSpec = ListSpec {
    table: "orders",
    columns: "*",
    search: &["order_number", "customer_email"],
    status: Some(Clause::eq("status = ")),
    sku: Some(Clause {
        open: "id IN (SELECT order_id FROM order_items WHERE sku_snapshot = ",
        close: ")",
    }),
    category: None,
    order_by: "created_at DESC",
};

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// One requested line of a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub sku: String,
    pub quantity: i64,
}

/// A checkout request.
///
/// ```rust,ignore
/// let order = NewOrder::new("ada@example.com")
///     .line("TEE-M", 3)
///     .coupon("SAVE10");
/// let placed = db.orders().place_order(order, &settings).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_email: String,
    pub lines: Vec<NewOrderLine>,
    pub coupon_code: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn new(customer_email: impl Into<String>) -> Self {
        NewOrder {
            customer_email: customer_email.into(),
            lines: Vec::new(),
            coupon_code: None,
            shipping_address: None,
            billing_address: None,
            notes: None,
        }
    }

    pub fn line(mut self, sku: impl Into<String>, quantity: i64) -> Self {
        self.lines.push(NewOrderLine {
            sku: sku.into(),
            quantity,
        });
        self
    }

    pub fn coupon(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn shipping_address(mut self, address: impl Into<String>) -> Self {
        self.shipping_address = Some(address.into());
        self
    }

    fn validate(&self) -> DbResult<()> {
        validate_email(&self.customer_email)?;

        if self.lines.is_empty() {
            return Err(ValidationError::Required {
                field: "lines".to_string(),
            }
            .into());
        }
        if self.lines.len() > MAX_ORDER_LINES {
            return Err(ValidationError::OutOfRange {
                field: "lines".to_string(),
                min: 1,
                max: MAX_ORDER_LINES as i64,
            }
            .into());
        }
        for line in &self.lines {
            validate_sku(&line.sku)?;
            validate_quantity(line.quantity)?;
        }

        if let Some(code) = &self.coupon_code {
            validate_coupon_code(code)?;
        }
        Ok(())
    }
}

/// An order with its lines and payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

/// Variant data needed to price a line.
#[derive(Debug, FromRow)]
struct OrderableVariant {
    variant_id: String,
    sku: String,
    name: String,
    price_cents: Option<i64>,
    base_price_cents: i64,
    variant_active: bool,
    product_status: ProductStatus,
}

impl OrderableVariant {
    fn unit_price(&self) -> Money {
        Money::from_cents(self.price_cents.unwrap_or(self.base_price_cents))
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Places an order: snapshots, stock reservation, coupon and totals in
    /// a single transaction.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown SKU or coupon code
    /// - `Domain(InsufficientStock)` if any line can't be covered
    /// - `Domain(DiscountNotApplicable)` if the coupon doesn't apply
    /// - `Domain(Validation)` for malformed input or unavailable variants
    ///
    /// On error nothing is written.
    pub async fn place_order(
        &self,
        new_order: NewOrder,
        settings: &CheckoutSettings,
    ) -> DbResult<OrderDetail> {
        new_order.validate()?;
        settings.validate()?;

        debug!(
            customer = %new_order.customer_email,
            lines = new_order.lines.len(),
            coupon = ?new_order.coupon_code,
            "Placing order"
        );

        match self.place_order_tx(&new_order, settings, Utc::now()).await {
            Ok(detail) => {
                info!(
                    order_number = %detail.order.order_number,
                    total = %detail.order.totals().total,
                    "Order placed"
                );
                Ok(detail)
            }
            Err(err) => {
                warn!(customer = %new_order.customer_email, error = %err, "Order rejected");
                Err(err)
            }
        }
    }

    async fn place_order_tx(
        &self,
        new_order: &NewOrder,
        settings: &CheckoutSettings,
        now: DateTime<Utc>,
    ) -> DbResult<OrderDetail> {
        let mut tx = self.pool.begin().await?;

        // Snapshots
        let mut snapshots = Vec::with_capacity(new_order.lines.len());
        for line in &new_order.lines {
            let variant = load_orderable(&mut tx, &line.sku).await?;
            snapshots.push(PriceSnapshot::capture(
                Some(variant.variant_id.clone()),
                &variant.sku,
                &variant.name,
                variant.unit_price(),
                line.quantity,
            )?);
        }

        // Stock: check every line before reserving any
        let mut ledgers: BTreeMap<String, (Inventory, StockLedger)> = BTreeMap::new();
        for snapshot in &snapshots {
            if !ledgers.contains_key(&snapshot.sku) {
                let loaded = load_ledger_by_sku(&mut tx, &snapshot.sku).await?;
                ledgers.insert(snapshot.sku.clone(), loaded);
            }
        }
        let requests: Vec<StockRequest<'_>> = snapshots
            .iter()
            .filter_map(|snapshot| {
                ledgers.get(&snapshot.sku).map(|(_, ledger)| StockRequest {
                    ledger,
                    quantity: snapshot.quantity,
                })
            })
            .collect();
        ensure_fulfillable(&requests)?;

        for snapshot in &snapshots {
            if let Some((_, ledger)) = ledgers.get_mut(&snapshot.sku) {
                ledger.reserve(snapshot.quantity)?;
            }
        }
        for (inventory, ledger) in ledgers.values() {
            store_ledger(&mut tx, inventory, ledger).await?;
        }

        // Coupon
        let coupon = match &new_order.coupon_code {
            Some(code) => {
                let coupon = find_by_code(&mut tx, code)
                    .await?
                    .ok_or_else(|| DbError::not_found("Coupon", code))?;
                let policy = coupon.policy()?;
                let uses =
                    count_customer_redemptions(&mut tx, &coupon.id, &new_order.customer_email)
                        .await?;
                Some((coupon, policy, uses))
            }
            None => None,
        };
        let applied = coupon.as_ref().map(|(_, policy, uses)| AppliedCoupon {
            policy,
            customer_uses: *uses,
        });

        // Totals
        let totals = OrderAggregator::new(*settings).price(&snapshots, applied, now)?;

        let order = Order {
            id: Uuid::new_v4().to_string(),
            order_number: generate_order_number(now),
            customer_email: new_order.customer_email.clone(),
            status: OrderStatus::Pending,
            payment_status: derive_payment_status(totals.total, Money::zero(), Money::zero()),
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            shipping_cents: totals.shipping.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            coupon_id: coupon.as_ref().map(|(coupon, _, _)| coupon.id.clone()),
            shipping_address: new_order.shipping_address.clone(),
            billing_address: new_order.billing_address.clone(),
            notes: new_order.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        insert_order(&mut tx, &order).await?;

        let mut items = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            let item = OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                variant_id: snapshot.variant_id.clone(),
                sku_snapshot: snapshot.sku.clone(),
                name_snapshot: snapshot.name.clone(),
                unit_price_cents: snapshot.unit_price.cents(),
                quantity: snapshot.quantity,
                line_total_cents: snapshot.line_total()?.cents(),
                created_at: now,
            };
            insert_item(&mut tx, &item).await?;
            items.push(item);
        }

        if let Some((coupon, policy, _)) = &coupon {
            redeem(
                &mut tx,
                coupon,
                policy,
                &order.id,
                &order.customer_email,
                totals.discount,
            )
            .await?;
        }

        tx.commit().await?;

        Ok(OrderDetail {
            order,
            items,
            payments: Vec::new(),
        })
    }

    /// Cancels a pending or processing order, releasing its reservations
    /// and coupon redemption.
    pub async fn cancel_order(&self, order_id: &str) -> DbResult<Order> {
        self.transition_reserved(order_id, OrderStatus::Cancelled)
            .await
    }

    /// Ships a pending or processing order, reducing stock by its lines.
    pub async fn fulfill_order(&self, order_id: &str) -> DbResult<Order> {
        self.transition_reserved(order_id, OrderStatus::Shipped)
            .await
    }

    async fn transition_reserved(&self, order_id: &str, target: OrderStatus) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;

        let order = load_order(&mut tx, order_id).await?;
        if !order.status.holds_reservation() {
            return Err(invalid_transition(order.status, target));
        }
        let order = transition(&mut tx, order, target).await?;

        tx.commit().await?;

        info!(order_number = %order.order_number, status = %order.status, "Order status changed");
        Ok(order)
    }

    /// Moves an order to `status`, applying the stock effects:
    ///
    /// | from                | to                    | effect               |
    /// |---------------------|-----------------------|----------------------|
    /// | pending/processing  | shipped/delivered     | reduce stock         |
    /// | pending/processing  | cancelled/refunded    | release stock+coupon |
    /// | any other status    | pending/processing    | reserve stock+coupon |
    ///
    /// Anything else just stores the new status. Re-reserving fails if the
    /// stock is gone or the coupon no longer applies to the customer.
    pub async fn update_status(&self, order_id: &str, status: OrderStatus) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;

        let order = load_order(&mut tx, order_id).await?;
        let order = transition(&mut tx, order, status).await?;

        tx.commit().await?;

        info!(order_number = %order.order_number, status = %order.status, "Order status changed");
        Ok(order)
    }

    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = ?1")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// Line items of an order, in the order they were placed.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        items_of(&mut conn, order_id).await
    }

    pub async fn detail(&self, order_id: &str) -> DbResult<Option<OrderDetail>> {
        let Some(order) = self.get(order_id).await? else {
            return Ok(None);
        };

        let mut conn = self.pool.acquire().await?;
        Ok(Some(OrderDetail {
            items: items_of(&mut conn, order_id).await?,
            payments: payments_of(&mut conn, order_id).await?,
            order,
        }))
    }

    /// A customer's orders, newest first.
    pub async fn for_customer(&self, customer_email: &str) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE customer_email = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_email)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn load_orderable(conn: &mut SqliteConnection, sku: &str) -> DbResult<OrderableVariant> {
    let variant = sqlx::query_as::<_, OrderableVariant>(
        r#"
        SELECT
            v.id AS variant_id,
            v.sku,
            v.name,
            v.price_cents,
            p.base_price_cents,
            v.is_active AS variant_active,
            p.status AS product_status
        FROM product_variants v
        INNER JOIN products p ON p.id = v.product_id
        WHERE v.sku = ?1
        "#,
    )
    .bind(sku)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("ProductVariant", sku))?;

    if !variant.variant_active || variant.product_status != ProductStatus::Active {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: format!("{} is not available for sale", sku),
        }
        .into());
    }

    Ok(variant)
}

async fn load_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Order> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Order", order_id))
}

async fn items_of(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT * FROM order_items
        WHERE order_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, customer_email, status, payment_status,
            subtotal_cents, tax_cents, shipping_cents, discount_cents, total_cents,
            coupon_id, shipping_address, billing_address, notes,
            created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14,
            ?15, ?16
        )
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.customer_email)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(order.subtotal_cents)
    .bind(order.tax_cents)
    .bind(order.shipping_cents)
    .bind(order.discount_cents)
    .bind(order.total_cents)
    .bind(&order.coupon_id)
    .bind(&order.shipping_address)
    .bind(&order.billing_address)
    .bind(&order.notes)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Snapshot pattern: SKU, name and price are copied to the item so later
/// catalog edits never change a placed order.
async fn insert_item(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO order_items (
            id, order_id, variant_id,
            sku_snapshot, name_snapshot, unit_price_cents,
            quantity, line_total_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&item.id)
    .bind(&item.order_id)
    .bind(&item.variant_id)
    .bind(&item.sku_snapshot)
    .bind(&item.name_snapshot)
    .bind(item.unit_price_cents)
    .bind(item.quantity)
    .bind(item.line_total_cents)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn set_status(
    conn: &mut SqliteConnection,
    mut order: Order,
    status: OrderStatus,
) -> DbResult<Order> {
    let now = Utc::now();

    sqlx::query("UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(&order.id)
        .bind(status)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    order.status = status;
    order.updated_at = now;
    Ok(order)
}

pub(crate) async fn set_payment_status(
    conn: &mut SqliteConnection,
    order_id: &str,
    payment_status: PaymentStatus,
) -> DbResult<()> {
    let result =
        sqlx::query("UPDATE orders SET payment_status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(order_id)
            .bind(payment_status)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Order", order_id));
    }

    Ok(())
}

fn invalid_transition(from: OrderStatus, to: OrderStatus) -> DbError {
    ValidationError::InvalidFormat {
        field: "status".to_string(),
        reason: format!("cannot move a {} order to {}", from, to),
    }
    .into()
}

/// Applies the stock effects of moving `order` to `target`, then stores the
/// new status.
async fn transition(
    conn: &mut SqliteConnection,
    order: Order,
    target: OrderStatus,
) -> DbResult<Order> {
    if order.status == target {
        return Ok(order);
    }

    let holds = order.status.holds_reservation();
    match target {
        OrderStatus::Pending | OrderStatus::Processing if !holds => {
            reserve_stock(conn, &order.id).await?;
            restore_redemption(conn, &order).await?;
        }
        OrderStatus::Shipped | OrderStatus::Delivered if holds => {
            reduce_stock(conn, &order.id).await?;
        }
        OrderStatus::Cancelled | OrderStatus::Refunded if holds => {
            release_stock(conn, &order.id).await?;
            unredeem(conn, &order.id).await?;
        }
        _ => {}
    }

    debug!(order_id = %order.id, from = %order.status, to = %target, "Transitioning order");
    set_status(conn, order, target).await
}

async fn reserve_stock(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
    for item in items_of(conn, order_id).await? {
        let Some(variant_id) = &item.variant_id else {
            continue;
        };
        let (inventory, mut ledger) = load_ledger_by_variant(conn, variant_id).await?;
        ledger.reserve(item.quantity)?;
        store_ledger(conn, &inventory, &ledger).await?;
    }
    Ok(())
}

/// Counts the order's coupon again after it was released. Fails with
/// `DiscountNotApplicable` when the coupon no longer applies to the customer.
async fn restore_redemption(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    let Some(coupon_id) = &order.coupon_id else {
        return Ok(());
    };
    let Some(coupon) = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE id = ?1")
        .bind(coupon_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(());
    };

    // The coupon must still apply: active, in its window, under both limits
    let policy = coupon.policy()?;
    let uses = count_customer_redemptions(conn, &coupon.id, &order.customer_email).await?;
    policy.calculate_discount_for_customer(
        Money::from_cents(order.subtotal_cents),
        Utc::now(),
        uses,
    )?;

    redeem(
        conn,
        &coupon,
        &policy,
        &order.id,
        &order.customer_email,
        Money::from_cents(order.discount_cents),
    )
    .await?;
    Ok(())
}

async fn release_stock(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
    for item in items_of(conn, order_id).await? {
        let Some(variant_id) = &item.variant_id else {
            continue;
        };
        let (inventory, mut ledger) = load_ledger_by_variant(conn, variant_id).await?;
        ledger.release(item.quantity)?;
        store_ledger(conn, &inventory, &ledger).await?;
    }
    Ok(())
}

async fn reduce_stock(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
    for item in items_of(conn, order_id).await? {
        let Some(variant_id) = &item.variant_id else {
            continue;
        };
        let (inventory, mut ledger) = load_ledger_by_variant(conn, variant_id).await?;
        ledger.reduce(item.quantity)?;
        store_ledger(conn, &inventory, &ledger).await?;
    }
    Ok(())
}

/// Generates an order number: `ORD-YYYYMMDD-XXXXXXXX`.
fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "ORD-{}-{}",
        now.format("%Y%m%d"),
        suffix[..8].to_uppercase()
    )
}

fn validate_order(order: &Order) -> DbResult<()> {
    validate_order_number(&order.order_number)?;
    validate_email(&order.customer_email)?;

    let totals = calculate_total(
        &[Money::from_cents(order.subtotal_cents)],
        Money::from_cents(order.tax_cents),
        Money::from_cents(order.shipping_cents),
        Money::from_cents(order.discount_cents),
    )?;
    if totals.total.cents() != order.total_cents {
        return Err(ValidationError::InvalidFormat {
            field: "total_cents".to_string(),
            reason: format!("expected {}", totals.total),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Admin
// =============================================================================

impl AdminResource for OrderRepository {
    type Record = Order;
    const ENTITY: &'static str = "Order";

    async fn list(&self, params: &ListParams) -> DbResult<Page<Order>> {
        fetch_page(&self.pool, &LIST, params).await
    }

    async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// Records an order entered by hand. Stock and coupons are untouched;
    /// use [`OrderRepository::place_order`] for checkouts. The incoming
    /// payment status is ignored: a new order has no payments yet.
    async fn create(&self, order: &Order) -> DbResult<Order> {
        validate_order(order)?;
        debug!(order_number = %order.order_number, "Inserting order");

        let mut order = order.clone();
        order.payment_status = derive_payment_status(
            Money::from_cents(order.total_cents),
            Money::zero(),
            Money::zero(),
        );

        let mut conn = self.pool.acquire().await?;
        insert_order(&mut conn, &order).await?;

        Ok(order)
    }

    /// Updates contact details and notes. A status change goes through the
    /// same transitions as [`OrderRepository::update_status`]. Totals and
    /// payment status are never edited; payment status follows the payments.
    async fn update(&self, order: &Order) -> DbResult<Order> {
        validate_email(&order.customer_email)?;
        debug!(id = %order.id, "Updating order");

        let mut tx = self.pool.begin().await?;

        let current = load_order(&mut tx, &order.id).await?;
        let mut updated = transition(&mut tx, current, order.status).await?;

        updated.customer_email = order.customer_email.clone();
        updated.shipping_address = order.shipping_address.clone();
        updated.billing_address = order.billing_address.clone();
        updated.notes = order.notes.clone();
        updated.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE orders SET
                customer_email = ?2,
                shipping_address = ?3,
                billing_address = ?4,
                notes = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&updated.id)
        .bind(&updated.customer_email)
        .bind(&updated.shipping_address)
        .bind(&updated.billing_address)
        .bind(&updated.notes)
        .bind(updated.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Deletes an order with its items and payments. An order still holding
    /// stock releases it first.
    async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting order");

        let mut tx = self.pool.begin().await?;

        let order = load_order(&mut tx, id).await?;
        if order.status.holds_reservation() {
            release_stock(&mut tx, id).await?;
            unredeem(&mut tx, id).await?;
        }

        sqlx::query("DELETE FROM orders WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::payment::NewPayment;
    use crate::repository::test_support::{coupon, seed_variant, test_db};
    use shopkit_core::{CoreError, DiscountType, PaymentMethod, Rate};

    fn no_extras() -> CheckoutSettings {
        CheckoutSettings::default()
    }

    #[tokio::test]
    async fn test_place_order_reserves_and_snapshots() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;

        let placed = db
            .orders()
            .place_order(NewOrder::new("ada@example.com").line("TEE-M", 3), &no_extras())
            .await
            .unwrap();

        assert_eq!(placed.order.subtotal_cents, 5997);
        assert_eq!(placed.order.total_cents, 5997);
        assert_eq!(placed.order.status, OrderStatus::Pending);
        assert!(placed.order.order_number.starts_with("ORD-"));
        assert_eq!(placed.items.len(), 1);
        assert_eq!(placed.items[0].sku_snapshot, "TEE-M");
        assert_eq!(placed.items[0].line_total_cents, 5997);

        let ledger = db.inventory().ledger("TEE-M").await.unwrap();
        assert_eq!((ledger.on_hand(), ledger.reserved()), (10, 3));

        let stored = db.orders().detail(&placed.order.id).await.unwrap().unwrap();
        assert_eq!(stored.items, placed.items);
        assert_eq!(
            db.orders()
                .get_by_number(&placed.order.order_number)
                .await
                .unwrap()
                .unwrap()
                .id,
            placed.order.id
        );
    }

    #[tokio::test]
    async fn test_snapshot_survives_price_change() {
        let db = test_db().await;
        let v = seed_variant(&db, "TEE-M", 1999, 10).await;

        let placed = db
            .orders()
            .place_order(NewOrder::new("ada@example.com").line("TEE-M", 1), &no_extras())
            .await
            .unwrap();

        let mut repriced = v.clone();
        repriced.price_cents = Some(2999);
        db.variants().update(&repriced).await.unwrap();

        let items = db.orders().items(&placed.order.id).await.unwrap();
        assert_eq!(items[0].unit_price_cents, 1999);
    }

    #[tokio::test]
    async fn test_failed_order_leaves_inventory_untouched() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;
        seed_variant(&db, "CAP", 1500, 1).await;

        // Second line can't be covered, so the first must not be reserved
        let err = db
            .orders()
            .place_order(
                NewOrder::new("ada@example.com").line("TEE-M", 2).line("CAP", 2),
                &no_extras(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { ref sku, .. }) if sku == "CAP"
        ));

        assert_eq!(db.inventory().ledger("TEE-M").await.unwrap().reserved(), 0);
        assert_eq!(db.inventory().ledger("CAP").await.unwrap().reserved(), 0);
        assert_eq!(db.orders().list(&ListParams::new()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_repeated_sku_lines_are_summed() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 5).await;

        let result = db
            .orders()
            .place_order(
                NewOrder::new("ada@example.com").line("TEE-M", 3).line("TEE-M", 3),
                &no_extras(),
            )
            .await;
        assert!(matches!(
            result,
            Err(DbError::Domain(CoreError::InsufficientStock { requested: 6, .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_sku_and_empty_order() {
        let db = test_db().await;

        assert!(matches!(
            db.orders()
                .place_order(NewOrder::new("ada@example.com").line("NOPE", 1), &no_extras())
                .await,
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            db.orders()
                .place_order(NewOrder::new("ada@example.com"), &no_extras())
                .await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
        assert!(matches!(
            db.orders()
                .place_order(NewOrder::new("not-an-email").line("TEE-M", 1), &no_extras())
                .await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_inactive_variant_not_orderable() {
        let db = test_db().await;
        let mut v = seed_variant(&db, "TEE-M", 1999, 5).await;
        v.is_active = false;
        db.variants().update(&v).await.unwrap();

        assert!(matches!(
            db.orders()
                .place_order(NewOrder::new("ada@example.com").line("TEE-M", 1), &no_extras())
                .await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_totals_with_coupon_tax_and_shipping() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;
        seed_variant(&db, "CAP", 4003, 10).await;

        let mut c = coupon("SAVE10", DiscountType::Percentage, 1000);
        c.max_discount_cents = Some(500);
        db.coupons().create(&c).await.unwrap();

        let settings = CheckoutSettings {
            tax_rate: Rate::from_bps(1000),
            flat_shipping: Money::from_cents(500),
            free_shipping_threshold: None,
        };
        let placed = db
            .orders()
            .place_order(
                NewOrder::new("ada@example.com")
                    .line("TEE-M", 3)
                    .line("CAP", 1)
                    .coupon("SAVE10"),
                &settings,
            )
            .await
            .unwrap();

        let totals = placed.order.totals();
        assert_eq!(totals.subtotal, Money::from_cents(10000));
        assert_eq!(totals.discount, Money::from_cents(500));
        assert_eq!(totals.tax, Money::from_cents(950));
        assert_eq!(totals.shipping, Money::from_cents(500));
        assert_eq!(totals.total, Money::from_cents(10950));
        assert_eq!(placed.order.coupon_id.as_deref(), Some(c.id.as_str()));

        let stored = db.coupons().get_by_code("SAVE10").await.unwrap().unwrap();
        assert_eq!(stored.times_used, 1);
        let redemptions = db.coupons().redemptions(&c.id).await.unwrap();
        assert_eq!(redemptions.len(), 1);
        assert_eq!(redemptions[0].discount_cents, 500);
    }

    #[tokio::test]
    async fn test_coupon_usage_limits_across_orders() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;

        let mut c = coupon("ONCE", DiscountType::Fixed, 500);
        c.per_customer_limit = Some(1);
        c.usage_limit = Some(2);
        db.coupons().create(&c).await.unwrap();

        let order = |email: &str| NewOrder::new(email).line("TEE-M", 1).coupon("ONCE");

        db.orders().place_order(order("ada@example.com"), &no_extras()).await.unwrap();

        // Same customer again: per-customer limit
        let err = db
            .orders()
            .place_order(order("ada@example.com"), &no_extras())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::DiscountNotApplicable { .. })));

        db.orders().place_order(order("bob@example.com"), &no_extras()).await.unwrap();

        // Global limit of 2 reached
        let err = db
            .orders()
            .place_order(order("cy@example.com"), &no_extras())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::DiscountNotApplicable { .. })));

        // Rejected orders reserved nothing
        assert_eq!(db.inventory().ledger("TEE-M").await.unwrap().reserved(), 2);
    }

    #[tokio::test]
    async fn test_min_purchase_not_met() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;

        let mut c = coupon("BIG", DiscountType::Fixed, 500);
        c.min_purchase_cents = 5000;
        db.coupons().create(&c).await.unwrap();

        let err = db
            .orders()
            .place_order(
                NewOrder::new("ada@example.com").line("TEE-M", 2).coupon("BIG"),
                &no_extras(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::DiscountNotApplicable { .. })));
    }

    #[tokio::test]
    async fn test_cancel_releases_stock_and_coupon() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;
        let c = coupon("SAVE", DiscountType::Fixed, 500);
        db.coupons().create(&c).await.unwrap();

        let placed = db
            .orders()
            .place_order(
                NewOrder::new("ada@example.com").line("TEE-M", 4).coupon("SAVE"),
                &no_extras(),
            )
            .await
            .unwrap();

        let cancelled = db.orders().cancel_order(&placed.order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let ledger = db.inventory().ledger("TEE-M").await.unwrap();
        assert_eq!((ledger.on_hand(), ledger.reserved()), (10, 0));
        assert_eq!(db.coupons().get_by_code("SAVE").await.unwrap().unwrap().times_used, 0);

        // Only orders holding stock can be cancelled
        assert!(matches!(
            db.orders().cancel_order(&placed.order.id).await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));

        // Reopening holds the stock and the coupon again
        db.orders()
            .update_status(&placed.order.id, OrderStatus::Pending)
            .await
            .unwrap();
        assert_eq!(db.inventory().ledger("TEE-M").await.unwrap().reserved(), 4);
        assert_eq!(db.coupons().get_by_code("SAVE").await.unwrap().unwrap().times_used, 1);
    }

    #[tokio::test]
    async fn test_reopen_respects_per_customer_limit() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;
        let mut c = coupon("ONCE", DiscountType::Fixed, 500);
        c.per_customer_limit = Some(1);
        let c = db.coupons().create(&c).await.unwrap();

        let first = db
            .orders()
            .place_order(
                NewOrder::new("ada@example.com").line("TEE-M", 2).coupon("ONCE"),
                &no_extras(),
            )
            .await
            .unwrap();
        db.orders().cancel_order(&first.order.id).await.unwrap();

        db.orders()
            .place_order(
                NewOrder::new("ada@example.com").line("TEE-M", 2).coupon("ONCE"),
                &no_extras(),
            )
            .await
            .unwrap();

        assert!(matches!(
            db.orders()
                .update_status(&first.order.id, OrderStatus::Pending)
                .await,
            Err(DbError::Domain(CoreError::DiscountNotApplicable { .. }))
        ));

        // Rolled back: still cancelled, one redemption, one order's stock held
        let stored = db.orders().get(&first.order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(
            db.coupons()
                .customer_redemptions(&c.id, "ada@example.com")
                .await
                .unwrap(),
            1
        );
        assert_eq!(db.inventory().ledger("TEE-M").await.unwrap().reserved(), 2);
    }

    #[tokio::test]
    async fn test_reopen_rejects_deactivated_coupon() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;
        db.coupons()
            .create(&coupon("SAVE", DiscountType::Fixed, 500))
            .await
            .unwrap();

        let placed = db
            .orders()
            .place_order(
                NewOrder::new("ada@example.com").line("TEE-M", 1).coupon("SAVE"),
                &no_extras(),
            )
            .await
            .unwrap();
        db.orders().cancel_order(&placed.order.id).await.unwrap();

        let mut stored = db.coupons().get_by_code("SAVE").await.unwrap().unwrap();
        stored.is_active = false;
        db.coupons().update(&stored).await.unwrap();

        assert!(matches!(
            db.orders()
                .update_status(&placed.order.id, OrderStatus::Processing)
                .await,
            Err(DbError::Domain(CoreError::DiscountNotApplicable { .. }))
        ));
        assert_eq!(db.inventory().ledger("TEE-M").await.unwrap().reserved(), 0);
    }

    #[tokio::test]
    async fn test_reopen_fails_without_stock() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 4).await;

        let first = db
            .orders()
            .place_order(NewOrder::new("ada@example.com").line("TEE-M", 4), &no_extras())
            .await
            .unwrap();
        db.orders().cancel_order(&first.order.id).await.unwrap();

        db.orders()
            .place_order(NewOrder::new("bob@example.com").line("TEE-M", 3), &no_extras())
            .await
            .unwrap();

        assert!(matches!(
            db.orders()
                .update_status(&first.order.id, OrderStatus::Processing)
                .await,
            Err(DbError::Domain(CoreError::InsufficientStock { .. }))
        ));
        let stored = db.orders().get(&first.order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(db.inventory().ledger("TEE-M").await.unwrap().reserved(), 3);
    }

    #[tokio::test]
    async fn test_fulfill_reduces_stock() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;

        let placed = db
            .orders()
            .place_order(NewOrder::new("ada@example.com").line("TEE-M", 4), &no_extras())
            .await
            .unwrap();

        db.orders()
            .update_status(&placed.order.id, OrderStatus::Processing)
            .await
            .unwrap();
        let shipped = db.orders().fulfill_order(&placed.order.id).await.unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);

        let ledger = db.inventory().ledger("TEE-M").await.unwrap();
        assert_eq!((ledger.on_hand(), ledger.reserved()), (6, 0));

        // Delivered is bookkeeping only
        db.orders()
            .update_status(&placed.order.id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(db.inventory().ledger("TEE-M").await.unwrap().on_hand(), 6);

        // Already shipped
        assert!(db.orders().fulfill_order(&placed.order.id).await.is_err());
    }

    #[tokio::test]
    async fn test_deleted_variant_keeps_snapshot() {
        let db = test_db().await;
        let v = seed_variant(&db, "TEE-M", 1999, 10).await;

        let placed = db
            .orders()
            .place_order(NewOrder::new("ada@example.com").line("TEE-M", 1), &no_extras())
            .await
            .unwrap();

        db.variants().delete(&v.id).await.unwrap();

        let items = db.orders().items(&placed.order.id).await.unwrap();
        assert_eq!(items[0].variant_id, None);
        assert_eq!(items[0].sku_snapshot, "TEE-M");

        // Cancelling skips lines whose variant is gone
        db.orders().cancel_order(&placed.order.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_update_and_list() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;

        let placed = db
            .orders()
            .place_order(NewOrder::new("ada@example.com").line("TEE-M", 2), &no_extras())
            .await
            .unwrap();

        let mut edited = placed.order.clone();
        edited.notes = Some("gift wrap".into());
        edited.status = OrderStatus::Cancelled;
        edited.total_cents = 1;
        let updated = db.orders().update(&edited).await.unwrap();

        assert_eq!(updated.notes.as_deref(), Some("gift wrap"));
        assert_eq!(updated.status, OrderStatus::Cancelled);
        assert_eq!(updated.total_cents, placed.order.total_cents);
        assert_eq!(db.inventory().ledger("TEE-M").await.unwrap().reserved(), 0);

        let page = db
            .orders()
            .list(&ListParams::new().status(OrderStatus::Cancelled))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        let page = db.orders().list(&ListParams::new().sku("TEE-M")).await.unwrap();
        assert_eq!(page.total, 1);
        let page = db.orders().list(&ListParams::new().search("ada@")).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(db.orders().for_customer("ada@example.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_update_cannot_set_payment_status() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;

        let placed = db
            .orders()
            .place_order(NewOrder::new("ada@example.com").line("TEE-M", 1), &no_extras())
            .await
            .unwrap();

        let mut edited = placed.order.clone();
        edited.payment_status = PaymentStatus::Paid;
        let updated = db.orders().update(&edited).await.unwrap();
        assert_eq!(updated.payment_status, PaymentStatus::Pending);
        let stored = db.orders().get(&placed.order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);

        db.payments()
            .record_payment(NewPayment {
                order_id: placed.order.id.clone(),
                transaction_id: "TXN-1".into(),
                method: PaymentMethod::Card,
                amount_cents: 1999,
                status: PaymentStatus::Paid,
            })
            .await
            .unwrap();

        // And cannot undo a status the payments earned
        let mut edited = db.orders().get(&placed.order.id).await.unwrap().unwrap();
        assert_eq!(edited.payment_status, PaymentStatus::Paid);
        edited.payment_status = PaymentStatus::Pending;
        edited.notes = Some("left at door".into());
        let updated = db.orders().update(&edited).await.unwrap();
        assert_eq!(updated.payment_status, PaymentStatus::Paid);
        assert_eq!(updated.notes.as_deref(), Some("left at door"));
    }

    #[tokio::test]
    async fn test_free_order_is_paid() {
        let db = test_db().await;
        seed_variant(&db, "TEE-M", 1999, 10).await;
        let mut c = coupon("FREE", DiscountType::Percentage, 10_000);
        c.max_discount_cents = None;
        db.coupons().create(&c).await.unwrap();

        let placed = db
            .orders()
            .place_order(
                NewOrder::new("ada@example.com").line("TEE-M", 1).coupon("FREE"),
                &no_extras(),
            )
            .await
            .unwrap();

        assert_eq!(placed.order.total_cents, 0);
        assert_eq!(placed.order.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_admin_create_and_duplicate_order_number() {
        let db = test_db().await;
        let now = Utc::now();
        let manual = Order {
            id: Uuid::new_v4().to_string(),
            order_number: "ORD-MANUAL-1".into(),
            customer_email: "phone@example.com".into(),
            status: OrderStatus::Delivered,
            payment_status: PaymentStatus::Paid,
            subtotal_cents: 1000,
            tax_cents: 100,
            shipping_cents: 0,
            discount_cents: 0,
            total_cents: 1100,
            coupon_id: None,
            shipping_address: None,
            billing_address: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let created = db.orders().create(&manual).await.unwrap();
        assert_eq!(created.payment_status, PaymentStatus::Pending);
        let stored = db.orders().get(&manual.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);

        let mut duplicate = manual.clone();
        duplicate.id = Uuid::new_v4().to_string();
        assert!(matches!(
            db.orders().create(&duplicate).await,
            Err(DbError::UniqueViolation { field, .. }) if field == "orders.order_number"
        ));

        let mut wrong_total = manual.clone();
        wrong_total.id = Uuid::new_v4().to_string();
        wrong_total.order_number = "ORD-MANUAL-2".into();
        wrong_total.total_cents = 999;
        assert!(db.orders().create(&wrong_total).await.is_err());

        db.orders().delete(&manual.id).await.unwrap();
        assert!(db.orders().get(&manual.id).await.unwrap().is_none());
    }

    #[test]
    fn test_order_number_format() {
        let number = generate_order_number(Utc::now());
        assert_eq!(number.len(), 21);
        assert!(validate_order_number(&number).is_ok());
    }
}
