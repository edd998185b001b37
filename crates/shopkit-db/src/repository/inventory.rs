//! # Inventory Repository
//!
//! Stock counters per variant. Every mutation loads the row into a
//! [`StockLedger`], applies the ledger operation, and writes the counters
//! back inside one transaction.
//!
//! ## Write-Back Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    SELECT on_hand, reserved ... WHERE sku = 'TEE-M'     → 10 / 2        │
//! │    ledger.reserve(3)                                    → 10 / 5        │
//! │    UPDATE inventory SET reserved = 5                                    │
//! │      WHERE id = ? AND on_hand = 10 AND reserved = 2     ← unchanged?    │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  0 rows updated → someone else moved the counters → TransactionFailed   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use shopkit_core::{CoreResult, Inventory, StockLedger};

use crate::admin::{fetch_page, AdminResource, Clause, ListParams, ListSpec, Page};
use crate::error::{DbError, DbResult};

const LIST: ListSpec = ListSpec {
    table: "inventory",
    columns: "*",
    search: &["(SELECT sku FROM product_variants WHERE product_variants.id = inventory.variant_id)"],
    status: None,
    sku: Some(Clause {
        open: "variant_id IN (SELECT id FROM product_variants WHERE sku = ",
        close: ")",
    }),
    category: Some(Clause {
        open: "variant_id IN (SELECT v.id FROM product_variants v \
               JOIN products p ON p.id = v.product_id WHERE p.category_id = ",
        close: ")",
    }),
    order_by: "updated_at DESC",
};

/// Stock of one variant with its SKU and name, for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StockLevel {
    pub variant_id: String,
    pub sku: String,
    pub name: String,
    pub on_hand: i64,
    pub reserved: i64,
    pub reorder_threshold: i64,
}

impl StockLevel {
    #[inline]
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }
}

/// Repository for inventory database operations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    pub async fn get_by_variant(&self, variant_id: &str) -> DbResult<Option<Inventory>> {
        let inventory =
            sqlx::query_as::<_, Inventory>("SELECT * FROM inventory WHERE variant_id = ?1")
                .bind(variant_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(inventory)
    }

    /// The current ledger for a SKU.
    pub async fn ledger(&self, sku: &str) -> DbResult<StockLedger> {
        let mut conn = self.pool.acquire().await?;
        let (_, ledger) = load_ledger_by_sku(&mut conn, sku).await?;
        Ok(ledger)
    }

    /// Holds `qty` units of `sku`.
    pub async fn reserve(&self, sku: &str, qty: i64) -> DbResult<StockLedger> {
        debug!(sku = %sku, qty, "Reserving stock");
        self.apply(sku, |ledger| ledger.reserve(qty)).await
    }

    /// Releases up to `qty` reserved units of `sku`.
    pub async fn release(&self, sku: &str, qty: i64) -> DbResult<StockLedger> {
        debug!(sku = %sku, qty, "Releasing stock");
        self.apply(sku, |ledger| ledger.release(qty).map(|_| ())).await
    }

    /// Removes `qty` units of `sku` from stock, consuming reservations.
    pub async fn reduce(&self, sku: &str, qty: i64) -> DbResult<StockLedger> {
        debug!(sku = %sku, qty, "Reducing stock");
        self.apply(sku, |ledger| ledger.reduce(qty)).await
    }

    /// Books `qty` received units of `sku`.
    pub async fn restock(&self, sku: &str, qty: i64) -> DbResult<StockLedger> {
        info!(sku = %sku, qty, "Restocking");
        self.apply(sku, |ledger| ledger.restock(qty)).await
    }

    /// Overwrites on-hand stock after a physical count.
    pub async fn set_on_hand(&self, sku: &str, on_hand: i64) -> DbResult<StockLedger> {
        info!(sku = %sku, on_hand, "Setting on-hand stock");
        self.apply(sku, |ledger| ledger.set_on_hand(on_hand)).await
    }

    pub async fn set_reorder_threshold(&self, sku: &str, threshold: i64) -> DbResult<StockLedger> {
        self.apply(sku, |ledger| ledger.set_reorder_threshold(threshold))
            .await
    }

    /// Active variants at or below their reorder threshold, lowest stock first.
    pub async fn low_stock(&self, limit: i64) -> DbResult<Vec<StockLevel>> {
        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT
                v.id AS variant_id,
                v.sku,
                v.name,
                i.on_hand,
                i.reserved,
                i.reorder_threshold
            FROM inventory i
            INNER JOIN product_variants v ON v.id = i.variant_id
            WHERE v.is_active = 1
            AND i.on_hand <= i.reorder_threshold
            ORDER BY i.on_hand, v.sku
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = levels.len(), "Low stock query returned rows");
        Ok(levels)
    }

    async fn apply<F>(&self, sku: &str, op: F) -> DbResult<StockLedger>
    where
        F: FnOnce(&mut StockLedger) -> CoreResult<()>,
    {
        let mut tx = self.pool.begin().await?;

        let (inventory, mut ledger) = load_ledger_by_sku(&mut tx, sku).await?;
        op(&mut ledger)?;
        store_ledger(&mut tx, &inventory, &ledger).await?;

        tx.commit().await?;
        Ok(ledger)
    }
}

// =============================================================================
// Transaction Helpers (shared with order workflows)
// =============================================================================

/// Creates an empty inventory row for a variant unless one exists.
pub(crate) async fn ensure_inventory(conn: &mut SqliteConnection, variant_id: &str) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory (id, variant_id, on_hand, reserved, reorder_threshold, updated_at)
        VALUES (?1, ?2, 0, 0, 0, ?3)
        ON CONFLICT(variant_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(variant_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[derive(Debug, FromRow)]
struct LedgerRow {
    sku: String,
    #[sqlx(flatten)]
    inventory: Inventory,
}

impl LedgerRow {
    fn into_parts(self) -> CoreResult<(Inventory, StockLedger)> {
        let ledger = self.inventory.ledger(self.sku)?;
        Ok((self.inventory, ledger))
    }
}

pub(crate) async fn load_ledger_by_sku(
    conn: &mut SqliteConnection,
    sku: &str,
) -> DbResult<(Inventory, StockLedger)> {
    let row = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT v.sku, i.*
        FROM inventory i
        INNER JOIN product_variants v ON v.id = i.variant_id
        WHERE v.sku = ?1
        "#,
    )
    .bind(sku)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Inventory", sku))?;

    Ok(row.into_parts()?)
}

pub(crate) async fn load_ledger_by_variant(
    conn: &mut SqliteConnection,
    variant_id: &str,
) -> DbResult<(Inventory, StockLedger)> {
    let row = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT v.sku, i.*
        FROM inventory i
        INNER JOIN product_variants v ON v.id = i.variant_id
        WHERE i.variant_id = ?1
        "#,
    )
    .bind(variant_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Inventory", variant_id))?;

    Ok(row.into_parts()?)
}

/// Writes the ledger's counters back, failing if the row changed since
/// `loaded` was read.
pub(crate) async fn store_ledger(
    conn: &mut SqliteConnection,
    loaded: &Inventory,
    ledger: &StockLedger,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE inventory SET
            on_hand = ?2,
            reserved = ?3,
            reorder_threshold = ?4,
            updated_at = ?5
        WHERE id = ?1 AND on_hand = ?6 AND reserved = ?7
        "#,
    )
    .bind(&loaded.id)
    .bind(ledger.on_hand())
    .bind(ledger.reserved())
    .bind(ledger.reorder_threshold())
    .bind(Utc::now())
    .bind(loaded.on_hand)
    .bind(loaded.reserved)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::TransactionFailed(format!(
            "inventory for {} changed concurrently",
            ledger.sku()
        )));
    }

    Ok(())
}

impl AdminResource for InventoryRepository {
    type Record = Inventory;
    const ENTITY: &'static str = "Inventory";

    async fn list(&self, params: &ListParams) -> DbResult<Page<Inventory>> {
        fetch_page(&self.pool, &LIST, params).await
    }

    async fn get(&self, id: &str) -> DbResult<Option<Inventory>> {
        let inventory = sqlx::query_as::<_, Inventory>("SELECT * FROM inventory WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(inventory)
    }

    async fn create(&self, inventory: &Inventory) -> DbResult<Inventory> {
        inventory.ledger(&inventory.variant_id)?;
        debug!(variant_id = %inventory.variant_id, "Inserting inventory");

        sqlx::query(
            r#"
            INSERT INTO inventory (id, variant_id, on_hand, reserved, reorder_threshold, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&inventory.id)
        .bind(&inventory.variant_id)
        .bind(inventory.on_hand)
        .bind(inventory.reserved)
        .bind(inventory.reorder_threshold)
        .bind(inventory.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(inventory.clone())
    }

    /// Overwrites the counters. Prefer the ledger operations; this is the
    /// manual correction path.
    async fn update(&self, inventory: &Inventory) -> DbResult<Inventory> {
        inventory.ledger(&inventory.variant_id)?;
        debug!(id = %inventory.id, "Updating inventory");

        let mut updated = inventory.clone();
        updated.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE inventory SET
                on_hand = ?2,
                reserved = ?3,
                reorder_threshold = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(&updated.id)
        .bind(updated.on_hand)
        .bind(updated.reserved)
        .bind(updated.reorder_threshold)
        .bind(updated.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Self::ENTITY, &inventory.id));
        }

        Ok(updated)
    }

    async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM inventory WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Self::ENTITY, id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
