//! # Coupon Repository
//!
//! Coupons and their redemption history. The rules themselves live in
//! [`DiscountPolicy`]; this repository supplies the counters the policy
//! reads (`times_used`, per-customer redemptions).

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use shopkit_core::{CoreError, Coupon, CouponRedemption, DiscountPolicy, Money};

use crate::admin::{fetch_page, AdminResource, ListParams, ListSpec, Page};
use crate::error::{DbError, DbResult};

const LIST: ListSpec = ListSpec {
    table: "coupons",
    columns: "*",
    search: &["code", "description"],
    status: None,
    sku: None,
    category: None,
    order_by: "created_at DESC, code",
};

/// Repository for coupon database operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let mut conn = self.pool.acquire().await?;
        find_by_code(&mut conn, code).await
    }

    /// Redemptions of a coupon, newest first.
    pub async fn redemptions(&self, coupon_id: &str) -> DbResult<Vec<CouponRedemption>> {
        let redemptions = sqlx::query_as::<_, CouponRedemption>(
            r#"
            SELECT * FROM coupon_redemptions
            WHERE coupon_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(coupon_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(redemptions)
    }

    /// How many times `customer_email` has redeemed the coupon.
    pub async fn customer_redemptions(&self, coupon_id: &str, customer_email: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        count_customer_redemptions(&mut conn, coupon_id, customer_email).await
    }

    /// Previews the discount `code` would give `customer_email` on `amount`,
    /// without redeeming it.
    pub async fn preview_discount(
        &self,
        code: &str,
        customer_email: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> DbResult<Money> {
        let coupon = self
            .get_by_code(code)
            .await?
            .ok_or_else(|| DbError::not_found(Self::ENTITY, code))?;
        let policy = coupon.policy()?;
        let uses = self.customer_redemptions(&coupon.id, customer_email).await?;

        Ok(policy.calculate_discount_for_customer(amount, now, uses)?)
    }
}

pub(crate) async fn find_by_code(conn: &mut SqliteConnection, code: &str) -> DbResult<Option<Coupon>> {
    let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = ?1")
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(coupon)
}

pub(crate) async fn count_customer_redemptions(
    conn: &mut SqliteConnection,
    coupon_id: &str,
    customer_email: &str,
) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM coupon_redemptions
        WHERE coupon_id = ?1 AND customer_email = ?2
        "#,
    )
    .bind(coupon_id)
    .bind(customer_email)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

/// Records a redemption and bumps `times_used`, re-checking the global
/// limit in the same statement.
pub(crate) async fn redeem(
    conn: &mut SqliteConnection,
    coupon: &Coupon,
    policy: &DiscountPolicy,
    order_id: &str,
    customer_email: &str,
    discount: Money,
) -> DbResult<CouponRedemption> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE coupons SET
            times_used = times_used + 1,
            updated_at = ?2
        WHERE id = ?1
        AND (usage_limit IS NULL OR times_used < usage_limit)
        "#,
    )
    .bind(&coupon.id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::not_applicable(
            &policy.code,
            "coupon usage limit reached",
        )
        .into());
    }

    let redemption = CouponRedemption {
        id: Uuid::new_v4().to_string(),
        coupon_id: coupon.id.clone(),
        order_id: order_id.to_string(),
        customer_email: customer_email.to_string(),
        discount_cents: discount.cents(),
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO coupon_redemptions (
            id, coupon_id, order_id, customer_email, discount_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&redemption.id)
    .bind(&redemption.coupon_id)
    .bind(&redemption.order_id)
    .bind(&redemption.customer_email)
    .bind(redemption.discount_cents)
    .bind(redemption.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(redemption)
}

/// Undoes the redemption made by `order_id`, if any.
pub(crate) async fn unredeem(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
    let coupon_ids: Vec<String> =
        sqlx::query_scalar("SELECT coupon_id FROM coupon_redemptions WHERE order_id = ?1")
            .bind(order_id)
            .fetch_all(&mut *conn)
            .await?;

    for coupon_id in &coupon_ids {
        sqlx::query(
            r#"
            UPDATE coupons SET
                times_used = MAX(times_used - 1, 0),
                updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(coupon_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("DELETE FROM coupon_redemptions WHERE order_id = ?1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

    debug!(order_id = %order_id, released = coupon_ids.len(), "Released coupon redemptions");
    Ok(())
}

impl AdminResource for CouponRepository {
    type Record = Coupon;
    const ENTITY: &'static str = "Coupon";

    async fn list(&self, params: &ListParams) -> DbResult<Page<Coupon>> {
        fetch_page(&self.pool, &LIST, params).await
    }

    async fn get(&self, id: &str) -> DbResult<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(coupon)
    }

    /// Validates the coupon's rules before inserting.
    async fn create(&self, coupon: &Coupon) -> DbResult<Coupon> {
        coupon.policy()?;
        debug!(code = %coupon.code, "Inserting coupon");

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, description, discount_type, value,
                max_discount_cents, min_purchase_cents, valid_from, valid_until,
                usage_limit, per_customer_limit, times_used, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&coupon.id)
        .bind(&coupon.code)
        .bind(&coupon.description)
        .bind(coupon.discount_type)
        .bind(coupon.value)
        .bind(coupon.max_discount_cents)
        .bind(coupon.min_purchase_cents)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.usage_limit)
        .bind(coupon.per_customer_limit)
        .bind(coupon.times_used)
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .bind(coupon.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(coupon.clone())
    }

    /// Updates the rules. `times_used` is owned by redemptions and is not
    /// overwritten.
    async fn update(&self, coupon: &Coupon) -> DbResult<Coupon> {
        coupon.policy()?;
        debug!(id = %coupon.id, "Updating coupon");

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE coupons SET
                code = ?2,
                description = ?3,
                discount_type = ?4,
                value = ?5,
                max_discount_cents = ?6,
                min_purchase_cents = ?7,
                valid_from = ?8,
                valid_until = ?9,
                usage_limit = ?10,
                per_customer_limit = ?11,
                is_active = ?12,
                updated_at = ?13
            WHERE id = ?1
            "#,
        )
        .bind(&coupon.id)
        .bind(&coupon.code)
        .bind(&coupon.description)
        .bind(coupon.discount_type)
        .bind(coupon.value)
        .bind(coupon.max_discount_cents)
        .bind(coupon.min_purchase_cents)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.usage_limit)
        .bind(coupon.per_customer_limit)
        .bind(coupon.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Self::ENTITY, &coupon.id));
        }

        self.get(&coupon.id)
            .await?
            .ok_or_else(|| DbError::not_found(Self::ENTITY, &coupon.id))
    }

    /// Deletes the coupon and its redemption history; orders keep their
    /// discount with `coupon_id` cleared.
    async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting coupon");

        let result = sqlx::query("DELETE FROM coupons WHERE id = ?1")
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
