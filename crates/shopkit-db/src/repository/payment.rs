//! # Payment Repository
//!
//! Payments recorded against orders. The order's `payment_status` follows
//! its payments:
//!
//! ```text
//! order total is zero                  → paid
//! paid sum >= order total              → paid
//! nothing paid, something refunded     → refunded
//! otherwise                            → pending
//! ```
//!
//! Nothing else writes `orders.payment_status`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use shopkit_core::validation::validate_payment_amount;
use shopkit_core::{Money, Payment, PaymentMethod, PaymentStatus, ValidationError};

use crate::admin::{fetch_page, AdminResource, Clause, ListParams, ListSpec, Page};
use crate::error::{DbError, DbResult};
use crate::repository::order::set_payment_status;

const LIST: ListSpec = ListSpec {
    table: "payments",
    columns: "*",
    search: &["transaction_id"],
    status: Some(Clause::eq("status = ")),
    sku: None,
    category: None,
    order_by: "created_at DESC",
};

/// A payment to record against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub order_id: String,
    pub transaction_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub status: PaymentStatus,
}

/// Repository for payment database operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Records a payment and brings the order's payment status up to date.
    pub async fn record_payment(&self, payment: NewPayment) -> DbResult<Payment> {
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            order_id: payment.order_id,
            transaction_id: payment.transaction_id,
            method: payment.method,
            amount_cents: payment.amount_cents,
            status: payment.status,
            created_at: Utc::now(),
        };
        self.create(&payment).await
    }

    /// Sum of the order's paid payments.
    pub async fn total_paid(&self, order_id: &str) -> DbResult<Money> {
        let mut conn = self.pool.acquire().await?;
        sum_by_status(&mut conn, order_id, PaymentStatus::Paid).await
    }

    pub async fn for_order(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        payments_of(&mut conn, order_id).await
    }

    /// Changes a payment's status (e.g. pending → paid, paid → refunded).
    pub async fn update_status(&self, payment_id: &str, status: PaymentStatus) -> DbResult<Payment> {
        let mut tx = self.pool.begin().await?;

        let mut payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", payment_id))?;

        sqlx::query("UPDATE payments SET status = ?2 WHERE id = ?1")
            .bind(payment_id)
            .bind(status)
            .execute(&mut *tx)
            .await?;
        payment.status = status;

        sync_order_payment_status(&mut tx, &payment.order_id).await?;
        tx.commit().await?;

        info!(transaction_id = %payment.transaction_id, status = %status, "Payment status changed");
        Ok(payment)
    }
}

pub(crate) async fn payments_of(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(
        r#"
        SELECT * FROM payments
        WHERE order_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(payments)
}

async fn sum_by_status(
    conn: &mut SqliteConnection,
    order_id: &str,
    status: PaymentStatus,
) -> DbResult<Money> {
    let cents: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE order_id = ?1 AND status = ?2",
    )
    .bind(order_id)
    .bind(status)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Money::from_cents(cents))
}

async fn sync_order_payment_status(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
    let total: i64 = sqlx::query_scalar("SELECT total_cents FROM orders WHERE id = ?1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Order", order_id))?;

    let paid = sum_by_status(conn, order_id, PaymentStatus::Paid).await?;
    let refunded = sum_by_status(conn, order_id, PaymentStatus::Refunded).await?;

    let status = derive_payment_status(Money::from_cents(total), paid, refunded);

    debug!(order_id = %order_id, paid = %paid, status = %status, "Syncing order payment status");
    set_payment_status(conn, order_id, status).await
}

/// An order's payment status given its total and the sums of its paid and
/// refunded payments. An order with nothing to pay is paid.
pub(crate) fn derive_payment_status(total: Money, paid: Money, refunded: Money) -> PaymentStatus {
    if total.is_zero() || (paid.is_positive() && paid >= total) {
        PaymentStatus::Paid
    } else if paid.is_zero() && refunded.is_positive() {
        PaymentStatus::Refunded
    } else {
        PaymentStatus::Pending
    }
}

fn validate_payment(payment: &Payment) -> DbResult<()> {
    validate_payment_amount(payment.amount_cents)?;
    if payment.transaction_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "transaction_id".to_string(),
        }
        .into());
    }
    Ok(())
}

impl AdminResource for PaymentRepository {
    type Record = Payment;
    const ENTITY: &'static str = "Payment";

    async fn list(&self, params: &ListParams) -> DbResult<Page<Payment>> {
        fetch_page(&self.pool, &LIST, params).await
    }

    async fn get(&self, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    async fn create(&self, payment: &Payment) -> DbResult<Payment> {
        validate_payment(payment)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, transaction_id, method, amount_cents, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(&payment.transaction_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(payment.status)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        sync_order_payment_status(&mut tx, &payment.order_id).await?;
        tx.commit().await?;

        info!(
            transaction_id = %payment.transaction_id,
            amount = %payment.amount(),
            method = %payment.method,
            "Payment recorded"
        );
        Ok(payment.clone())
    }

    /// Method, amount and status are editable; the order link is not.
    async fn update(&self, payment: &Payment) -> DbResult<Payment> {
        validate_payment(payment)?;
        debug!(id = %payment.id, "Updating payment");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE payments SET
                transaction_id = ?2,
                method = ?3,
                amount_cents = ?4,
                status = ?5
            WHERE id = ?1
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.transaction_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(payment.status)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Self::ENTITY, &payment.id));
        }

        let stored = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
            .bind(&payment.id)
            .fetch_one(&mut *tx)
            .await?;

        sync_order_payment_status(&mut tx, &stored.order_id).await?;
        tx.commit().await?;

        Ok(stored)
    }

    async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting payment");

        let mut tx = self.pool.begin().await?;

        let order_id: String = sqlx::query_scalar("SELECT order_id FROM payments WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found(Self::ENTITY, id))?;

        sqlx::query("DELETE FROM payments WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sync_order_payment_status(&mut tx, &order_id).await?;
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
    use crate::repository::order::NewOrder;
    use crate::repository::test_support::{seed_variant, test_db};
    use crate::Database;
    use shopkit_core::{CheckoutSettings, CoreError, Order};

    async fn placed_order(db: &Database) -> Order {
        seed_variant(db, "TEE-M", 2500, 10).await;
        db.orders()
            .place_order(
                NewOrder::new("ada@example.com").line("TEE-M", 2),
                &CheckoutSettings::default(),
            )
            .await
            .unwrap()
            .order
    }

    fn payment(order_id: &str, txn: &str, cents: i64, status: PaymentStatus) -> NewPayment {
        NewPayment {
            order_id: order_id.to_string(),
            transaction_id: txn.to_string(),
            method: PaymentMethod::Card,
            amount_cents: cents,
            status,
        }
    }

    #[test]
    fn test_derive_payment_status() {
        let cents = Money::from_cents;

        assert_eq!(derive_payment_status(cents(5000), cents(0), cents(0)), PaymentStatus::Pending);
        assert_eq!(derive_payment_status(cents(5000), cents(4999), cents(0)), PaymentStatus::Pending);
        assert_eq!(derive_payment_status(cents(5000), cents(5000), cents(0)), PaymentStatus::Paid);
        assert_eq!(derive_payment_status(cents(5000), cents(0), cents(5000)), PaymentStatus::Refunded);

        // Nothing to pay
        assert_eq!(derive_payment_status(cents(0), cents(0), cents(0)), PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_partial_then_full_payment() {
        let db = test_db().await;
        let order = placed_order(&db).await;
        let repo = db.payments();

        repo.record_payment(payment(&order.id, "TXN-1", 2000, PaymentStatus::Paid))
            .await
            .unwrap();
        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);

        repo.record_payment(payment(&order.id, "TXN-2", 3000, PaymentStatus::Paid))
            .await
            .unwrap();
        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);

        assert_eq!(repo.total_paid(&order.id).await.unwrap(), Money::from_cents(5000));
        assert_eq!(repo.for_order(&order.id).await.unwrap().len(), 2);

        let detail = db.orders().detail(&order.id).await.unwrap().unwrap();
        assert_eq!(detail.payments.len(), 2);
    }

    #[tokio::test]
    async fn test_refund_updates_order() {
        let db = test_db().await;
        let order = placed_order(&db).await;
        let repo = db.payments();

        let p = repo
            .record_payment(payment(&order.id, "TXN-1", 5000, PaymentStatus::Paid))
            .await
            .unwrap();
        repo.update_status(&p.id, PaymentStatus::Refunded).await.unwrap();

        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Refunded);
        assert!(repo.total_paid(&order.id).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_invalid_payments_rejected() {
        let db = test_db().await;
        let order = placed_order(&db).await;
        let repo = db.payments();

        assert!(matches!(
            repo.record_payment(payment(&order.id, "TXN-1", 0, PaymentStatus::Paid)).await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
        assert!(matches!(
            repo.record_payment(payment(&order.id, "  ", 100, PaymentStatus::Paid)).await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
        assert!(matches!(
            repo.record_payment(payment("missing", "TXN-2", 100, PaymentStatus::Paid)).await,
            Err(DbError::ForeignKeyViolation { .. })
        ));

        repo.record_payment(payment(&order.id, "TXN-3", 100, PaymentStatus::Pending))
            .await
            .unwrap();
        assert!(matches!(
            repo.record_payment(payment(&order.id, "TXN-3", 100, PaymentStatus::Pending)).await,
            Err(DbError::UniqueViolation { field, .. }) if field == "payments.transaction_id"
        ));
    }

    #[tokio::test]
    async fn test_admin_list_and_delete() {
        let db = test_db().await;
        let order = placed_order(&db).await;
        let repo = db.payments();

        let p = repo
            .record_payment(payment(&order.id, "TXN-ABC", 5000, PaymentStatus::Paid))
            .await
            .unwrap();
        repo.record_payment(payment(&order.id, "TXN-XYZ", 100, PaymentStatus::Failed))
            .await
            .unwrap();

        let page = repo.list(&ListParams::new().status(PaymentStatus::Failed)).await.unwrap();
        assert_eq!(page.total, 1);
        let page = repo.list(&ListParams::new().search("abc")).await.unwrap();
        assert_eq!(page.items[0].id, p.id);

        repo.delete(&p.id).await.unwrap();
        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert!(matches!(repo.delete(&p.id).await, Err(DbError::NotFound { .. })));
    }
}
