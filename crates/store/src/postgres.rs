//! PostgreSQL store implementations.
//!
//! Every contract the in-memory stores enforce with a write lock is
//! enforced here by a single conditional SQL statement: reservation is a
//! decrement-if-sufficient `UPDATE ... WHERE stock >= $n`, transitions are
//! `UPDATE ... WHERE status = $expected`, and uniqueness (order number,
//! one payment per order, transaction id) is carried by unique keys.
//! Serialization happens at row granularity inside the database, never via
//! a read-then-write in this process.

use async_trait::async_trait;
use common::{BuyerId, Money, OrderNo, ProductId};
use domain::{Order, OrderStatus, PaymentRecord, PaymentStatus, ProductStock};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::traits::{InventoryStore, OrderStore, PaymentStore};
use crate::{Result, StoreError};

/// Runs the schema migrations under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn decode_status<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|e: String| StoreError::Database(sqlx::Error::Decode(e.into())))
}

/// PostgreSQL-backed inventory ledger.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_product(row: &PgRow) -> Result<ProductStock> {
        Ok(ProductStock {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            name: row.try_get("name")?,
            image: row.try_get("image")?,
            price: Money::from(row.try_get::<Decimal, _>("price")?),
            stock: row.try_get::<i64, _>("stock")? as u32,
            sold: row.try_get::<i64, _>("sold")? as u32,
        })
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn insert(&self, product: ProductStock) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (product_id, name, image, price, stock, sold)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(product.product_id.as_str())
        .bind(&product.name)
        .bind(&product.image)
        .bind(product.price.amount())
        .bind(product.stock as i64)
        .bind(product.sold as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateKey {
                    entity: "product",
                    key: product.product_id.to_string(),
                }
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn get(&self, product_id: &ProductId) -> Result<Option<ProductStock>> {
        let row = sqlx::query(
            "SELECT product_id, name, image, price, stock, sold
             FROM products WHERE product_id = $1",
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_product(&r)).transpose()
    }

    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<ProductStock> {
        let row = sqlx::query(
            "UPDATE products
             SET stock = stock - $2, sold = sold + $2
             WHERE product_id = $1 AND stock >= $2
             RETURNING product_id, name, image, price, stock, sold",
        )
        .bind(product_id.as_str())
        .bind(quantity as i64)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_product(&row),
            // Conditional update rejected: distinguish missing product
            // from insufficient stock for the error report.
            None => match self.get(product_id).await? {
                Some(product) => Err(StoreError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested: quantity,
                    available: product.stock,
                }),
                None => Err(StoreError::NotFound {
                    entity: "product",
                    key: product_id.to_string(),
                }),
            },
        }
    }

    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products
             SET stock = stock + $2, sold = sold - $2
             WHERE product_id = $1 AND sold >= $2",
        )
        .bind(product_id.as_str())
        .bind(quantity as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        match self.get(product_id).await? {
            Some(_) => Err(StoreError::InvariantViolation {
                product_id: product_id.clone(),
                requested: quantity,
            }),
            None => Err(StoreError::NotFound {
                entity: "product",
                key: product_id.to_string(),
            }),
        }
    }
}

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let shipping = row
            .try_get::<Option<serde_json::Value>, _>("shipping")?
            .map(serde_json::from_value)
            .transpose()?;
        let refund = row
            .try_get::<Option<serde_json::Value>, _>("refund")?
            .map(serde_json::from_value)
            .transpose()?;

        Ok(Order {
            order_no: OrderNo::new(row.try_get::<String, _>("order_no")?),
            buyer_id: BuyerId::new(row.try_get::<String, _>("buyer_id")?),
            items: serde_json::from_value(row.try_get("items")?)?,
            address: serde_json::from_value(row.try_get("address")?)?,
            total: Money::from(row.try_get::<Decimal, _>("total")?),
            status: decode_status(row.try_get::<String, _>("status")?.as_str())?,
            payment_status: decode_status(row.try_get::<String, _>("payment_status")?.as_str())?,
            shipping,
            refund,
            remark: row.try_get("remark")?,
            created_at: row.try_get("created_at")?,
            paid_at: row.try_get("paid_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders
             (order_no, buyer_id, items, address, total, status, payment_status,
              shipping, refund, remark, created_at, paid_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(order.order_no.as_str())
        .bind(order.buyer_id.as_str())
        .bind(serde_json::to_value(&order.items)?)
        .bind(serde_json::to_value(&order.address)?)
        .bind(order.total.amount())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(
            order
                .shipping
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(order.refund.as_ref().map(serde_json::to_value).transpose()?)
        .bind(&order.remark)
        .bind(order.created_at)
        .bind(order.paid_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateKey {
                    entity: "order",
                    key: order.order_no.to_string(),
                }
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn get(&self, order_no: &OrderNo) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT order_no, buyer_id, items, address, total, status, payment_status,
                    shipping, refund, remark, created_at, paid_at
             FROM orders WHERE order_no = $1",
        )
        .bind(order_no.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_order(&r)).transpose()
    }

    async fn update_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        // Line items, address, buyer, and total are immutable after
        // placement and deliberately absent from the SET list.
        let result = sqlx::query(
            "UPDATE orders
             SET status = $2, payment_status = $3, shipping = $4, refund = $5, paid_at = $6
             WHERE order_no = $1 AND status = $7",
        )
        .bind(order.order_no.as_str())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(
            order
                .shipping
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(order.refund.as_ref().map(serde_json::to_value).transpose()?)
        .bind(order.paid_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        // Distinguish a lost conditional update from a missing order.
        match self.get(&order.order_no).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                entity: "order",
                key: order.order_no.to_string(),
            }),
        }
    }
}

/// PostgreSQL-backed payment record store.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: &PgRow) -> Result<PaymentRecord> {
        Ok(PaymentRecord {
            order_no: OrderNo::new(row.try_get::<String, _>("order_no")?),
            buyer_id: BuyerId::new(row.try_get::<String, _>("buyer_id")?),
            amount: Money::from(row.try_get::<Decimal, _>("amount")?),
            status: decode_status(row.try_get::<String, _>("status")?.as_str())?,
            transaction_id: row.try_get("transaction_id")?,
            prepay_id: row.try_get("prepay_id")?,
            paid_at: row.try_get("paid_at")?,
            refunded_at: row.try_get("refunded_at")?,
            refund_amount: row
                .try_get::<Option<Decimal>, _>("refund_amount")?
                .map(Money::from),
            refund_reason: row.try_get("refund_reason")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn insert(&self, payment: &PaymentRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO payments
             (order_no, buyer_id, amount, status, transaction_id, prepay_id,
              paid_at, refunded_at, refund_amount, refund_reason, last_error, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(payment.order_no.as_str())
        .bind(payment.buyer_id.as_str())
        .bind(payment.amount.amount())
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.prepay_id)
        .bind(payment.paid_at)
        .bind(payment.refunded_at)
        .bind(payment.refund_amount.map(|m| m.amount()))
        .bind(&payment.refund_reason)
        .bind(&payment.last_error)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateKey {
                    entity: "payment",
                    key: payment.order_no.to_string(),
                }
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn get(&self, order_no: &OrderNo) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(
            "SELECT order_no, buyer_id, amount, status, transaction_id, prepay_id,
                    paid_at, refunded_at, refund_amount, refund_reason, last_error, created_at
             FROM payments WHERE order_no = $1",
        )
        .bind(order_no.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_payment(&r)).transpose()
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(
            "SELECT order_no, buyer_id, amount, status, transaction_id, prepay_id,
                    paid_at, refunded_at, refund_amount, refund_reason, last_error, created_at
             FROM payments WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_payment(&r)).transpose()
    }

    async fn update_if_status(
        &self,
        payment: &PaymentRecord,
        expected: PaymentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = $2, transaction_id = $3, prepay_id = $4, paid_at = $5,
                 refunded_at = $6, refund_amount = $7, refund_reason = $8, last_error = $9
             WHERE order_no = $1 AND status = $10",
        )
        .bind(payment.order_no.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.prepay_id)
        .bind(payment.paid_at)
        .bind(payment.refunded_at)
        .bind(payment.refund_amount.map(|m| m.amount()))
        .bind(&payment.refund_reason)
        .bind(&payment.last_error)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // The unique key on transaction_id turns identifier reuse into
            // a hard conflict instead of a silently shared settlement.
            if is_unique_violation(&e) {
                StoreError::DuplicateKey {
                    entity: "transaction_id",
                    key: payment.transaction_id.clone().unwrap_or_default(),
                }
            } else {
                StoreError::from(e)
            }
        })?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get(&payment.order_no).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                entity: "payment",
                key: payment.order_no.to_string(),
            }),
        }
    }
}
