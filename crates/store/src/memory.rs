//! In-memory store implementations.
//!
//! Used by tests and the default dev wiring. They enforce the same
//! conditional-update contracts as the PostgreSQL implementations: every
//! check-and-mutate happens inside a single write-lock critical section,
//! which is the in-process equivalent of an atomic conditional update.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderNo, ProductId};
use domain::{Order, OrderStatus, PaymentRecord, PaymentStatus, ProductStock};
use tokio::sync::RwLock;

use crate::traits::{InventoryStore, OrderStore, PaymentStore};
use crate::{Result, StoreError};

/// In-memory inventory ledger.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    products: Arc<RwLock<HashMap<ProductId, ProductStock>>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn insert(&self, product: ProductStock) -> Result<()> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.product_id) {
            return Err(StoreError::DuplicateKey {
                entity: "product",
                key: product.product_id.to_string(),
            });
        }
        products.insert(product.product_id.clone(), product);
        Ok(())
    }

    async fn get(&self, product_id: &ProductId) -> Result<Option<ProductStock>> {
        Ok(self.products.read().await.get(product_id).cloned())
    }

    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<ProductStock> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "product",
                key: product_id.to_string(),
            })?;

        if product.stock < quantity {
            return Err(StoreError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
                available: product.stock,
            });
        }

        product.stock -= quantity;
        product.sold += quantity;
        Ok(product.clone())
    }

    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "product",
                key: product_id.to_string(),
            })?;

        if product.sold < quantity {
            return Err(StoreError::InvariantViolation {
                product_id: product_id.clone(),
                requested: quantity,
            });
        }

        product.stock += quantity;
        product.sold -= quantity;
        Ok(())
    }
}

/// In-memory order store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderNo, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_no) {
            return Err(StoreError::DuplicateKey {
                entity: "order",
                key: order.order_no.to_string(),
            });
        }
        orders.insert(order.order_no.clone(), order.clone());
        Ok(())
    }

    async fn get(&self, order_no: &OrderNo) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(order_no).cloned())
    }

    async fn update_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.order_no)
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                key: order.order_no.to_string(),
            })?;

        if stored.status != expected {
            return Ok(false);
        }
        *stored = order.clone();
        Ok(true)
    }
}

/// In-memory payment record store.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<OrderNo, PaymentRecord>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: &PaymentRecord) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.order_no) {
            return Err(StoreError::DuplicateKey {
                entity: "payment",
                key: payment.order_no.to_string(),
            });
        }
        payments.insert(payment.order_no.clone(), payment.clone());
        Ok(())
    }

    async fn get(&self, order_no: &OrderNo) -> Result<Option<PaymentRecord>> {
        Ok(self.payments.read().await.get(order_no).cloned())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn update_if_status(
        &self,
        payment: &PaymentRecord,
        expected: PaymentStatus,
    ) -> Result<bool> {
        let mut payments = self.payments.write().await;

        if let Some(txn_id) = payment.transaction_id.as_deref() {
            let reused = payments.values().any(|p| {
                p.order_no != payment.order_no && p.transaction_id.as_deref() == Some(txn_id)
            });
            if reused {
                return Err(StoreError::DuplicateKey {
                    entity: "transaction_id",
                    key: txn_id.to_string(),
                });
            }
        }

        let stored = payments
            .get_mut(&payment.order_no)
            .ok_or_else(|| StoreError::NotFound {
                entity: "payment",
                key: payment.order_no.to_string(),
            })?;

        if stored.status != expected {
            return Ok(false);
        }
        *stored = payment.clone();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{BuyerId, Money};
    use domain::{Address, OrderItem, generate_order_no};

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn widget(stock: u32) -> ProductStock {
        ProductStock::new("SKU-001", "Widget", None, money("10.00"), stock)
    }

    fn order() -> Order {
        Order::place(
            generate_order_no(),
            BuyerId::new("buyer-1"),
            vec![OrderItem::new("SKU-001", "Widget", None, 2, money("10.00"))],
            Address {
                recipient: "Ada".into(),
                phone: "13800000000".into(),
                detail: "1 Example Road".into(),
            },
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn payment(order_no: OrderNo) -> PaymentRecord {
        PaymentRecord::initiate(
            order_no,
            BuyerId::new("buyer-1"),
            money("20.00"),
            "prepay-1".into(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn reserve_decrements_and_counts_sales() {
        let store = InMemoryInventoryStore::new();
        store.insert(widget(5)).await.unwrap();

        let after = store.reserve(&ProductId::new("SKU-001"), 3).await.unwrap();
        assert_eq!(after.stock, 2);
        assert_eq!(after.sold, 3);
    }

    #[tokio::test]
    async fn reserve_rejects_insufficient_stock_without_mutation() {
        let store = InMemoryInventoryStore::new();
        store.insert(widget(2)).await.unwrap();
        let id = ProductId::new("SKU-001");

        let err = store.reserve(&id, 3).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));

        let product = store.get(&id).await.unwrap().unwrap();
        assert_eq!(product.stock, 2);
        assert_eq!(product.sold, 0);
    }

    #[tokio::test]
    async fn reserve_unknown_product_is_not_found() {
        let store = InMemoryInventoryStore::new();
        let err = store.reserve(&ProductId::new("SKU-404"), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn release_restores_stock() {
        let store = InMemoryInventoryStore::new();
        store.insert(widget(5)).await.unwrap();
        let id = ProductId::new("SKU-001");

        store.reserve(&id, 3).await.unwrap();
        store.release(&id, 3).await.unwrap();

        let product = store.get(&id).await.unwrap().unwrap();
        assert_eq!(product.stock, 5);
        assert_eq!(product.sold, 0);
    }

    #[tokio::test]
    async fn release_beyond_sold_is_an_invariant_violation() {
        let store = InMemoryInventoryStore::new();
        store.insert(widget(5)).await.unwrap();
        let id = ProductId::new("SKU-001");

        store.reserve(&id, 1).await.unwrap();
        let err = store.release(&id, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation { .. }));

        // Nothing clamped, nothing mutated.
        let product = store.get(&id).await.unwrap().unwrap();
        assert_eq!(product.stock, 4);
        assert_eq!(product.sold, 1);
    }

    #[tokio::test]
    async fn concurrent_reservations_never_oversell() {
        let store = InMemoryInventoryStore::new();
        store.insert(widget(3)).await.unwrap();
        let id = ProductId::new("SKU-001");

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(
                async move { store.reserve(&id, 1).await.is_ok() },
            ));
        }

        let mut won = 0;
        for handle in handles {
            if handle.await.unwrap() {
                won += 1;
            }
        }

        assert_eq!(won, 3);
        let product = store.get(&id).await.unwrap().unwrap();
        assert_eq!(product.stock, 0);
        assert_eq!(product.sold, 3);
    }

    #[tokio::test]
    async fn duplicate_order_insert_conflicts() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.insert(&order).await.unwrap();
        let err = store.insert(&order).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { entity: "order", .. }));
    }

    #[tokio::test]
    async fn order_conditional_update_requires_expected_status() {
        let store = InMemoryOrderStore::new();
        let mut order = order();
        store.insert(&order).await.unwrap();

        order
            .apply(domain::OrderTransition::MarkPaid, Utc::now())
            .unwrap();

        // Wrong expectation loses without mutating.
        assert!(
            !store
                .update_if_status(&order, OrderStatus::Paid)
                .await
                .unwrap()
        );
        let stored = store.get(&order.order_no).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);

        // Correct expectation wins exactly once.
        assert!(
            store
                .update_if_status(&order, OrderStatus::Pending)
                .await
                .unwrap()
        );
        assert!(
            !store
                .update_if_status(&order, OrderStatus::Pending)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn one_payment_record_per_order() {
        let store = InMemoryPaymentStore::new();
        let record = payment(OrderNo::new("2501150042123456"));
        store.insert(&record).await.unwrap();
        let err = store.insert(&record).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateKey {
                entity: "payment",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn transaction_id_reuse_across_orders_is_rejected() {
        let store = InMemoryPaymentStore::new();
        let mut first = payment(OrderNo::new("2501150042000001"));
        let mut second = payment(OrderNo::new("2501150042000002"));
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        first.status = PaymentStatus::Success;
        first.transaction_id = Some("txn-1".into());
        assert!(
            store
                .update_if_status(&first, PaymentStatus::Pending)
                .await
                .unwrap()
        );

        second.status = PaymentStatus::Success;
        second.transaction_id = Some("txn-1".into());
        let err = store
            .update_if_status(&second, PaymentStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateKey {
                entity: "transaction_id",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn find_by_transaction_id_returns_the_attached_record() {
        let store = InMemoryPaymentStore::new();
        let mut record = payment(OrderNo::new("2501150042000001"));
        store.insert(&record).await.unwrap();

        assert!(
            store
                .find_by_transaction_id("txn-1")
                .await
                .unwrap()
                .is_none()
        );

        record.status = PaymentStatus::Success;
        record.transaction_id = Some("txn-1".into());
        assert!(
            store
                .update_if_status(&record, PaymentStatus::Pending)
                .await
                .unwrap()
        );

        let found = store.find_by_transaction_id("txn-1").await.unwrap().unwrap();
        assert_eq!(found.order_no, record.order_no);
    }

    #[tokio::test]
    async fn payment_conditional_update_is_single_winner() {
        let store = InMemoryPaymentStore::new();
        let mut record = payment(OrderNo::new("2501150042123456"));
        store.insert(&record).await.unwrap();

        record.status = PaymentStatus::Success;
        record.transaction_id = Some("txn-9".into());

        assert!(
            store
                .update_if_status(&record, PaymentStatus::Pending)
                .await
                .unwrap()
        );
        // Second application observes the settled status and loses.
        assert!(
            !store
                .update_if_status(&record, PaymentStatus::Pending)
                .await
                .unwrap()
        );
    }
}
