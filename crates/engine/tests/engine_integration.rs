//! End-to-end engine tests over in-memory stores and the mock provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{BuyerId, Money, OrderNo, ProductId};
use domain::{
    Address, OrderStatus, OrderTransition, PaymentRecord, PaymentStatus, ProductStock,
    ShippingInfo,
};
use engine::{Engine, EngineError, NewOrder, NewOrderLine};
use gateway::{GatewayConfig, GatewayError, MockGateway, SettlementEvent, SettlementOutcome};
use store::{InMemoryInventoryStore, InMemoryOrderStore, InMemoryPaymentStore, PaymentStore};

type TestEngine =
    Engine<InMemoryInventoryStore, InMemoryOrderStore, InMemoryPaymentStore, MockGateway>;

fn setup() -> (TestEngine, InMemoryInventoryStore, MockGateway) {
    let inventory = InMemoryInventoryStore::default();
    let orders = InMemoryOrderStore::default();
    let payments = InMemoryPaymentStore::default();
    let gateway = MockGateway::new(GatewayConfig::for_dev("partner-key"));

    let engine = Engine::new(
        inventory.clone(),
        orders.clone(),
        payments.clone(),
        gateway.clone(),
    );
    (engine, inventory, gateway)
}

fn money(s: &str) -> Money {
    s.parse().unwrap()
}

fn address() -> Address {
    Address {
        recipient: "Ada".into(),
        phone: "13800000000".into(),
        detail: "1 Example Road".into(),
    }
}

async fn seed(engine: &TestEngine, product_id: &str, price: &str, stock: u32) {
    engine
        .add_product(ProductStock::new(product_id, product_id, None, money(price), stock))
        .await
        .unwrap();
}

fn order_request(lines: &[(&str, u32)]) -> NewOrder {
    NewOrder {
        buyer_id: BuyerId::new("buyer-1"),
        items: lines
            .iter()
            .map(|(product_id, quantity)| NewOrderLine {
                product_id: ProductId::new(*product_id),
                quantity: *quantity,
            })
            .collect(),
        address: address(),
        remark: None,
    }
}

/// Places an order of 3 units at 10.00 and settles it through a signed
/// webhook body, returning the order number and transaction id.
async fn place_and_pay(engine: &TestEngine, gateway: &MockGateway) -> (OrderNo, String) {
    seed(engine, "SKU-001", "10.00", 5).await;
    let order = engine.create_order(order_request(&[("SKU-001", 3)])).await.unwrap();

    engine.initiate_payment(&order.order_no).await.unwrap();
    let event = gateway.settle_success(&order.order_no, "txn-1");
    let body = gateway.signed_notification(&event);
    engine.handle_notification(&body).await.unwrap();

    (order.order_no, "txn-1".to_string())
}

#[tokio::test]
async fn create_order_reserves_stock_and_snapshots_prices() {
    let (engine, _, _) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;

    let order = engine.create_order(order_request(&[("SKU-001", 3)])).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total, money("30.00"));
    assert_eq!(order.items[0].unit_price, money("10.00"));

    let product = engine.get_product(&ProductId::new("SKU-001")).await.unwrap();
    assert_eq!(product.stock, 2);
    assert_eq!(product.sold, 3);
}

#[tokio::test]
async fn insufficient_stock_rejects_without_movement() {
    let (engine, _, _) = setup();
    seed(&engine, "SKU-001", "10.00", 2).await;

    let err = engine
        .create_order(order_request(&[("SKU-001", 3)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientStock { requested: 3, available: 2, .. }
    ));

    let product = engine.get_product(&ProductId::new("SKU-001")).await.unwrap();
    assert_eq!(product.stock, 2);
    assert_eq!(product.sold, 0);
}

#[tokio::test]
async fn unknown_product_rejects_order() {
    let (engine, _, _) = setup();
    let err = engine
        .create_order(order_request(&[("SKU-404", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ProductNotFound(_)));
}

#[tokio::test]
async fn failed_line_releases_earlier_reservations() {
    let (engine, _, _) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;
    seed(&engine, "SKU-002", "5.00", 1).await;

    let err = engine
        .create_order(order_request(&[("SKU-001", 2), ("SKU-002", 3)]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { .. }));

    let a = engine.get_product(&ProductId::new("SKU-001")).await.unwrap();
    assert_eq!((a.stock, a.sold), (5, 0));
    let b = engine.get_product(&ProductId::new("SKU-002")).await.unwrap();
    assert_eq!((b.stock, b.sold), (1, 0));
}

#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let (engine, _, _) = setup();
    seed(&engine, "SKU-001", "10.00", 3).await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.create_order(order_request(&[("SKU-001", 1)])).await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            placed += 1;
        }
    }
    assert_eq!(placed, 3);

    let product = engine.get_product(&ProductId::new("SKU-001")).await.unwrap();
    assert_eq!((product.stock, product.sold), (0, 3));
}

#[tokio::test]
async fn cancel_returns_stock_exactly_once() {
    let (engine, _, _) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;
    let order = engine.create_order(order_request(&[("SKU-001", 3)])).await.unwrap();

    let cancelled = engine
        .transition(&order.order_no, OrderTransition::Cancel)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let product = engine.get_product(&ProductId::new("SKU-001")).await.unwrap();
    assert_eq!((product.stock, product.sold), (5, 0));

    // A second cancel must neither succeed nor release again.
    let err = engine
        .transition(&order.order_no, OrderTransition::Cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Order(_)));
    let product = engine.get_product(&ProductId::new("SKU-001")).await.unwrap();
    assert_eq!(product.stock, 5);
}

#[tokio::test]
async fn ship_requires_paid_order() {
    let (engine, _, _) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;
    let order = engine.create_order(order_request(&[("SKU-001", 1)])).await.unwrap();

    let err = engine
        .transition(
            &order.order_no,
            OrderTransition::Ship(ShippingInfo {
                carrier: "SF".into(),
                tracking_no: "SF123".into(),
                shipped_at: None,
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Order(_)));
}

#[tokio::test]
async fn signed_notification_marks_order_paid() {
    let (engine, _, gateway) = setup();
    let (order_no, _) = place_and_pay(&engine, &gateway).await;

    let order = engine.get_order(&order_no).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Success);
    assert!(order.paid_at.is_some());

    let payment = engine.query_payment(&order_no).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.transaction_id.as_deref(), Some("txn-1"));
}

#[tokio::test]
async fn duplicate_notification_is_acknowledged_once() {
    let (engine, _, gateway) = setup();
    let (order_no, _) = place_and_pay(&engine, &gateway).await;

    let paid_at = engine.query_payment(&order_no).await.unwrap().paid_at;

    let event = gateway.settle_success(&order_no, "txn-1");
    let body = gateway.signed_notification(&event);
    let receipt = engine.handle_notification(&body).await.unwrap();
    assert!(receipt.duplicate);

    // Replays leave the settled record untouched.
    let payment = engine.query_payment(&order_no).await.unwrap();
    assert_eq!(payment.paid_at, paid_at);
}

#[tokio::test]
async fn tampered_notification_is_rejected_untouched() {
    let (engine, _, gateway) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;
    let order = engine.create_order(order_request(&[("SKU-001", 3)])).await.unwrap();
    engine.initiate_payment(&order.order_no).await.unwrap();

    let event = gateway.settle_success(&order.order_no, "txn-1");
    let body = gateway.signed_notification(&event);

    // Flip the settled amount after signing.
    let mut value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    value["amount_minor"] = serde_json::json!(1);
    let tampered = serde_json::to_vec(&value).unwrap();

    let err = engine.handle_notification(&tampered).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Gateway(GatewayError::UnauthenticatedCallback(_))
    ));

    let order = engine.get_order(&order.order_no).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn amount_mismatch_aborts_settlement() {
    let (engine, _, gateway) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;
    let order = engine.create_order(order_request(&[("SKU-001", 3)])).await.unwrap();
    engine.initiate_payment(&order.order_no).await.unwrap();

    // Properly signed, but settling 29.99 against a 30.00 order.
    let event = SettlementEvent {
        order_no: order.order_no.clone(),
        transaction_id: "txn-1".into(),
        amount_minor: 2999,
        outcome: SettlementOutcome::Success,
        message: None,
    };
    let err = engine.apply_settlement(event).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::AmountMismatch { expected_minor: 3000, reported_minor: 2999, .. }
    ));

    let order = engine.get_order(&order.order_no).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    let payment = engine.query_payment(&order.order_no).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn transaction_id_reuse_rejects_without_marking_paid() {
    let (engine, _, gateway) = setup();
    // Order A settles under txn-1.
    place_and_pay(&engine, &gateway).await;

    let order_b = engine.create_order(order_request(&[("SKU-001", 1)])).await.unwrap();
    engine.initiate_payment(&order_b.order_no).await.unwrap();

    // A second order settling under the same transaction id.
    let event = SettlementEvent {
        order_no: order_b.order_no.clone(),
        transaction_id: "txn-1".into(),
        amount_minor: 1000,
        outcome: SettlementOutcome::Success,
        message: None,
    };
    let err = engine.apply_settlement(event).await.unwrap_err();
    assert!(matches!(err, EngineError::SettlementConflict { .. }));

    // The rejected event must not have moved either record.
    let order = engine.get_order(&order_b.order_no).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    let payment = engine.query_payment(&order_b.order_no).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.transaction_id.is_none());
}

/// Payment store wrapper that stalls every read, for deadline tests.
#[derive(Clone)]
struct StalledPayments {
    inner: InMemoryPaymentStore,
    delay: Duration,
}

#[async_trait]
impl PaymentStore for StalledPayments {
    async fn insert(&self, payment: &PaymentRecord) -> store::Result<()> {
        self.inner.insert(payment).await
    }

    async fn get(&self, order_no: &OrderNo) -> store::Result<Option<PaymentRecord>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(order_no).await
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> store::Result<Option<PaymentRecord>> {
        self.inner.find_by_transaction_id(transaction_id).await
    }

    async fn update_if_status(
        &self,
        payment: &PaymentRecord,
        expected: PaymentStatus,
    ) -> store::Result<bool> {
        self.inner.update_if_status(payment, expected).await
    }
}

#[tokio::test]
async fn slow_settlement_times_out_without_mutation() {
    let inventory = InMemoryInventoryStore::default();
    let orders = InMemoryOrderStore::default();
    let payments = StalledPayments {
        inner: InMemoryPaymentStore::default(),
        delay: Duration::from_millis(200),
    };
    let gateway = MockGateway::new(GatewayConfig::for_dev("partner-key"));
    let engine = Engine::new(
        inventory.clone(),
        orders.clone(),
        payments.clone(),
        gateway.clone(),
    )
    .with_settle_timeout(Duration::from_millis(20));

    engine
        .add_product(ProductStock::new("SKU-001", "SKU-001", None, money("10.00"), 5))
        .await
        .unwrap();
    let order = engine.create_order(order_request(&[("SKU-001", 3)])).await.unwrap();
    engine.initiate_payment(&order.order_no).await.unwrap();

    let event = SettlementEvent {
        order_no: order.order_no.clone(),
        transaction_id: "txn-1".into(),
        amount_minor: 3000,
        outcome: SettlementOutcome::Success,
        message: None,
    };
    let err = engine.apply_settlement(event).await.unwrap_err();
    assert!(matches!(err, EngineError::SettlementTimeout(_)));

    // Deadline hit before the first read finished; nothing moved.
    assert_eq!(
        engine.get_order(&order.order_no).await.unwrap().status,
        OrderStatus::Pending
    );
    let payment = payments.inner.get(&order.order_no).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn failed_settlement_records_error_then_converges_on_success() {
    let (engine, _, gateway) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;
    let order = engine.create_order(order_request(&[("SKU-001", 3)])).await.unwrap();
    engine.initiate_payment(&order.order_no).await.unwrap();

    let failed = SettlementEvent {
        order_no: order.order_no.clone(),
        transaction_id: "txn-1".into(),
        amount_minor: 3000,
        outcome: SettlementOutcome::Failed,
        message: Some("balance insufficient".into()),
    };
    engine.apply_settlement(failed).await.unwrap();

    let payment = engine.query_payment(&order.order_no).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.last_error.as_deref(), Some("balance insufficient"));
    assert_eq!(
        engine.get_order(&order.order_no).await.unwrap().status,
        OrderStatus::Pending
    );

    // The buyer retries and the provider settles for real.
    let event = gateway.settle_success(&order.order_no, "txn-2");
    let body = gateway.signed_notification(&event);
    engine.handle_notification(&body).await.unwrap();

    let payment = engine.query_payment(&order.order_no).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert!(payment.last_error.is_none());
    assert_eq!(
        engine.get_order(&order.order_no).await.unwrap().status,
        OrderStatus::Paid
    );
}

#[tokio::test]
async fn reinitiating_pending_payment_refreshes_prepay() {
    let (engine, _, _) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;
    let order = engine.create_order(order_request(&[("SKU-001", 3)])).await.unwrap();

    let first = engine.initiate_payment(&order.order_no).await.unwrap();
    let second = engine.initiate_payment(&order.order_no).await.unwrap();
    assert_ne!(first.package, second.package);

    let payment = engine.query_payment(&order.order_no).await.unwrap();
    assert_eq!(payment.prepay_id.as_deref(), Some("prepay-0002"));
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn initiating_payment_on_paid_order_is_rejected() {
    let (engine, _, gateway) = setup();
    let (order_no, _) = place_and_pay(&engine, &gateway).await;

    let err = engine.initiate_payment(&order_no).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadySettled(_)));
}

#[tokio::test]
async fn query_payment_polls_provider_for_missed_settlement() {
    let (engine, _, gateway) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;
    let order = engine.create_order(order_request(&[("SKU-001", 3)])).await.unwrap();
    engine.initiate_payment(&order.order_no).await.unwrap();

    // Settled provider-side, but the webhook never arrived.
    gateway.settle_success(&order.order_no, "txn-1");

    let payment = engine.query_payment(&order.order_no).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(
        engine.get_order(&order.order_no).await.unwrap().status,
        OrderStatus::Paid
    );
}

#[tokio::test]
async fn refund_reverses_payment_but_keeps_stock_sold() {
    let (engine, _, gateway) = setup();
    let (order_no, _) = place_and_pay(&engine, &gateway).await;

    let order = engine
        .refund(&order_no, None, "damaged on arrival".into())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    assert_eq!(order.refund.as_ref().unwrap().reason, "damaged on arrival");

    let payment = engine.query_payment(&order_no).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refund_amount, Some(money("30.00")));

    let instruction = gateway.last_refund().unwrap();
    assert_eq!(instruction.refund_minor, 3000);
    assert_eq!(instruction.total_minor, 3000);

    // Goods are still out. Stock comes back through restocking, never here.
    let product = engine.get_product(&ProductId::new("SKU-001")).await.unwrap();
    assert_eq!((product.stock, product.sold), (2, 3));
}

#[tokio::test]
async fn refund_cannot_exceed_paid_amount() {
    let (engine, _, gateway) = setup();
    let (order_no, _) = place_and_pay(&engine, &gateway).await;

    let err = engine
        .refund(&order_no, Some(money("30.01")), "overreach".into())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::RefundExceedsPayment { requested_minor: 3001, paid_minor: 3000 }
    ));

    assert_eq!(gateway.refund_count(), 0);
    assert_eq!(
        engine.query_payment(&order_no).await.unwrap().status,
        PaymentStatus::Success
    );
}

#[tokio::test]
async fn partial_refund_is_recorded() {
    let (engine, _, gateway) = setup();
    let (order_no, _) = place_and_pay(&engine, &gateway).await;

    engine
        .refund(&order_no, Some(money("10.00")), "one unit returned".into())
        .await
        .unwrap();

    let payment = engine.query_payment(&order_no).await.unwrap();
    assert_eq!(payment.refund_amount, Some(money("10.00")));
    assert_eq!(gateway.last_refund().unwrap().refund_minor, 1000);
}

#[tokio::test]
async fn unsettled_payment_is_not_refundable() {
    let (engine, _, _) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;
    let order = engine.create_order(order_request(&[("SKU-001", 3)])).await.unwrap();
    engine.initiate_payment(&order.order_no).await.unwrap();

    let err = engine
        .refund(&order.order_no, None, "too slow".into())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotRefundable(_)));
}

#[tokio::test]
async fn shipped_order_cannot_be_refunded() {
    let (engine, _, gateway) = setup();
    let (order_no, _) = place_and_pay(&engine, &gateway).await;

    engine
        .transition(
            &order_no,
            OrderTransition::Ship(ShippingInfo {
                carrier: "SF".into(),
                tracking_no: "SF123".into(),
                shipped_at: None,
            }),
        )
        .await
        .unwrap();

    let err = engine
        .refund(&order_no, None, "changed my mind".into())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Order(_)));
}

#[tokio::test]
async fn settled_payment_blocks_refund_via_status_update() {
    let (engine, _, gateway) = setup();
    let (order_no, _) = place_and_pay(&engine, &gateway).await;

    // A bare status update cannot skip the provider reversal.
    let err = engine
        .transition(&order_no, OrderTransition::Refund { reason: "shortcut".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RefundRequiresReversal(_)));
    assert_eq!(gateway.refund_count(), 0);

    let order = engine.get_order(&order_no).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(
        engine.query_payment(&order_no).await.unwrap().status,
        PaymentStatus::Success
    );

    // The refund operation itself still goes through.
    let order = engine.refund(&order_no, None, "damaged on arrival".into()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
    assert_eq!(gateway.refund_count(), 1);
}

#[tokio::test]
async fn mark_paid_transition_is_idempotent() {
    let (engine, _, gateway) = setup();
    let (order_no, _) = place_and_pay(&engine, &gateway).await;

    let order = engine
        .transition(&order_no, OrderTransition::MarkPaid)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
}

#[tokio::test]
async fn prepay_failure_surfaces_as_gateway_error() {
    let (engine, _, gateway) = setup();
    seed(&engine, "SKU-001", "10.00", 5).await;
    let order = engine.create_order(order_request(&[("SKU-001", 1)])).await.unwrap();

    gateway.set_fail_on_prepay(true);
    let err = engine.initiate_payment(&order.order_no).await.unwrap_err();
    assert!(matches!(err, EngineError::Gateway(GatewayError::Provider(_))));

    // No record without a prepay handle.
    let err = engine.query_payment(&order.order_no).await.unwrap_err();
    assert!(matches!(err, EngineError::PaymentNotFound(_)));
}
