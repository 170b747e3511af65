//! Order lifecycle coordinator.

use std::time::Duration;

use chrono::Utc;
use common::{BuyerId, Money, OrderNo, ProductId};
use domain::{
    Order, OrderError, OrderItem, OrderStatus, OrderTransition, PaymentRecord, PaymentStatus,
    ProductStock, generate_order_no,
};
use gateway::{PayParams, PaymentGateway, RefundRequest, SettlementEvent, SettlementOutcome};
use serde::{Deserialize, Serialize};
use store::{InventoryStore, OrderStore, PaymentStore, StoreError};

use crate::error::{EngineError, Result};

/// How many freshly generated order numbers to try before giving up on a
/// key collision.
const ORDER_NO_ATTEMPTS: usize = 5;

const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// A requested order line, by product reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A request to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub buyer_id: BuyerId,
    pub items: Vec<NewOrderLine>,
    pub address: domain::Address,
    #[serde(default)]
    pub remark: Option<String>,
}

/// Outcome of applying a settlement event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub order_no: OrderNo,
    /// True when the event had already been applied under the same
    /// transaction id. Duplicates are acknowledged, not retried.
    pub duplicate: bool,
}

/// Coordinates orders, inventory and payments.
///
/// All cross-record consistency lives here: stock is reserved before an
/// order exists and released on cancellation, order status moves through
/// conditional updates keyed on the prior status, and provider settlement
/// events are applied exactly once per transaction id.
pub struct Engine<I, O, P, G>
where
    I: InventoryStore,
    O: OrderStore,
    P: PaymentStore,
    G: PaymentGateway,
{
    inventory: I,
    orders: O,
    payments: P,
    gateway: G,
    settle_timeout: Duration,
}

impl<I, O, P, G> Engine<I, O, P, G>
where
    I: InventoryStore,
    O: OrderStore,
    P: PaymentStore,
    G: PaymentGateway,
{
    /// Creates an engine with the default settlement deadline.
    pub fn new(inventory: I, orders: O, payments: P, gateway: G) -> Self {
        Self {
            inventory,
            orders,
            payments,
            gateway,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }

    /// Overrides the settlement processing deadline.
    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    /// Registers a product with its opening stock.
    pub async fn add_product(&self, product: ProductStock) -> Result<()> {
        self.inventory.insert(product).await?;
        Ok(())
    }

    /// Returns a product's current stock record.
    pub async fn get_product(&self, product_id: &ProductId) -> Result<ProductStock> {
        self.inventory
            .get(product_id)
            .await?
            .ok_or_else(|| EngineError::ProductNotFound(product_id.clone()))
    }

    /// Places an order: reserves stock for every line, then persists the
    /// order with line items snapshotted from the catalog.
    ///
    /// Reservation is all or nothing. If any line cannot be covered, every
    /// line reserved so far is released and the order is rejected without
    /// a trace.
    #[tracing::instrument(skip(self, request), fields(buyer_id = %request.buyer_id))]
    pub async fn create_order(&self, request: NewOrder) -> Result<Order> {
        if request.items.is_empty() {
            return Err(OrderError::NoItems.into());
        }
        for line in &request.items {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                }
                .into());
            }
        }

        let mut reserved: Vec<(ProductId, u32)> = Vec::with_capacity(request.items.len());
        let mut items: Vec<OrderItem> = Vec::with_capacity(request.items.len());

        for line in &request.items {
            match self.inventory.reserve(&line.product_id, line.quantity).await {
                Ok(product) => {
                    reserved.push((line.product_id.clone(), line.quantity));
                    items.push(OrderItem::new(
                        product.product_id,
                        product.name,
                        product.image,
                        line.quantity,
                        product.price,
                    ));
                }
                Err(err) => {
                    self.release_reserved(&reserved).await;
                    metrics::counter!("orders_rejected_total").increment(1);
                    return Err(match err {
                        StoreError::NotFound { .. } => {
                            EngineError::ProductNotFound(line.product_id.clone())
                        }
                        StoreError::InsufficientStock {
                            product_id,
                            requested,
                            available,
                        } => EngineError::InsufficientStock {
                            product_id,
                            requested,
                            available,
                        },
                        other => other.into(),
                    });
                }
            }
        }

        let mut attempt = 0;
        loop {
            let order = Order::place(
                generate_order_no(),
                request.buyer_id.clone(),
                items.clone(),
                request.address.clone(),
                request.remark.clone(),
                Utc::now(),
            )?;

            match self.orders.insert(&order).await {
                Ok(()) => {
                    metrics::counter!("orders_created_total").increment(1);
                    tracing::info!(order_no = %order.order_no, total = %order.total, "order placed");
                    return Ok(order);
                }
                Err(StoreError::DuplicateKey { .. }) if attempt + 1 < ORDER_NO_ATTEMPTS => {
                    attempt += 1;
                    tracing::warn!(attempt, "order number collision, regenerating");
                }
                Err(err) => {
                    self.release_reserved(&reserved).await;
                    return Err(err.into());
                }
            }
        }
    }

    /// Loads an order by number.
    pub async fn get_order(&self, order_no: &OrderNo) -> Result<Order> {
        self.orders
            .get(order_no)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(order_no.clone()))
    }

    /// Applies a status transition to an order.
    ///
    /// `mark-paid` on an already paid order is an idempotent no-op. A
    /// cancellation that wins the status race returns every reserved line
    /// to stock; a refund never does.
    #[tracing::instrument(skip(self), fields(action = transition.name()))]
    pub async fn transition(
        &self,
        order_no: &OrderNo,
        transition: OrderTransition,
    ) -> Result<Order> {
        let order = self.get_order(order_no).await?;

        if transition == OrderTransition::MarkPaid && order.status == OrderStatus::Paid {
            return Ok(order);
        }

        // A settled charge has to be reversed at the provider; marking the
        // order refunded through a bare status update would strand the
        // buyer's money. The refund operation flips the record first and
        // then comes back through here.
        if matches!(transition, OrderTransition::Refund { .. }) {
            if let Some(payment) = self.payments.get(order_no).await? {
                if payment.status == PaymentStatus::Success {
                    return Err(EngineError::RefundRequiresReversal(order_no.clone()));
                }
            }
        }

        let action = transition.name();
        let expected = order.status;
        let mut updated = order.clone();
        updated.apply(transition.clone(), Utc::now())?;

        if !self.orders.update_if_status(&updated, expected).await? {
            // A concurrent writer moved the order first.
            let current = self.get_order(order_no).await?;
            if transition == OrderTransition::MarkPaid && current.status == OrderStatus::Paid {
                return Ok(current);
            }
            return Err(EngineError::TransitionConflict(order_no.clone()));
        }

        if transition == OrderTransition::Cancel {
            self.release_lines(&updated).await;
        }

        metrics::counter!("order_transitions_total", "action" => action).increment(1);
        tracing::info!(%order_no, from = %expected, to = %updated.status, "order transitioned");
        Ok(updated)
    }

    /// Initiates payment for a pending order and returns the client-side
    /// payment parameters.
    ///
    /// Re-initiating while still pending refreshes the prepay handle on the
    /// existing record instead of creating a second one.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_payment(&self, order_no: &OrderNo) -> Result<PayParams> {
        let order = self.get_order(order_no).await?;
        match order.status {
            OrderStatus::Pending => {}
            OrderStatus::Paid => return Err(EngineError::AlreadySettled(order_no.clone())),
            from => {
                return Err(OrderError::InvalidTransition {
                    from,
                    requested: OrderStatus::Paid,
                }
                .into());
            }
        }

        let amount_minor = order.total.minor_units();

        if let Some(existing) = self.payments.get(order_no).await? {
            if existing.status.is_settled() {
                return Err(EngineError::AlreadySettled(order_no.clone()));
            }

            let handle = self
                .gateway
                .create_prepay(order_no, &order.buyer_id, amount_minor)
                .await?;

            let mut refreshed = existing.clone();
            refreshed.status = PaymentStatus::Pending;
            refreshed.prepay_id = Some(handle.prepay_id.clone());
            refreshed.last_error = None;

            if !self
                .payments
                .update_if_status(&refreshed, existing.status)
                .await?
            {
                return Err(EngineError::TransitionConflict(order_no.clone()));
            }

            metrics::counter!("payments_initiated_total").increment(1);
            return Ok(self.gateway.pay_params(&handle));
        }

        let handle = self
            .gateway
            .create_prepay(order_no, &order.buyer_id, amount_minor)
            .await?;

        let record = PaymentRecord::initiate(
            order_no.clone(),
            order.buyer_id.clone(),
            order.total,
            handle.prepay_id.clone(),
            Utc::now(),
        );
        self.payments.insert(&record).await?;

        metrics::counter!("payments_initiated_total").increment(1);
        tracing::info!(%order_no, amount_minor, "payment initiated");
        Ok(self.gateway.pay_params(&handle))
    }

    /// Verifies a provider webhook body and applies the settlement it
    /// carries. Forged or corrupted bodies fail verification before any
    /// state is touched.
    pub async fn handle_notification(&self, body: &[u8]) -> Result<SettlementReceipt> {
        let event = self.gateway.verify_notification(body).map_err(|err| {
            metrics::counter!("notifications_rejected_total").increment(1);
            tracing::warn!(%err, "rejected settlement notification");
            err
        })?;
        self.apply_settlement(event).await
    }

    /// Applies a settlement event under the configured deadline.
    pub async fn apply_settlement(&self, event: SettlementEvent) -> Result<SettlementReceipt> {
        let order_no = event.order_no.clone();
        match tokio::time::timeout(self.settle_timeout, self.settle(event)).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!("settlements_timed_out_total").increment(1);
                Err(EngineError::SettlementTimeout(order_no))
            }
        }
    }

    /// Returns the payment record for an order, first polling the provider
    /// for a settlement the webhook may have missed.
    #[tracing::instrument(skip(self))]
    pub async fn query_payment(&self, order_no: &OrderNo) -> Result<PaymentRecord> {
        let record = self
            .payments
            .get(order_no)
            .await?
            .ok_or_else(|| EngineError::PaymentNotFound(order_no.clone()))?;

        if record.status != PaymentStatus::Pending {
            return Ok(record);
        }

        if let Some(event) = self.gateway.query_order(order_no).await? {
            self.apply_settlement(event).await?;
            return self
                .payments
                .get(order_no)
                .await?
                .ok_or_else(|| EngineError::PaymentNotFound(order_no.clone()));
        }

        Ok(record)
    }

    /// Refunds a successfully settled payment and moves the order to
    /// `refunded`.
    ///
    /// A refund does not return stock. Omitting the amount refunds the
    /// full payment; partial refunds may not exceed what was paid.
    #[tracing::instrument(skip(self, reason))]
    pub async fn refund(
        &self,
        order_no: &OrderNo,
        amount: Option<Money>,
        reason: String,
    ) -> Result<Order> {
        let order = self.get_order(order_no).await?;
        if !order.status.permits(OrderStatus::Refunded) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                requested: OrderStatus::Refunded,
            }
            .into());
        }

        let payment = self
            .payments
            .get(order_no)
            .await?
            .ok_or_else(|| EngineError::PaymentNotFound(order_no.clone()))?;
        if payment.status != PaymentStatus::Success {
            return Err(EngineError::NotRefundable(order_no.clone()));
        }

        let refund_amount = amount.unwrap_or(payment.amount);
        let refund_minor = refund_amount.minor_units();
        let paid_minor = payment.amount.minor_units();
        if refund_minor < 1 || refund_minor > paid_minor {
            return Err(EngineError::RefundExceedsPayment {
                requested_minor: refund_minor,
                paid_minor,
            });
        }

        self.gateway
            .refund(&RefundRequest {
                order_no: order_no.clone(),
                refund_no: format!("refund_{order_no}"),
                total_minor: paid_minor,
                refund_minor,
            })
            .await?;

        let now = Utc::now();
        let mut refunded = payment.clone();
        refunded.status = PaymentStatus::Refunded;
        refunded.refunded_at = Some(now);
        refunded.refund_amount = Some(refund_amount);
        refunded.refund_reason = Some(reason.clone());

        if !self
            .payments
            .update_if_status(&refunded, PaymentStatus::Success)
            .await?
        {
            return Err(EngineError::TransitionConflict(order_no.clone()));
        }

        let updated = self
            .transition(order_no, OrderTransition::Refund { reason })
            .await?;

        metrics::counter!("payments_refunded_total").increment(1);
        tracing::info!(%order_no, refund_minor, "payment refunded");
        Ok(updated)
    }

    /// Applies a settlement event to the payment record and the order.
    ///
    /// The order is marked paid before the payment record flips, so a
    /// provider retry after a partial failure converges instead of leaving
    /// the two permanently disagreeing.
    async fn settle(&self, event: SettlementEvent) -> Result<SettlementReceipt> {
        let start = std::time::Instant::now();
        let order_no = event.order_no.clone();

        let payment = self
            .payments
            .get(&order_no)
            .await?
            .ok_or_else(|| EngineError::PaymentNotFound(order_no.clone()))?;

        if payment.status.is_settled() {
            return self.settled_receipt(payment, &event);
        }

        if event.outcome == SettlementOutcome::Failed {
            let mut failed = payment.clone();
            failed.status = PaymentStatus::Failed;
            failed.last_error = event.message.clone();

            if !self.payments.update_if_status(&failed, payment.status).await? {
                let current = self
                    .payments
                    .get(&order_no)
                    .await?
                    .ok_or_else(|| EngineError::PaymentNotFound(order_no.clone()))?;
                return self.settled_receipt(current, &event);
            }

            metrics::counter!("settlements_failed_total").increment(1);
            tracing::warn!(%order_no, error = ?event.message, "settlement reported failure");
            return Ok(SettlementReceipt {
                order_no,
                duplicate: false,
            });
        }

        let expected_minor = payment.amount.minor_units();
        if expected_minor != event.amount_minor {
            metrics::counter!("settlements_amount_mismatch_total").increment(1);
            return Err(EngineError::AmountMismatch {
                order_no,
                expected_minor,
                reported_minor: event.amount_minor,
            });
        }

        // A transaction id already attached to another record is a hard
        // conflict. Rejecting here, before the order moves, keeps both
        // records in their prior state; the unique key below remains the
        // backstop for a race between this check and the flip.
        if let Some(other) = self
            .payments
            .find_by_transaction_id(&event.transaction_id)
            .await?
        {
            if other.order_no != order_no {
                metrics::counter!("settlements_conflict_total").increment(1);
                return Err(EngineError::SettlementConflict {
                    order_no,
                    transaction_id: event.transaction_id,
                });
            }
        }

        // Order first. If the payment flip below fails, a retried event
        // finds the order already paid and only has the record to finish.
        let order = self.get_order(&order_no).await?;
        match order.status {
            OrderStatus::Pending => {
                self.transition(&order_no, OrderTransition::MarkPaid).await?;
            }
            OrderStatus::Paid => {}
            from => {
                return Err(OrderError::InvalidTransition {
                    from,
                    requested: OrderStatus::Paid,
                }
                .into());
            }
        }

        let mut settled = payment.clone();
        settled.status = PaymentStatus::Success;
        settled.transaction_id = Some(event.transaction_id.clone());
        settled.paid_at = Some(Utc::now());
        settled.last_error = None;

        match self.payments.update_if_status(&settled, payment.status).await {
            Ok(true) => {}
            Ok(false) => {
                let current = self
                    .payments
                    .get(&order_no)
                    .await?
                    .ok_or_else(|| EngineError::PaymentNotFound(order_no.clone()))?;
                return self.settled_receipt(current, &event);
            }
            // The transaction id is unique across records; a violation
            // means it already settled a different order.
            Err(StoreError::DuplicateKey { .. }) => {
                return Err(EngineError::SettlementConflict {
                    order_no,
                    transaction_id: event.transaction_id,
                });
            }
            Err(err) => return Err(err.into()),
        }

        metrics::counter!("settlements_applied_total").increment(1);
        metrics::histogram!("settlement_duration_seconds").record(start.elapsed().as_secs_f64());
        tracing::info!(%order_no, transaction_id = %event.transaction_id, "settlement applied");
        Ok(SettlementReceipt {
            order_no,
            duplicate: false,
        })
    }

    /// Resolves an event against an already settled record: the same
    /// transaction id is a duplicate delivery, anything else is a conflict.
    fn settled_receipt(
        &self,
        current: PaymentRecord,
        event: &SettlementEvent,
    ) -> Result<SettlementReceipt> {
        if current.status.is_settled()
            && current.transaction_id.as_deref() == Some(event.transaction_id.as_str())
        {
            metrics::counter!("settlements_duplicate_total").increment(1);
            tracing::info!(order_no = %current.order_no, transaction_id = %event.transaction_id,
                "duplicate settlement acknowledged");
            return Ok(SettlementReceipt {
                order_no: current.order_no,
                duplicate: true,
            });
        }
        Err(EngineError::SettlementConflict {
            order_no: current.order_no,
            transaction_id: event.transaction_id.clone(),
        })
    }

    /// Releases the given reservations, logging any line that fails.
    async fn release_reserved(&self, reserved: &[(ProductId, u32)]) {
        for (product_id, quantity) in reserved.iter().rev() {
            if let Err(err) = self.inventory.release(product_id, *quantity).await {
                tracing::error!(%product_id, quantity, %err, "failed to release reservation");
            }
        }
    }

    /// Returns every line of an order to stock.
    async fn release_lines(&self, order: &Order) {
        for item in &order.items {
            if let Err(err) = self.inventory.release(&item.product_id, item.quantity).await {
                tracing::error!(order_no = %order.order_no, product_id = %item.product_id, %err,
                    "failed to return cancelled line to stock");
            }
        }
    }
}
