//! Engine error types.

use common::{OrderNo, ProductId};
use domain::OrderError;
use gateway::GatewayError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while coordinating orders, inventory and payments.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderNo),

    /// Product not found.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Not enough stock to cover a requested line.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// No payment record exists for the order.
    #[error("Payment not found for order: {0}")]
    PaymentNotFound(OrderNo),

    /// Payment has already settled, the requested operation no longer applies.
    #[error("Payment for order {0} has already settled")]
    AlreadySettled(OrderNo),

    /// Refund requested against a payment that is not a successful charge.
    #[error("Payment for order {0} is not refundable")]
    NotRefundable(OrderNo),

    /// A bare status update tried to mark an order refunded while its
    /// settled payment is still unreversed at the provider.
    #[error("Order {0} has a settled payment; refund it through the payment refund operation")]
    RefundRequiresReversal(OrderNo),

    /// Refund amount exceeds the amount originally paid.
    #[error("Refund of {requested_minor} minor units exceeds paid amount {paid_minor}")]
    RefundExceedsPayment { requested_minor: i64, paid_minor: i64 },

    /// Settlement reported an amount that disagrees with the payment record.
    #[error(
        "Settlement amount mismatch for order {order_no}: expected {expected_minor}, reported {reported_minor}"
    )]
    AmountMismatch {
        order_no: OrderNo,
        expected_minor: i64,
        reported_minor: i64,
    },

    /// A settlement arrived for a payment already settled under a different
    /// transaction id.
    #[error("Conflicting settlement for order {order_no}: transaction {transaction_id}")]
    SettlementConflict {
        order_no: OrderNo,
        transaction_id: String,
    },

    /// A concurrent writer won the status update race.
    #[error("Concurrent update conflict on order: {0}")]
    TransitionConflict(OrderNo),

    /// Settlement processing exceeded its deadline.
    #[error("Settlement processing timed out for order: {0}")]
    SettlementTimeout(OrderNo),

    /// Domain rule violation.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Persistence error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Payment provider error.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
