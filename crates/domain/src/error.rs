//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by pure order validation and transition logic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// The requested status is not reachable from the current status.
    /// Raised without mutating the order.
    #[error("invalid transition: {from} -> {requested}")]
    InvalidTransition {
        from: OrderStatus,
        requested: OrderStatus,
    },

    /// An order must contain at least one line item.
    #[error("order has no line items")]
    NoItems,

    /// Line item quantity must be positive.
    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// A refund transition requires a non-empty reason.
    #[error("refund reason is required")]
    RefundReasonRequired,

    /// A ship transition requires carrier and tracking number.
    #[error("shipping info is incomplete: {0}")]
    IncompleteShippingInfo(&'static str),
}
