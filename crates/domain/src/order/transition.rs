//! Explicit order transition table.

use serde::{Deserialize, Serialize};

use super::model::ShippingInfo;
use super::status::OrderStatus;

/// A requested order status change together with its payload.
///
/// Each lifecycle event is a tagged variant, so a transition that needs a
/// payload (shipping metadata, refund reason) cannot be requested without
/// one. [`crate::Order::apply`] maps `(current status, transition)` to
/// either the mutated order or `InvalidTransition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OrderTransition {
    /// Payment settled. Driven by the notification reconciler; idempotent
    /// at the engine level because notifications may be duplicated.
    #[serde(rename = "mark-paid")]
    MarkPaid,

    /// Handed to a carrier.
    Ship(ShippingInfo),

    /// Received by the buyer.
    Deliver,

    /// Cancelled before payment.
    Cancel,

    /// Financial reversal. Does not touch inventory.
    Refund { reason: String },
}

impl OrderTransition {
    /// The status this transition moves the order into.
    pub fn target(&self) -> OrderStatus {
        match self {
            OrderTransition::MarkPaid => OrderStatus::Paid,
            OrderTransition::Ship(_) => OrderStatus::Shipped,
            OrderTransition::Deliver => OrderStatus::Delivered,
            OrderTransition::Cancel => OrderStatus::Cancelled,
            OrderTransition::Refund { .. } => OrderStatus::Refunded,
        }
    }

    /// Short name for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            OrderTransition::MarkPaid => "mark-paid",
            OrderTransition::Ship(_) => "ship",
            OrderTransition::Deliver => "deliver",
            OrderTransition::Cancel => "cancel",
            OrderTransition::Refund { .. } => "refund",
        }
    }
}
