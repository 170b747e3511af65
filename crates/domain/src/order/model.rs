//! Order record and its pure mutation logic.

use chrono::{DateTime, Utc};
use common::{BuyerId, Money, OrderNo, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::payment::PaymentStatus;

use super::status::OrderStatus;
use super::transition::OrderTransition;

/// A line item snapshotted at order time.
///
/// Price, name, and image are point-in-time copies; later catalog changes
/// (or product deletion) must not corrupt historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub quantity: u32,
    /// Unit price captured at order time.
    pub unit_price: Money,
}

impl OrderItem {
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        image: Option<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            image,
            quantity,
            unit_price,
        }
    }

    /// Total price for this line (quantity × unit price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Shipping address snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub recipient: String,
    pub phone: String,
    pub detail: String,
}

/// Carrier metadata recorded when an order ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub carrier: String,
    pub tracking_no: String,
    /// Stamped when the ship transition is applied.
    #[serde(default)]
    pub shipped_at: Option<DateTime<Utc>>,
}

/// Refund metadata recorded when an order is refunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundInfo {
    pub reason: String,
    pub refunded_at: DateTime<Utc>,
}

/// An order record.
///
/// The unit of consistency between inventory and payment. Total amount is
/// computed once at placement from the snapshotted line items and never
/// recomputed. Orders are never physically deleted; terminal statuses model
/// lifecycle end states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_no: OrderNo,
    pub buyer_id: BuyerId,
    pub items: Vec<OrderItem>,
    pub address: Address,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub shipping: Option<ShippingInfo>,
    pub refund: Option<RefundInfo>,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Places a new order in `pending` with the total computed from the
    /// snapshotted line items.
    ///
    /// Stock reservation happens before this in the engine; by the time an
    /// `Order` exists its stock is already committed.
    pub fn place(
        order_no: OrderNo,
        buyer_id: BuyerId,
        items: Vec<OrderItem>,
        address: Address,
        remark: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                });
            }
        }

        let total = items
            .iter()
            .fold(Money::zero(), |acc, item| acc + item.total_price());

        Ok(Self {
            order_no,
            buyer_id,
            items,
            address,
            total,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            shipping: None,
            refund: None,
            remark,
            created_at: now,
            paid_at: None,
        })
    }

    /// Applies a transition, mutating the order or failing with
    /// `InvalidTransition` while leaving it untouched.
    ///
    /// Purely in-memory; the engine persists the result with a conditional
    /// update keyed on the prior status.
    pub fn apply(&mut self, transition: OrderTransition, now: DateTime<Utc>) -> Result<(), OrderError> {
        let target = transition.target();
        if !self.status.permits(target) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                requested: target,
            });
        }

        match transition {
            OrderTransition::MarkPaid => {
                self.payment_status = PaymentStatus::Success;
                self.paid_at = Some(now);
            }
            OrderTransition::Ship(mut info) => {
                if info.carrier.trim().is_empty() {
                    return Err(OrderError::IncompleteShippingInfo("carrier"));
                }
                if info.tracking_no.trim().is_empty() {
                    return Err(OrderError::IncompleteShippingInfo("tracking_no"));
                }
                info.shipped_at = Some(now);
                self.shipping = Some(info);
            }
            OrderTransition::Deliver => {}
            OrderTransition::Cancel => {}
            OrderTransition::Refund { reason } => {
                if reason.trim().is_empty() {
                    return Err(OrderError::RefundReasonRequired);
                }
                self.payment_status = PaymentStatus::Refunded;
                self.refund = Some(RefundInfo {
                    reason,
                    refunded_at: now,
                });
            }
        }

        self.status = target;
        Ok(())
    }
}
