//! Payment record: one payment attempt per order.

use chrono::{DateTime, Utc};
use common::{BuyerId, Money, OrderNo};
use serde::{Deserialize, Serialize};

/// Status of a payment attempt (and, mirrored, of an order's payment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Initiated, awaiting settlement.
    #[default]
    Pending,

    /// Settled by the provider.
    Success,

    /// Provider reported a failed settlement.
    Failed,

    /// Reversed.
    Refunded,
}

impl PaymentStatus {
    /// A settled record makes any further settlement event for the same
    /// order a duplicate.
    pub fn is_settled(self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Refunded)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// One payment attempt for an order.
///
/// At most one record exists per order number. The provider transaction id
/// is attached on settlement and is immutable and unique across all
/// records from then on; the store enforces both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub order_no: OrderNo,
    pub buyer_id: BuyerId,
    /// Equal to the order total at initiation time.
    pub amount: Money,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    /// Provider pre-payment handle from the latest initiation.
    pub prepay_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<Money>,
    pub refund_reason: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Creates a pending record for a freshly initiated payment.
    pub fn initiate(
        order_no: OrderNo,
        buyer_id: BuyerId,
        amount: Money,
        prepay_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_no,
            buyer_id,
            amount,
            status: PaymentStatus::Pending,
            transaction_id: None,
            prepay_id: Some(prepay_id),
            paid_at: None,
            refunded_at: None,
            refund_amount: None,
            refund_reason: None,
            last_error: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_statuses() {
        assert!(!PaymentStatus::Pending.is_settled());
        assert!(!PaymentStatus::Failed.is_settled());
        assert!(PaymentStatus::Success.is_settled());
        assert!(PaymentStatus::Refunded.is_settled());
    }

    #[test]
    fn string_roundtrip() {
        for s in [
            PaymentStatus::Pending,
            PaymentStatus::Success,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            let parsed: PaymentStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn initiate_is_pending_with_prepay_handle() {
        let record = PaymentRecord::initiate(
            OrderNo::new("2501150042123456"),
            BuyerId::new("buyer-1"),
            "30.00".parse().unwrap(),
            "prepay-1".into(),
            Utc::now(),
        );
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.prepay_id.as_deref(), Some("prepay-1"));
        assert!(record.transaction_id.is_none());
        assert!(record.paid_at.is_none());
    }
}
