//! The provider-facing trait and its request/response types.

use async_trait::async_trait;
use common::{BuyerId, OrderNo};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::event::SettlementEvent;

/// Provider pre-payment handle from unified-order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepayHandle {
    pub prepay_id: String,
}

/// Signed parameters the client uses to complete payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayParams {
    pub app_id: String,
    pub package: String,
    pub nonce: String,
    pub timestamp: i64,
    pub signature: String,
}

/// A refund instruction for the provider.
///
/// Both the original total and the refund portion travel in minor units,
/// converted by the same path as the initiating amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    pub order_no: OrderNo,
    pub refund_no: String,
    pub total_minor: i64,
    pub refund_minor: i64,
}

/// Payment provider boundary.
///
/// One implementation talks to the real provider; [`crate::MockGateway`]
/// is the in-process stand-in. Both are constructed from an explicit
/// [`crate::GatewayConfig`].
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a provider-side unified order and returns its pre-payment
    /// handle. No local state is written before this call.
    async fn create_prepay(
        &self,
        order_no: &OrderNo,
        buyer_id: &BuyerId,
        amount_minor: i64,
    ) -> Result<PrepayHandle>;

    /// Actively queries the provider for the settlement state of an
    /// order. `None` means the provider has no settlement yet.
    async fn query_order(&self, order_no: &OrderNo) -> Result<Option<SettlementEvent>>;

    /// Requests a (partial) refund of a settled payment.
    async fn refund(&self, request: &RefundRequest) -> Result<()>;

    /// Builds the signed client-side pay parameters for a prepay handle.
    fn pay_params(&self, handle: &PrepayHandle) -> PayParams;

    /// Authenticates and normalizes an inbound webhook body.
    fn verify_notification(&self, body: &[u8]) -> Result<SettlementEvent>;
}
