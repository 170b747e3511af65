//! In-process provider fake.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{BuyerId, OrderNo};
use uuid::Uuid;

use crate::adapter::{PayParams, PaymentGateway, PrepayHandle, RefundRequest};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::event::{Notification, SettlementEvent, SettlementOutcome};
use crate::signature;

#[derive(Debug, Default)]
struct MockState {
    prepays: HashMap<OrderNo, (String, i64)>,
    settlements: HashMap<OrderNo, SettlementEvent>,
    refunds: Vec<RefundRequest>,
    next_prepay: u32,
    fail_on_prepay: bool,
    fail_on_refund: bool,
}

/// Deterministic provider fake for tests and dev wiring.
///
/// Speaks the same wire format as a real provider, including notification
/// signatures under the configured secret, so webhook handling can be
/// exercised end to end without a network.
#[derive(Clone)]
pub struct MockGateway {
    config: GatewayConfig,
    state: Arc<RwLock<MockState>>,
}

impl MockGateway {
    /// Creates a mock gateway from explicit configuration.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MockState::default())),
        }
    }

    /// Configures the next prepay call to fail.
    pub fn set_fail_on_prepay(&self, fail: bool) {
        self.state.write().unwrap().fail_on_prepay = fail;
    }

    /// Configures the next refund call to fail.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Returns true if a prepay handle was issued for the order.
    pub fn has_prepay(&self, order_no: &OrderNo) -> bool {
        self.state.read().unwrap().prepays.contains_key(order_no)
    }

    /// Returns the number of refund instructions received.
    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunds.len()
    }

    /// Returns the last refund instruction received.
    pub fn last_refund(&self) -> Option<RefundRequest> {
        self.state.read().unwrap().refunds.last().cloned()
    }

    /// Marks the order as settled successfully provider-side, using the
    /// amount from its prepay. Subsequent `query_order` calls report it.
    pub fn settle_success(&self, order_no: &OrderNo, transaction_id: impl Into<String>) -> SettlementEvent {
        let mut state = self.state.write().unwrap();
        let amount_minor = state
            .prepays
            .get(order_no)
            .map(|(_, amount)| *amount)
            .unwrap_or_default();
        let event = SettlementEvent {
            order_no: order_no.clone(),
            transaction_id: transaction_id.into(),
            amount_minor,
            outcome: SettlementOutcome::Success,
            message: None,
        };
        state.settlements.insert(order_no.clone(), event.clone());
        event
    }

    /// Builds the signed webhook body the provider would deliver for a
    /// settlement event.
    pub fn signed_notification(&self, event: &SettlementEvent) -> Vec<u8> {
        let notification = Notification::signed(
            &self.config.secret,
            &event.order_no,
            event.transaction_id.clone(),
            event.amount_minor,
            event.outcome,
            event.message.clone(),
        );
        serde_json::to_vec(&notification).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_prepay(
        &self,
        order_no: &OrderNo,
        _buyer_id: &BuyerId,
        amount_minor: i64,
    ) -> Result<PrepayHandle> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_prepay {
            return Err(GatewayError::Provider("provider unavailable".to_string()));
        }
        state.next_prepay += 1;
        let prepay_id = format!("prepay-{:04}", state.next_prepay);
        state
            .prepays
            .insert(order_no.clone(), (prepay_id.clone(), amount_minor));
        Ok(PrepayHandle { prepay_id })
    }

    async fn query_order(&self, order_no: &OrderNo) -> Result<Option<SettlementEvent>> {
        Ok(self.state.read().unwrap().settlements.get(order_no).cloned())
    }

    async fn refund(&self, request: &RefundRequest) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_refund {
            return Err(GatewayError::Provider("refund rejected".to_string()));
        }
        if request.refund_minor > request.total_minor {
            return Err(GatewayError::Provider(
                "refund exceeds original amount".to_string(),
            ));
        }
        state.refunds.push(request.clone());
        Ok(())
    }

    fn pay_params(&self, handle: &PrepayHandle) -> PayParams {
        let package = format!("prepay_id={}", handle.prepay_id);
        let nonce = Uuid::new_v4().simple().to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let ts = timestamp.to_string();
        let signature = signature::sign(
            &self.config.secret,
            &[
                ("app_id", self.config.app_id.as_str()),
                ("package", package.as_str()),
                ("nonce", nonce.as_str()),
                ("timestamp", ts.as_str()),
            ],
        );
        PayParams {
            app_id: self.config.app_id.clone(),
            package,
            nonce,
            timestamp,
            signature,
        }
    }

    fn verify_notification(&self, body: &[u8]) -> Result<SettlementEvent> {
        Notification::parse_and_verify(&self.config.secret, body)
    }
}
