//! Normalized settlement events and the webhook wire form.

use common::OrderNo;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::signature;

/// Provider-confirmed outcome of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementOutcome {
    Success,
    Failed,
}

impl SettlementOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SettlementOutcome::Success => "success",
            SettlementOutcome::Failed => "failed",
        }
    }
}

/// A provider settlement, normalized for the reconciler.
///
/// Identical whether it arrived as a webhook or from an active status
/// query; the reconciler applies it exactly once per transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEvent {
    pub order_no: OrderNo,
    /// Provider transaction identifier, unique per settlement.
    pub transaction_id: String,
    /// Settled amount in minor units (cents).
    pub amount_minor: i64,
    pub outcome: SettlementOutcome,
    /// Provider error detail for failed outcomes.
    pub message: Option<String>,
}

/// Webhook notification wire form.
///
/// The signature covers every business field; [`Notification::verify`]
/// must succeed before the payload is trusted at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub order_no: String,
    pub transaction_id: String,
    pub amount_minor: i64,
    pub outcome: SettlementOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub signature: String,
}

impl Notification {
    fn signed_fields<'a>(&'a self, amount: &'a str) -> Vec<(&'a str, &'a str)> {
        let mut fields = vec![
            ("order_no", self.order_no.as_str()),
            ("transaction_id", self.transaction_id.as_str()),
            ("amount_minor", amount),
            ("outcome", self.outcome.as_str()),
        ];
        if let Some(message) = &self.message {
            fields.push(("message", message.as_str()));
        }
        fields
    }

    /// Builds a signed notification. Used by the mock provider and by
    /// tests constructing webhook bodies.
    pub fn signed(
        secret: &str,
        order_no: &OrderNo,
        transaction_id: impl Into<String>,
        amount_minor: i64,
        outcome: SettlementOutcome,
        message: Option<String>,
    ) -> Self {
        let mut notification = Self {
            order_no: order_no.to_string(),
            transaction_id: transaction_id.into(),
            amount_minor,
            outcome,
            message,
            signature: String::new(),
        };
        let amount = notification.amount_minor.to_string();
        notification.signature = signature::sign(secret, &notification.signed_fields(&amount));
        notification
    }

    /// Parses a raw webhook body and authenticates its signature,
    /// returning the normalized settlement event.
    pub fn parse_and_verify(secret: &str, body: &[u8]) -> Result<SettlementEvent> {
        let notification: Notification = serde_json::from_slice(body)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
        notification.verify(secret)
    }

    /// Authenticates the signature and normalizes into a settlement event.
    pub fn verify(self, secret: &str) -> Result<SettlementEvent> {
        let amount = self.amount_minor.to_string();
        if !signature::verify(secret, &self.signed_fields(&amount), &self.signature) {
            return Err(GatewayError::UnauthenticatedCallback(
                "notification signature mismatch",
            ));
        }
        Ok(SettlementEvent {
            order_no: OrderNo::new(self.order_no),
            transaction_id: self.transaction_id,
            amount_minor: self.amount_minor,
            outcome: self.outcome,
            message: self.message,
        })
    }
}
