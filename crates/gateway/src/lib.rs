//! Payment gateway adapter.
//!
//! Translates between the engine's internal model and the external
//! payment provider: pre-payment handles out, normalized
//! [`SettlementEvent`]s in. Inbound webhook payloads are authenticated
//! with an HMAC-SHA256 signature over a canonical field string before
//! anything else looks at them.
//!
//! The provider is reached through the [`PaymentGateway`] trait so tests
//! and dev wiring can substitute [`MockGateway`], which speaks the same
//! wire format (including signatures) without a network.

pub mod adapter;
pub mod config;
pub mod error;
pub mod event;
pub mod mock;
pub mod signature;

pub use adapter::{PayParams, PaymentGateway, PrepayHandle, RefundRequest};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use event::{Notification, SettlementEvent, SettlementOutcome};
pub use mock::MockGateway;
