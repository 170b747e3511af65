//! Order lifecycle and payment consistency engine.
//!
//! Drives every cross-record rule of the system: all-or-nothing stock
//! reservation at order placement, status transitions through conditional
//! updates, and exactly-once application of provider settlement events.

pub mod engine;
pub mod error;

pub use engine::{Engine, NewOrder, NewOrderLine, SettlementReceipt};
pub use error::{EngineError, Result};
