//! Domain layer for the commerce engine.
//!
//! This crate provides the order lifecycle data model:
//! - The [`Order`] record with its explicit [`OrderTransition`] table
//! - The [`PaymentRecord`] tracking one payment attempt per order
//! - The [`ProductStock`] ledger entry
//! - Order number generation
//!
//! Everything here is pure: validation and transition logic never touch a
//! store. Persistence and orchestration live in the `store` and `engine`
//! crates.

pub mod error;
pub mod order;
pub mod payment;
pub mod stock;

pub use error::OrderError;
pub use order::{
    Address, Order, OrderItem, OrderStatus, OrderTransition, RefundInfo, ShippingInfo,
    generate_order_no,
};
pub use payment::{PaymentRecord, PaymentStatus};
pub use stock::ProductStock;
