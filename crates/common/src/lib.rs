//! Shared types for the commerce engine.
//!
//! Identifier newtypes and the decimal [`Money`] value type used by every
//! other crate in the workspace.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{BuyerId, OrderNo, ProductId};
