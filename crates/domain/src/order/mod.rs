//! Order record, status machine, and order number generation.

mod model;
mod order_no;
mod status;
mod transition;

pub use model::{Address, Order, OrderItem, RefundInfo, ShippingInfo};
pub use order_no::generate_order_no;
pub use status::OrderStatus;
pub use transition::OrderTransition;
