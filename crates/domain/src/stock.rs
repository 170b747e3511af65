//! Inventory ledger entry.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// Per-product stock counters plus the snapshot source for order lines.
///
/// Available quantity never goes negative and the sold count only moves
/// through reserve/release; both are enforced by the inventory store's
/// atomic conditional updates, never by callers writing fields directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product_id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub price: Money,
    pub stock: u32,
    pub sold: u32,
}

impl ProductStock {
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        image: Option<String>,
        price: Money,
        stock: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            image,
            price,
            stock,
            sold: 0,
        }
    }
}
