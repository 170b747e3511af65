use async_trait::async_trait;
use common::{OrderNo, ProductId};
use domain::{Order, OrderStatus, PaymentRecord, PaymentStatus, ProductStock};

use crate::Result;

/// Inventory ledger operations.
///
/// `reserve` and `release` are the only writers of the stock and sold
/// counters; both are atomic per product. Implementations must serialize
/// concurrent reservations of the same product so that two requests for
/// the last unit cannot both succeed.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Inserts a new product. Fails with `DuplicateKey` if it exists.
    async fn insert(&self, product: ProductStock) -> Result<()>;

    /// Fetches a product by id.
    async fn get(&self, product_id: &ProductId) -> Result<Option<ProductStock>>;

    /// Atomically converts `quantity` units of available stock into sold
    /// stock (decrement-if-sufficient), returning the post-reservation
    /// state.
    ///
    /// Fails with `InsufficientStock` without mutating anything when fewer
    /// than `quantity` units are available.
    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<ProductStock>;

    /// Atomically reverses a reservation: increments stock, decrements
    /// sold. A release that would take the sold count negative fails with
    /// `InvariantViolation`.
    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<()>;
}

/// Order record storage.
///
/// Mutation goes through [`OrderStore::update_if_status`], a conditional
/// update keyed on the order's prior status. Concurrent transitions on one
/// order therefore resolve to exactly one winner; the loser observes
/// `Ok(false)` and re-reads.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order. Fails with `DuplicateKey` on an order-number
    /// collision (the caller regenerates and retries).
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Fetches an order by order number.
    async fn get(&self, order_no: &OrderNo) -> Result<Option<Order>>;

    /// Writes `order` only if the stored record is currently in
    /// `expected` status. Returns `false` (without mutating) when the
    /// stored status differs, i.e. a concurrent transition won.
    async fn update_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool>;
}

/// Payment record storage: at most one record per order number.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists a new payment record. Fails with `DuplicateKey` if one
    /// already exists for the order number.
    async fn insert(&self, payment: &PaymentRecord) -> Result<()>;

    /// Fetches the payment record for an order.
    async fn get(&self, order_no: &OrderNo) -> Result<Option<PaymentRecord>>;

    /// Fetches the payment record a provider transaction id is attached
    /// to, if any. Transaction ids are unique across records, so at most
    /// one record can match.
    async fn find_by_transaction_id(&self, transaction_id: &str)
    -> Result<Option<PaymentRecord>>;

    /// Writes `payment` only if the stored record is currently in
    /// `expected` status. Returns `false` without mutating when the stored
    /// status differs.
    ///
    /// A provider transaction id on `payment` that is already attached to
    /// a different record fails with `DuplicateKey`: transaction ids are
    /// globally unique and identifier reuse is a hard error, not a race.
    async fn update_if_status(
        &self,
        payment: &PaymentRecord,
        expected: PaymentStatus,
    ) -> Result<bool>;
}
