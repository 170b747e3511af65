//! Persistence layer for the commerce engine.
//!
//! Three record stores with atomic conditional-update contracts:
//!
//! - [`InventoryStore`] — decrement-if-sufficient stock reservation
//! - [`OrderStore`] — order records with status-keyed conditional updates
//! - [`PaymentStore`] — payment records with status-keyed conditional
//!   updates and transaction-id uniqueness
//!
//! Each trait has an in-memory implementation (tests, dev wiring) and a
//! PostgreSQL implementation backed by `sqlx`. Both enforce the same
//! contracts; the engine's linearizability argument rests entirely on
//! these conditional updates, never on read-then-write sequences.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{InMemoryInventoryStore, InMemoryOrderStore, InMemoryPaymentStore};
pub use postgres::{
    PostgresInventoryStore, PostgresOrderStore, PostgresPaymentStore, run_migrations,
};
pub use traits::{InventoryStore, OrderStore, PaymentStore};
