use common::ProductId;
use thiserror::Error;

/// Errors that can occur when interacting with the record stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An insert (or a settled transaction id) collided with an existing
    /// unique key.
    #[error("duplicate {entity} key: {key}")]
    DuplicateKey { entity: &'static str, key: String },

    /// The referenced record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A reservation asked for more units than are available. The
    /// conditional update rejected it; nothing was mutated.
    #[error("insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A release would drive the sold count negative. This can only happen
    /// through a programming error and is surfaced, never clamped.
    #[error("inventory invariant violated for {product_id}: release of {requested} exceeds sold count")]
    InvariantViolation {
        product_id: ProductId,
        requested: u32,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
