use thiserror::Error;

/// Errors raised at the provider boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider call failed or returned an unexpected shape. Safe to
    /// retry: no local state is mutated before the call in any path that
    /// reaches the provider.
    #[error("provider call failed: {0}")]
    Provider(String),

    /// The inbound payload did not parse as a provider notification.
    #[error("malformed provider payload: {0}")]
    MalformedPayload(String),

    /// Signature verification failed. The payload must be treated as a
    /// potential forgery and rejected before any state is touched.
    #[error("unauthenticated callback: {0}")]
    UnauthenticatedCallback(&'static str),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
