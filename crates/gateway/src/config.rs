use serde::{Deserialize, Serialize};

/// Provider credentials and callback settings.
///
/// Constructed once at process start from explicit configuration and
/// passed into the gateway client; never read from ambient global state.
/// The same config drives the mock gateway so signed test notifications
/// verify against the same secret as production ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Application id registered with the provider.
    pub app_id: String,
    /// Merchant account id.
    pub merchant_id: String,
    /// Shared secret for webhook and pay-parameter signatures.
    pub secret: String,
    /// URL the provider delivers settlement notifications to.
    pub notify_url: String,
}

impl GatewayConfig {
    /// A config suitable for tests and local development.
    pub fn for_dev(secret: impl Into<String>) -> Self {
        Self {
            app_id: "app-dev".to_string(),
            merchant_id: "mch-dev".to_string(),
            secret: secret.into(),
            notify_url: "http://localhost:3000/payments/notify".to_string(),
        }
    }
}
