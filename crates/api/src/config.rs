//! Application configuration loaded from environment variables.

use std::time::Duration;

use gateway::GatewayConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — Postgres connection string; in-memory stores when unset
/// - `GATEWAY_APP_ID`, `GATEWAY_MERCHANT_ID`, `GATEWAY_SECRET`,
///   `GATEWAY_NOTIFY_URL` — payment provider credentials
/// - `SETTLEMENT_TIMEOUT_MS` — settlement processing deadline (default: 5000)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub gateway: GatewayConfig,
    pub settle_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let gateway = GatewayConfig {
            app_id: std::env::var("GATEWAY_APP_ID").unwrap_or_else(|_| "app-dev".to_string()),
            merchant_id: std::env::var("GATEWAY_MERCHANT_ID")
                .unwrap_or_else(|_| "merchant-dev".to_string()),
            secret: std::env::var("GATEWAY_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
            notify_url: std::env::var("GATEWAY_NOTIFY_URL")
                .unwrap_or_else(|_| "http://localhost:3000/payments/notify".to_string()),
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            gateway,
            settle_timeout: std::env::var("SETTLEMENT_TIMEOUT_MS")
                .ok()
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(5000)),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            gateway: GatewayConfig::for_dev("dev-secret"),
            settle_timeout: Duration::from_millis(5000),
        }
    }
}
