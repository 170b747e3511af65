//! API server entry point.

use std::sync::Arc;

use engine::Engine;
use gateway::MockGateway;
use store::{PostgresInventoryStore, PostgresOrderStore, PostgresPaymentStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::config::Config;
use api::routes::orders::AppState;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve(app: axum::Router, addr: &str) {
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire stores: Postgres when DATABASE_URL is set, in-memory otherwise
    let addr = config.addr();
    if let Some(database_url) = &config.database_url {
        let pool = sqlx::PgPool::connect(database_url)
            .await
            .expect("failed to connect to database");
        store::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let engine = Engine::new(
            PostgresInventoryStore::new(pool.clone()),
            PostgresOrderStore::new(pool.clone()),
            PostgresPaymentStore::new(pool),
            MockGateway::new(config.gateway.clone()),
        )
        .with_settle_timeout(config.settle_timeout);
        let state = Arc::new(AppState { engine });

        serve(api::create_app(state, metrics_handle), &addr).await;
    } else {
        tracing::warn!("DATABASE_URL not set, using in-memory stores");
        let (state, _gateway) = api::create_default_state(&config);
        serve(api::create_app(state, metrics_handle), &addr).await;
    }
}
