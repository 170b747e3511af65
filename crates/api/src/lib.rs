//! HTTP API server for the order and payment engine.
//!
//! Exposes order placement, lifecycle transitions, payment initiation,
//! the provider settlement webhook and refunds, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use engine::Engine;
use gateway::{MockGateway, PaymentGateway};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{
    InMemoryInventoryStore, InMemoryOrderStore, InMemoryPaymentStore, InventoryStore, OrderStore,
    PaymentStore,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Application state over the in-memory backends and the mock provider.
pub type MemoryState =
    AppState<InMemoryInventoryStore, InMemoryOrderStore, InMemoryPaymentStore, MockGateway>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<I, O, P, G>(
    state: Arc<AppState<I, O, P, G>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    I: InventoryStore + 'static,
    O: OrderStore + 'static,
    P: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<I, O, P, G>))
        .route("/orders/{order_no}", get(routes::orders::get::<I, O, P, G>))
        .route(
            "/orders/{order_no}/status",
            post(routes::orders::update_status::<I, O, P, G>),
        )
        .route(
            "/payments/notify",
            post(routes::payments::notify::<I, O, P, G>),
        )
        .route(
            "/payments/{order_no}",
            post(routes::payments::initiate::<I, O, P, G>)
                .get(routes::payments::get::<I, O, P, G>),
        )
        .route(
            "/payments/{order_no}/refund",
            post(routes::payments::refund::<I, O, P, G>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates in-memory application state wired to the mock provider.
///
/// The returned gateway handle scripts settlements and builds signed
/// webhook bodies against the same secret the engine verifies with.
pub fn create_default_state(config: &Config) -> (Arc<MemoryState>, MockGateway) {
    let gateway = MockGateway::new(config.gateway.clone());

    let engine = Engine::new(
        InMemoryInventoryStore::default(),
        InMemoryOrderStore::default(),
        InMemoryPaymentStore::default(),
        gateway.clone(),
    )
    .with_settle_timeout(config.settle_timeout);

    (Arc::new(AppState { engine }), gateway)
}
