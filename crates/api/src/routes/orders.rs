//! Order placement and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderNo;
use domain::{Order, OrderTransition};
use engine::{Engine, NewOrder};
use gateway::PaymentGateway;
use serde::Serialize;
use store::{InventoryStore, OrderStore, PaymentStore};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<I, O, P, G>
where
    I: InventoryStore,
    O: OrderStore,
    P: PaymentStore,
    G: PaymentGateway,
{
    pub engine: Engine<I, O, P, G>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub name: String,
    pub image: Option<String>,
    pub quantity: u32,
    pub unit_price: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_no: String,
    pub buyer_id: String,
    pub status: String,
    pub payment_status: String,
    pub total: String,
    pub items: Vec<OrderItemResponse>,
    pub address: domain::Address,
    pub shipping: Option<domain::ShippingInfo>,
    pub refund: Option<domain::RefundInfo>,
    pub remark: Option<String>,
    pub created_at: String,
    pub paid_at: Option<String>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_no: order.order_no.to_string(),
            buyer_id: order.buyer_id.to_string(),
            status: order.status.as_str().to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            total: order.total.to_string(),
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    name: item.name,
                    image: item.image,
                    quantity: item.quantity,
                    unit_price: item.unit_price.to_string(),
                })
                .collect(),
            address: order.address,
            shipping: order.shipping,
            refund: order.refund,
            remark: order.remark,
            created_at: order.created_at.to_rfc3339(),
            paid_at: order.paid_at.map(|t| t.to_rfc3339()),
        }
    }
}

// -- Handlers --

/// POST /orders — place an order, reserving stock for every line.
#[tracing::instrument(skip(state, req))]
pub async fn create<I, O, P, G>(
    State(state): State<Arc<AppState<I, O, P, G>>>,
    Json(req): Json<NewOrder>,
) -> Result<(axum::http::StatusCode, Json<OrderResponse>), ApiError>
where
    I: InventoryStore + 'static,
    O: OrderStore + 'static,
    P: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    let order = state.engine.create_order(req).await?;
    Ok((axum::http::StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/:order_no — load an order by number.
#[tracing::instrument(skip(state))]
pub async fn get<I, O, P, G>(
    State(state): State<Arc<AppState<I, O, P, G>>>,
    Path(order_no): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    I: InventoryStore + 'static,
    O: OrderStore + 'static,
    P: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    let order = state.engine.get_order(&OrderNo::new(order_no)).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:order_no/status — apply a tagged status transition.
#[tracing::instrument(skip(state, transition))]
pub async fn update_status<I, O, P, G>(
    State(state): State<Arc<AppState<I, O, P, G>>>,
    Path(order_no): Path<String>,
    Json(transition): Json<OrderTransition>,
) -> Result<Json<OrderResponse>, ApiError>
where
    I: InventoryStore + 'static,
    O: OrderStore + 'static,
    P: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    let order = state
        .engine
        .transition(&OrderNo::new(order_no), transition)
        .await?;
    Ok(Json(order.into()))
}
