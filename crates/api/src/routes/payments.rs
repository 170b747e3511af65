//! Payment initiation, webhook, query and refund endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use common::{Money, OrderNo};
use domain::PaymentRecord;
use gateway::{PayParams, PaymentGateway};
use serde::{Deserialize, Serialize};
use store::{InventoryStore, OrderStore, PaymentStore};

use crate::error::ApiError;
use crate::routes::orders::{AppState, OrderResponse};

// -- Request / response types --

#[derive(Deserialize)]
pub struct RefundBody {
    /// Decimal amount string; omitted means a full refund.
    pub amount: Option<String>,
    pub reason: String,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub order_no: String,
    pub status: String,
    pub amount: String,
    pub transaction_id: Option<String>,
    pub prepay_id: Option<String>,
    pub paid_at: Option<String>,
    pub refunded_at: Option<String>,
    pub refund_amount: Option<String>,
    pub refund_reason: Option<String>,
    pub last_error: Option<String>,
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            order_no: record.order_no.to_string(),
            status: record.status.as_str().to_string(),
            amount: record.amount.to_string(),
            transaction_id: record.transaction_id,
            prepay_id: record.prepay_id,
            paid_at: record.paid_at.map(|t| t.to_rfc3339()),
            refunded_at: record.refunded_at.map(|t| t.to_rfc3339()),
            refund_amount: record.refund_amount.map(|m| m.to_string()),
            refund_reason: record.refund_reason,
            last_error: record.last_error,
        }
    }
}

/// Acknowledgement body the provider expects for a consumed notification.
#[derive(Serialize)]
pub struct NotifyAck {
    pub code: &'static str,
}

// -- Handlers --

/// POST /payments/:order_no — initiate payment for a pending order.
#[tracing::instrument(skip(state))]
pub async fn initiate<I, O, P, G>(
    State(state): State<Arc<AppState<I, O, P, G>>>,
    Path(order_no): Path<String>,
) -> Result<Json<PayParams>, ApiError>
where
    I: InventoryStore + 'static,
    O: OrderStore + 'static,
    P: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    let params = state
        .engine
        .initiate_payment(&OrderNo::new(order_no))
        .await?;
    Ok(Json(params))
}

/// POST /payments/notify — provider settlement webhook.
///
/// Duplicates are acknowledged like first deliveries; any error status
/// makes the provider redeliver.
#[tracing::instrument(skip(state, body))]
pub async fn notify<I, O, P, G>(
    State(state): State<Arc<AppState<I, O, P, G>>>,
    body: Bytes,
) -> Result<Json<NotifyAck>, ApiError>
where
    I: InventoryStore + 'static,
    O: OrderStore + 'static,
    P: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    state.engine.handle_notification(&body).await?;
    Ok(Json(NotifyAck { code: "SUCCESS" }))
}

/// GET /payments/:order_no — payment status, polling the provider first
/// when still pending.
#[tracing::instrument(skip(state))]
pub async fn get<I, O, P, G>(
    State(state): State<Arc<AppState<I, O, P, G>>>,
    Path(order_no): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError>
where
    I: InventoryStore + 'static,
    O: OrderStore + 'static,
    P: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    let record = state.engine.query_payment(&OrderNo::new(order_no)).await?;
    Ok(Json(record.into()))
}

/// POST /payments/:order_no/refund — refund a settled payment.
#[tracing::instrument(skip(state, body))]
pub async fn refund<I, O, P, G>(
    State(state): State<Arc<AppState<I, O, P, G>>>,
    Path(order_no): Path<String>,
    Json(body): Json<RefundBody>,
) -> Result<Json<OrderResponse>, ApiError>
where
    I: InventoryStore + 'static,
    O: OrderStore + 'static,
    P: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    let amount = body
        .amount
        .map(|s| {
            s.parse::<Money>()
                .map_err(|e| ApiError::BadRequest(format!("Invalid refund amount: {e}")))
        })
        .transpose()?;

    let order = state
        .engine
        .refund(&OrderNo::new(order_no), amount, body.reason)
        .await?;
    Ok(Json(order.into()))
}
