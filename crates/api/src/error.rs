//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use engine::EngineError;
use gateway::GatewayError;

/// API-level error type that maps to HTTP responses.
///
/// Almost everything arrives as an [`EngineError`]; `BadRequest` covers
/// request-shape problems the engine never sees, like an unparseable
/// refund amount.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Engine error.
    Engine(EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Engine(err) => engine_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn engine_error_to_response(err: EngineError) -> (StatusCode, String) {
    let status = match &err {
        EngineError::OrderNotFound(_)
        | EngineError::ProductNotFound(_)
        | EngineError::PaymentNotFound(_) => StatusCode::NOT_FOUND,

        EngineError::Order(order_err) => match order_err {
            OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::RefundReasonRequired
            | OrderError::IncompleteShippingInfo(_) => StatusCode::BAD_REQUEST,
        },

        EngineError::InsufficientStock { .. }
        | EngineError::AlreadySettled(_)
        | EngineError::NotRefundable(_)
        | EngineError::RefundRequiresReversal(_)
        | EngineError::AmountMismatch { .. }
        | EngineError::SettlementConflict { .. }
        | EngineError::TransitionConflict(_) => StatusCode::CONFLICT,

        EngineError::RefundExceedsPayment { .. } => StatusCode::BAD_REQUEST,

        EngineError::Gateway(GatewayError::UnauthenticatedCallback(_)) => StatusCode::UNAUTHORIZED,
        EngineError::Gateway(GatewayError::MalformedPayload(_)) => StatusCode::BAD_REQUEST,
        EngineError::Gateway(GatewayError::Provider(_)) => StatusCode::BAD_GATEWAY,

        EngineError::SettlementTimeout(_) => StatusCode::GATEWAY_TIMEOUT,

        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "request failed");
    }
    (status, err.to_string())
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}
