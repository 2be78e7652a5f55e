//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, GatewayError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Error from a checkout workflow.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    let status = match &err {
        CheckoutError::NotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::InsufficientStock { .. }
        | CheckoutError::InvalidTransition { .. }
        | CheckoutError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
        CheckoutError::EmptyCart
        | CheckoutError::ProductUnavailable { .. }
        | CheckoutError::PaymentVerificationFailed { .. }
        | CheckoutError::Order(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutError::InvalidQuantity(_) | CheckoutError::MalformedWebhook(_) => {
            StatusCode::BAD_REQUEST
        }
        CheckoutError::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
        CheckoutError::GatewayUnavailable(GatewayError::Unavailable(_) | GatewayError::Timeout) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CheckoutError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::Store(_) => {
            tracing::error!(error = %err, "internal server error");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
    };
    (status, err.to_string())
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}
