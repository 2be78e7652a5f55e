//! Payment session, verification and webhook endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use checkout::payment::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use checkout::{OrderRef, PaymentSession, PaymentVerification};
use serde::{Deserialize, Serialize};
use store::Store;

use super::orders::OrderResponse;
use super::parse_order_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct VerifyRequest {
    /// Order id or order number.
    pub order_id: String,
    pub payment_id: String,
}

#[derive(Deserialize)]
pub struct ReturnQuery {
    pub order_id: String,
    pub cf_payment_id: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub order_id: String,
    pub order_number: String,
    pub session_id: String,
    pub amount: String,
    pub amount_minor: i64,
    pub currency: String,
    pub mode: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub outcome: String,
    /// True when the gateway gave no definitive answer.
    pub retry: bool,
    pub detail: Option<String>,
    pub order: OrderResponse,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

impl From<PaymentSession> for SessionResponse {
    fn from(session: PaymentSession) -> Self {
        Self {
            order_id: session.order_id.to_string(),
            order_number: session.order_number.to_string(),
            session_id: session.session_id,
            amount: session.amount.to_string(),
            amount_minor: session.amount.minor_units(),
            currency: session.currency,
            mode: session.mode.to_string(),
        }
    }
}

impl From<PaymentVerification> for VerifyResponse {
    fn from(verification: PaymentVerification) -> Self {
        Self {
            verified: verification.verified,
            outcome: verification.outcome.as_str().to_string(),
            retry: verification.outcome.is_retryable(),
            order: OrderResponse::from(&verification.order),
            detail: verification.detail,
        }
    }
}

/// POST /orders/:id/payment-session
#[tracing::instrument(skip(state))]
pub async fn create_session<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let session = state.payments.create_session(parse_order_id(&id)?).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

/// POST /payment/verify
#[tracing::instrument(skip(state, req))]
pub async fn verify<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    if req.payment_id.trim().is_empty() {
        return Err(ApiError::BadRequest("payment_id is required".to_string()));
    }
    let verification = state
        .payments
        .verify_payment(&OrderRef::parse(&req.order_id), req.payment_id.trim())
        .await?;
    Ok(Json(VerifyResponse::from(verification)))
}

/// GET /payment/return, where the gateway sends the customer back.
#[tracing::instrument(skip(state, query))]
pub async fn return_from_gateway<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ReturnQuery>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .payments
        .verify_payment(&OrderRef::parse(&query.order_id), query.cf_payment_id.trim())
        .await?
        .ensure_verified()?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /payment/webhook, signed by the gateway.
#[tracing::instrument(skip_all)]
pub async fn webhook<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let ack = state
        .payments
        .handle_webhook(&body, header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER))
        .await?;
    Ok(Json(WebhookResponse {
        status: ack.as_str(),
    }))
}
