//! Checkout, order query and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use checkout::{PlaceOrder, Transition};
use domain::{LifecycleEvent, Order, OrderItem, OrderNumber, OrderStatus, PaymentStatus};
use serde::{Deserialize, Serialize};
use store::{OrderFilter, Store};

use super::{parse_order_id, parse_user_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: String,
    pub billing_address: Option<String>,
}

/// Page size used when a listing does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a listing will return.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub event: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub status: String,
    pub payment_status: String,
    pub items: Vec<OrderItemResponse>,
    pub total_amount: String,
    pub total_minor: i64,
    pub shipping_address: String,
    pub billing_address: String,
    pub gateway_session_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: String,
    pub subtotal: String,
}

#[derive(Serialize)]
pub struct TransitionResponse {
    pub changed: bool,
    pub order: OrderResponse,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id().to_string(),
            product_name: item.product_name().to_string(),
            quantity: item.quantity(),
            unit_price: item.unit_price().to_string(),
            subtotal: item.subtotal().to_string(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            order_number: order.order_number().to_string(),
            user_id: order.user_id().to_string(),
            status: order.status().to_string(),
            payment_status: order.payment_status().to_string(),
            items: order.items().iter().map(OrderItemResponse::from).collect(),
            total_amount: order.total_amount().to_string(),
            total_minor: order.total_amount().minor_units(),
            shipping_address: order.shipping_address().to_string(),
            billing_address: order.billing_address().to_string(),
            gateway_session_id: order.gateway_session_id().map(String::from),
            gateway_payment_id: order.gateway_payment_id().map(String::from),
            created_at: order.created_at().to_rfc3339(),
            updated_at: order.updated_at().to_rfc3339(),
            version: order.version().as_i64(),
        }
    }
}

impl From<Transition> for TransitionResponse {
    fn from(transition: Transition) -> Self {
        Self {
            changed: transition.is_advanced(),
            order: OrderResponse::from(&transition.order),
        }
    }
}

// -- Handlers --

/// POST /users/:user_id/orders, converting the cart into an order.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let user_id = parse_user_id(&user_id)?;
    if req.shipping_address.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "shipping_address is required".to_string(),
        ));
    }

    let mut request = PlaceOrder::new(req.shipping_address);
    if let Some(billing) = req.billing_address.filter(|b| !b.trim().is_empty()) {
        request = request.with_billing_address(billing);
    }

    let order = state.orders.create_order(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

fn paged(limit: Option<usize>, offset: Option<usize>) -> Result<OrderFilter, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(OrderFilter::new().limit(limit).offset(offset.unwrap_or(0)))
}

/// GET /users/:user_id/orders?limit=&offset=, newest first.
#[tracing::instrument(skip(state, page))]
pub async fn list_for_user<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let filter = paged(page.limit, page.offset)?;
    let orders = state.orders.orders_for_user(user_id, filter).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders?status=&payment_status=&limit=&offset=
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let mut filter = paged(query.limit, query.offset)?;
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status: OrderStatus = status
            .parse()
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
        filter = filter.with_status(status);
    }
    if let Some(payment) = query.payment_status.as_deref().filter(|s| !s.is_empty()) {
        let payment: PaymentStatus = payment
            .parse()
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
        filter = filter.with_payment_status(payment);
    }

    let orders = state.orders.list_orders(filter).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.get_order(parse_order_id(&id)?).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/by-number/:order_number
#[tracing::instrument(skip(state))]
pub async fn get_by_number<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .orders
        .get_order_by_number(&OrderNumber::new(order_number))
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/:id/cancel, restoring reserved stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let transition = state.orders.cancel(parse_order_id(&id)?).await?;
    Ok(Json(TransitionResponse::from(transition)))
}

/// POST /orders/:id/transitions, for fulfilment events.
#[tracing::instrument(skip(state, req))]
pub async fn transition<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let event: LifecycleEvent = serde_json::from_value(serde_json::Value::String(req.event))
        .map_err(|e| ApiError::BadRequest(format!("Invalid event: {e}")))?;

    let transition = state.orders.advance(order_id, event).await?;
    Ok(Json(TransitionResponse::from(transition)))
}
