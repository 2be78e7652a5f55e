//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use checkout::{CartLine, CartView};
use domain::{ProductId, UserId};
use serde::{Deserialize, Serialize};
use store::Store;

use super::parse_user_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub user_id: String,
    pub items: Vec<CartLineResponse>,
    pub total: String,
    pub total_minor: i64,
    pub total_items: u32,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub product_id: String,
    pub product_name: String,
    pub unit_price: String,
    pub quantity: u32,
    pub subtotal: String,
    pub in_stock: bool,
}

impl From<CartLine> for CartLineResponse {
    fn from(line: CartLine) -> Self {
        Self {
            product_id: line.product_id.to_string(),
            product_name: line.product_name,
            unit_price: line.unit_price.to_string(),
            quantity: line.quantity,
            subtotal: line.subtotal.to_string(),
            in_stock: line.in_stock,
        }
    }
}

impl From<CartView> for CartResponse {
    fn from(view: CartView) -> Self {
        Self {
            user_id: view.user_id.to_string(),
            items: view.items.into_iter().map(CartLineResponse::from).collect(),
            total: view.total.to_string(),
            total_minor: view.total.minor_units(),
            total_items: view.total_items,
        }
    }
}

async fn respond<S: Store>(state: &AppState<S>, user_id: UserId) -> Result<Json<CartResponse>, ApiError> {
    let view = state.carts.view(user_id).await?;
    Ok(Json(CartResponse::from(view)))
}

/// GET /users/:user_id/cart, creating an empty cart on first access.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    respond(&state, parse_user_id(&user_id)?).await
}

/// DELETE /users/:user_id/cart
#[tracing::instrument(skip(state))]
pub async fn clear<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    state.carts.clear(user_id).await?;
    respond(&state, user_id).await
}

/// POST /users/:user_id/cart/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    state
        .carts
        .add_item(user_id, &ProductId::new(req.product_id), req.quantity)
        .await?;
    respond(&state, user_id).await
}

/// PUT /users/:user_id/cart/items/:product_id; zero or less removes the line.
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, product_id)): Path<(String, String)>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    state
        .carts
        .update_quantity(user_id, &ProductId::new(product_id), req.quantity)
        .await?;
    respond(&state, user_id).await
}

/// DELETE /users/:user_id/cart/items/:product_id
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, product_id)): Path<(String, String)>,
) -> Result<Json<CartResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    state
        .carts
        .remove_item(user_id, &ProductId::new(product_id))
        .await?;
    respond(&state, user_id).await
}
