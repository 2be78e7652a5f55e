//! Catalog administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{Product, ProductId};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub price: String,
    pub stock_quantity: u32,
    pub active: bool,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name,
            price: product.price.to_string(),
            stock_quantity: product.stock_quantity,
            active: product.active,
        }
    }
}

/// POST /products/:id/restock
#[tracing::instrument(skip(state, req))]
pub async fn restock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .inventory
        .restock(&ProductId::new(id), req.quantity)
        .await?;
    Ok(Json(ProductResponse::from(product)))
}
