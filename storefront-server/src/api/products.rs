//! Product catalog endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use shared::models::Product;

use crate::services::product;
use crate::state::AppState;

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products))
        .route("/api/products/{id}", get(get_product))
}

/// GET /api/products
pub async fn list_products(State(state): State<AppState>) -> ApiResult<Vec<Product>> {
    Ok(Json(product::list_products(state.store.as_ref()).await?))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Product> {
    Ok(Json(product::get_product(state.store.as_ref(), id).await?))
}
