//! Cart endpoints

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::get,
};
use shared::error::AppError;
use shared::models::{CartAdd, CartItem, CartQuantityUpdate};

use crate::auth::CurrentUser;
use crate::services::cart;
use crate::state::AppState;

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/cart", get(get_cart)).route(
        "/api/cart/{product_id}",
        axum::routing::post(add_item)
            .put(update_item)
            .delete(delete_item),
    )
}

/// GET /api/cart
pub async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Vec<CartItem>> {
    Ok(Json(cart::get_cart(state.store.as_ref(), user.id).await?))
}

/// POST /api/cart/{product_id}
///
/// Body is optional; without one a single unit is added.
pub async fn add_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(product_id): Path<i64>,
    body: Bytes,
) -> ApiResult<CartItem> {
    let req: CartAdd = if body.iter().all(u8::is_ascii_whitespace) {
        CartAdd::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::invalid_request(format!("invalid body: {e}")))?
    };
    let quantity = req.quantity.unwrap_or(1);
    let item = cart::add_to_cart(state.store.as_ref(), user.id, product_id, quantity).await?;
    Ok(Json(item))
}

/// PUT /api/cart/{product_id}
pub async fn update_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(product_id): Path<i64>,
    Json(req): Json<CartQuantityUpdate>,
) -> ApiResult<CartItem> {
    let item =
        cart::update_quantity(state.store.as_ref(), user.id, product_id, req.quantity).await?;
    Ok(Json(item))
}

/// DELETE /api/cart/{product_id}
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(product_id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    cart::delete_item(state.store.as_ref(), user.id, product_id).await?;
    Ok(Json(serde_json::json!({ "message": "Cart item deleted" })))
}
