//! Order endpoints

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use shared::error::AppError;
use shared::models::{Order, OrderDetail};

use crate::auth::CurrentUser;
use crate::services::order;
use crate::state::AppState;

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/orders", get(list_orders).post(place_order))
        .route("/api/orders/{id}", get(get_order))
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaceOrderQuery {
    pub coupon_code: Option<String>,
}

/// POST /api/orders?coupon_code=
pub async fn place_order(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PlaceOrderQuery>,
) -> Result<(StatusCode, Json<OrderDetail>), AppError> {
    let detail = state
        .checkout
        .place_order(user.id, query.coupon_code.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Vec<Order>> {
    Ok(Json(order::user_orders(state.store.as_ref(), user.id).await?))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<OrderDetail> {
    Ok(Json(order::user_order(state.store.as_ref(), user.id, id).await?))
}
