//! Admin endpoints (admin role required)

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use shared::error::AppError;
use shared::models::{Coupon, CouponCreate, Order, Product, ProductCreate};

use crate::services::{PageQuery, coupon, order, product};
use crate::state::AppState;

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/coupons", get(list_coupons).post(create_coupon))
        .route("/api/admin/orders", get(list_orders))
        .route("/api/admin/products", post(create_product))
}

/// POST /api/admin/coupons
pub async fn create_coupon(
    State(state): State<AppState>,
    Json(req): Json<CouponCreate>,
) -> Result<(StatusCode, Json<Coupon>), AppError> {
    let created = coupon::create_coupon(state.store.as_ref(), &req).await?;
    tracing::info!(coupon_id = created.id, user_id = created.user_id, "Coupon created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/admin/coupons?page=&per_page=
pub async fn list_coupons(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<Coupon>> {
    Ok(Json(coupon::all_coupons(state.store.as_ref(), page).await?))
}

/// GET /api/admin/orders?page=&per_page=
pub async fn list_orders(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<Order>> {
    Ok(Json(order::all_orders(state.store.as_ref(), page).await?))
}

/// POST /api/admin/products
pub async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<ProductCreate>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let created = product::create_product(state.store.as_ref(), &req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
