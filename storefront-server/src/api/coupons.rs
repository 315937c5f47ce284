//! Coupon endpoints for customers

use axum::{Extension, Json, Router, extract::State, routing::get};
use shared::models::Coupon;

use crate::auth::CurrentUser;
use crate::services::coupon;
use crate::state::AppState;

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/coupons", get(available_coupons))
}

/// GET /api/coupons
///
/// Unused coupons of the caller.
pub async fn available_coupons(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Vec<Coupon>> {
    Ok(Json(
        coupon::available_coupons(state.store.as_ref(), user.id).await?,
    ))
}
