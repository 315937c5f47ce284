//! Account endpoints: sign-up, log-in, current user

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::User;

use crate::auth::CurrentUser;
use crate::auth::rate_limit::{log_in_rate_limit, sign_up_rate_limit};
use crate::services::account;
use crate::state::AppState;

use super::ApiResult;

/// Public, rate-limited routes
pub fn router(state: AppState) -> Router<AppState> {
    let sign_up_route = Router::new()
        .route("/api/auth/sign-up", post(sign_up))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            sign_up_rate_limit,
        ));
    let log_in_route = Router::new()
        .route("/api/auth/log-in", post(log_in))
        .route_layer(middleware::from_fn_with_state(state, log_in_rate_limit));

    sign_up_route.merge(log_in_route)
}

/// Routes that need an authenticated caller
pub fn me_router() -> Router<AppState> {
    Router::new().route("/api/me", get(me))
}

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LogInResponse {
    pub token: String,
    pub user: User,
}

/// POST /api/auth/sign-up
pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = account::sign_up(state.store.as_ref(), &state.config, &req.email, &req.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/auth/log-in
pub async fn log_in(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<LogInResponse> {
    let (token, user) =
        account::log_in(state.store.as_ref(), &state.config, &req.email, &req.password).await?;
    Ok(Json(LogInResponse { token, user }))
}

/// GET /api/me
pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<User> {
    let user = state
        .store
        .find_user(current.id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "User lookup failed");
            AppError::new(ErrorCode::InternalError)
        })?
        .ok_or_else(AppError::not_authenticated)?;
    Ok(Json(user))
}
