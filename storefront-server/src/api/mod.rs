//! HTTP API
//!
//! - `/health`, `/api/auth/*`, `/api/products*`: public
//! - `/api/me`, `/api/cart*`, `/api/orders*`, `/api/coupons`: bearer token
//! - `/api/admin/*`: bearer token + admin role

pub mod admin;
pub mod auth;
pub mod cart;
pub mod coupons;
pub mod health;
pub mod orders;
pub mod products;

use axum::{Router, middleware};
use http::{HeaderName, HeaderValue};
use shared::error::AppError;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::user_auth::{require_admin, user_auth_middleware};
use crate::state::AppState;

pub type ApiResult<T> = Result<axum::Json<T>, AppError>;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Full application router with middleware and state
pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .merge(auth::me_router())
        .merge(cart::router())
        .merge(orders::router())
        .merge(coupons::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            user_auth_middleware,
        ));

    // Layers run bottom-up: authenticate, then check the role
    let admin = admin::router()
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            user_auth_middleware,
        ));

    Router::new()
        .merge(health::router())
        .merge(auth::router(state.clone()))
        .merge(products::router())
        .merge(authenticated)
        .merge(admin)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            UuidRequestId,
        ))
        .with_state(state)
}
