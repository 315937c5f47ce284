//! Per-client fixed-window limits on the account routes
//!
//! Quotas come from [`Config`]; counters are kept per route and client IP.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use shared::error::{AppError, ErrorCode};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::Config;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitedRoute {
    LogIn,
    SignUp,
}

impl LimitedRoute {
    fn name(self) -> &'static str {
        match self {
            Self::LogIn => "log_in",
            Self::SignUp => "sign_up",
        }
    }
}

/// Attempts one client may make within `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub attempts: u32,
    pub window: Duration,
}

struct Window {
    started: Instant,
    attempts: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    log_in: Quota,
    sign_up: Quota,
    windows: Arc<Mutex<HashMap<(LimitedRoute, String), Window>>>,
}

impl RateLimiter {
    pub fn new(log_in: Quota, sign_up: Quota) -> Self {
        Self {
            log_in,
            sign_up,
            windows: Arc::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let quota = |attempts| Quota {
            attempts,
            window: config.rate_limit_window,
        };
        Self::new(
            quota(config.log_in_attempts_per_window),
            quota(config.sign_up_attempts_per_window),
        )
    }

    pub fn quota(&self, route: LimitedRoute) -> Quota {
        match route {
            LimitedRoute::LogIn => self.log_in,
            LimitedRoute::SignUp => self.sign_up,
        }
    }

    /// Count one attempt. `false` once the client is over its quota for
    /// the current window.
    pub async fn try_acquire(&self, route: LimitedRoute, client: &str) -> bool {
        let quota = self.quota(route);
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows
            .entry((route, client.to_owned()))
            .or_insert(Window {
                started: now,
                attempts: 0,
            });
        if now.duration_since(window.started) >= quota.window {
            window.started = now;
            window.attempts = 0;
        }
        window.attempts = window.attempts.saturating_add(1);
        window.attempts <= quota.attempts
    }

    /// Drop windows that have run out. The next attempt would start a
    /// fresh one anyway.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|(route, _), window| {
            now.duration_since(window.started) < self.quota(*route).window
        });
    }
}

/// First `X-Forwarded-For` entry, then the peer address.
fn client_ip(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_owned();
    }
    request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

async fn enforce(
    state: &AppState,
    route: LimitedRoute,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_ip(&request);
    if !state.rate_limiter.try_acquire(route, &client).await {
        tracing::warn!(route = route.name(), client = %client, "Rate limit exceeded");
        return Err(AppError::new(ErrorCode::TooManyAttempts));
    }
    Ok(next.run(request).await)
}

pub async fn log_in_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(&state, LimitedRoute::LogIn, request, next).await
}

pub async fn sign_up_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(&state, LimitedRoute::SignUp, request, next).await
}
