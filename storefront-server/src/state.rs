//! Application state

use std::sync::Arc;

use crate::auth::rate_limit::RateLimiter;
use crate::checkout::{CheckoutEngine, LoyaltyDispatcher};
use crate::config::Config;
use crate::store::{self, Store};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub checkout: Arc<CheckoutEngine>,
    /// Sign-up and log-in limits, sized from `config`
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Connect the configured store and start background workers.
    pub async fn new(config: Config) -> Result<Self, BoxError> {
        let store = store::init_store(&config).await?;
        Ok(Self::with_store(config, store))
    }

    /// Build state around an existing store. Must be called inside a tokio runtime.
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Self {
        let loyalty = Arc::new(LoyaltyDispatcher::spawn(
            store.clone(),
            config.loyalty_queue_capacity,
            config.loyalty_timeout,
        ));
        let checkout = Arc::new(CheckoutEngine::new(
            store.clone(),
            loyalty,
            config.checkout_timeout,
        ));

        Self {
            rate_limiter: RateLimiter::from_config(&config),
            config: Arc::new(config),
            store,
            checkout,
        }
    }
}
