//! storefront-server: e-commerce backend
//!
//! - Accounts with bearer-token sessions and admin role
//! - Product catalog, per-user carts, single-use coupons
//! - Atomic checkout: row-locked stock, coupon redemption, order persistence
//! - Loyalty coupon after every fifth order, issued in the background

pub mod api;
pub mod auth;
pub mod checkout;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod store;
pub mod util;

pub use config::Config;
pub use state::AppState;
