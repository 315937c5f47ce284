//! Data models
//!
//! Shared between the store backends, the checkout engine and the API.
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (BIGSERIAL), money is `i64` minor currency units,
//! quantities are `i32`.

pub mod cart;
pub mod coupon;
pub mod order;
pub mod product;
pub mod user;

// Re-exports
pub use cart::*;
pub use coupon::*;
pub use order::*;
pub use product::*;
pub use user::*;
