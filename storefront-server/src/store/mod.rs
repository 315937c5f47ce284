//! Persistence layer
//!
//! [`Store`] covers reads and single-statement writes; [`StoreTx`] is a
//! transaction handle for the multi-step operations (checkout, cart
//! updates) that need row locks. A `StoreTx` that is dropped without
//! `commit` rolls back.
//!
//! Implementations:
//! - [`PgStore`]: PostgreSQL via sqlx, `SELECT ... FOR UPDATE` row locks
//! - [`MemoryStore`]: in-process tables with per-row async locks, used by
//!   the test-suite and by development runs without a database

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use shared::models::{
    CartItem, CartLine, Coupon, NewOrder, Order, OrderDetail, OrderItem, Product, ProductCreate,
    User, UserCredentials, UserRole,
};

use crate::config::Config;

pub use memory::MemoryStore;
pub use postgres::PgStore;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Postgres unique_violation
const PG_UNIQUE_VIOLATION: &str = "23505";
/// Postgres lock_not_available (raised when lock_timeout expires)
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

/// Errors raised by a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write; carries the constraint name
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    /// Waiting for a row lock exceeded the configured lock timeout
    #[error("lock wait timed out")]
    LockTimeout,
    #[error("database error: {0}")]
    Database(sqlx::Error),
    /// Backend refused the operation (closed pool, injected failure, ...)
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            match db_err.code().as_deref() {
                Some(PG_UNIQUE_VIOLATION) => {
                    return StoreError::UniqueViolation(
                        db_err.constraint().unwrap_or("unknown").to_string(),
                    );
                }
                Some(PG_LOCK_NOT_AVAILABLE) => return StoreError::LockTimeout,
                _ => {}
            }
        }
        StoreError::Database(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Product row read under an exclusive lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedProduct {
    pub id: i64,
    pub price: i64,
    pub quantity_left: i32,
}

/// Reads and single-statement writes against the shared store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    // ── Users ──

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: UserRole,
    ) -> StoreResult<User>;

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>>;

    async fn find_credentials_by_email(&self, email: &str)
    -> StoreResult<Option<UserCredentials>>;

    // ── Products ──

    async fn create_product(&self, product: &ProductCreate) -> StoreResult<Product>;

    async fn list_products(&self) -> StoreResult<Vec<Product>>;

    async fn get_product(&self, product_id: i64) -> StoreResult<Option<Product>>;

    // ── Cart ──

    /// Cart lines of a user, newest first.
    async fn list_cart(&self, user_id: i64) -> StoreResult<Vec<CartItem>>;

    /// Returns `false` when the line did not exist.
    async fn delete_cart_item(&self, user_id: i64, product_id: i64) -> StoreResult<bool>;

    // ── Coupons ──

    /// Insert an unused coupon. Duplicate codes fail with `UniqueViolation`.
    async fn create_coupon(
        &self,
        user_id: i64,
        code: &str,
        discount_percent: i32,
    ) -> StoreResult<Coupon>;

    async fn list_unused_coupons(&self, user_id: i64) -> StoreResult<Vec<Coupon>>;

    async fn count_unused_coupons(&self, user_id: i64) -> StoreResult<i64>;

    /// All coupons, newest first.
    async fn list_coupons(&self, limit: i64, offset: i64) -> StoreResult<Vec<Coupon>>;

    // ── Orders ──

    /// All orders, newest first.
    async fn list_orders(&self, limit: i64, offset: i64) -> StoreResult<Vec<Order>>;

    async fn list_user_orders(&self, user_id: i64) -> StoreResult<Vec<Order>>;

    /// Order with items, scoped to its owner.
    async fn get_order(&self, user_id: i64, order_id: i64) -> StoreResult<Option<OrderDetail>>;

    async fn count_completed_orders(&self, user_id: i64) -> StoreResult<i64>;
}

/// Operations that run inside one transaction.
///
/// Locks taken through `lock_*` are held until `commit`, `rollback` or drop.
/// Lock order: cart, then products by ascending id, then the coupon.
#[async_trait]
pub trait StoreTx: Send {
    // ── Inventory ledger ──

    /// Exclusively lock a product row and read its current stock.
    async fn lock_product(&mut self, product_id: i64) -> StoreResult<Option<LockedProduct>>;

    /// Subtract purchased units. The caller must hold the row lock and
    /// must already have checked that enough stock is left.
    async fn decrement_stock(&mut self, product_id: i64, quantity: i32) -> StoreResult<()>;

    // ── Cart store ──

    /// Serialize cart mutations and checkouts of one user. Taken before
    /// any product lock.
    async fn lock_cart(&mut self, user_id: i64) -> StoreResult<()>;

    /// The user's cart joined with current product prices.
    async fn cart_lines(&mut self, user_id: i64) -> StoreResult<Vec<CartLine>>;

    async fn cart_item(&mut self, user_id: i64, product_id: i64) -> StoreResult<Option<CartItem>>;

    /// Insert a line or add `quantity` to the existing one.
    async fn upsert_cart_item(
        &mut self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> StoreResult<CartItem>;

    /// Overwrite the quantity of an existing line; `None` when absent.
    async fn set_cart_quantity(
        &mut self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> StoreResult<Option<CartItem>>;

    /// Delete every line of the user's cart, returning how many went.
    async fn clear_cart(&mut self, user_id: i64) -> StoreResult<u64>;

    // ── Coupon ledger ──

    /// Lock the coupon with `code` owned by `user_id`.
    async fn lock_coupon_by_code(&mut self, user_id: i64, code: &str)
    -> StoreResult<Option<Coupon>>;

    async fn mark_coupon_used(&mut self, coupon_id: i64) -> StoreResult<()>;

    // ── Orders ──

    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order>;

    async fn insert_order_item(
        &mut self,
        order_id: i64,
        line: &CartLine,
    ) -> StoreResult<OrderItem>;

    // ── Completion ──

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Select the store backend from configuration.
///
/// `DATABASE_URL` set → Postgres (migrations applied). Unset → the
/// in-memory store, which is only accepted in development.
pub async fn init_store(config: &Config) -> Result<Arc<dyn Store>, BoxError> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.db_max_connections, config.lock_timeout)
                .await?;
            store.migrate().await?;
            tracing::info!("Store: PostgreSQL");
            Ok(Arc::new(store))
        }
        None if config.is_development() => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is not persisted)");
            Ok(Arc::new(MemoryStore::with_lock_timeout(config.lock_timeout)))
        }
        None => Err(format!("DATABASE_URL must be set in {} environment", config.environment).into()),
    }
}
