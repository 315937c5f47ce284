//! Order transaction engine
//!
//! [`CheckoutEngine::place_order`] turns a user's cart into an order in one
//! store transaction:
//!
//! 1. lock the cart and read it with current prices (empty → `EmptyCart`)
//! 2. lock every referenced product in ascending id order and re-read stock
//! 3. reject the whole order if any product is short (`InsufficientStock`)
//! 4. price the lines with checked integer arithmetic
//! 5. lock and redeem the coupon, if a code was given
//! 6. write the order and its items, decrement stock, empty the cart
//! 7. commit
//!
//! Any failure rolls the transaction back. Steps 1 to 6 are bounded by a
//! deadline; when it expires the in-flight transaction is dropped, which
//! rolls it back. Commit itself runs to completion, so a reported timeout
//! always means nothing was written. The loyalty check is queued only
//! after a commit.

pub mod loyalty;
pub mod pricing;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use shared::error::{AppError, ErrorCode};
use shared::models::{NewOrder, OrderDetail};

use crate::store::{Store, StoreError, StoreTx};

pub use loyalty::LoyaltyDispatcher;

/// Checkout failure
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i32,
    },
    #[error("coupon not found")]
    InvalidCoupon,
    #[error("coupon already used")]
    CouponAlreadyUsed,
    #[error("order amount out of range")]
    AmountOverflow,
    #[error("checkout deadline exceeded")]
    Timeout,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Client-recoverable outcome, as opposed to an infrastructure failure
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, Self::Timeout | Self::Store(_))
    }
}

impl From<CheckoutError> for AppError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::EmptyCart => AppError::new(ErrorCode::CartEmpty),
            CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            } => AppError::new(ErrorCode::InsufficientStock)
                .with_detail("product_id", product_id)
                .with_detail("requested", requested)
                .with_detail("available", available),
            CheckoutError::InvalidCoupon => AppError::new(ErrorCode::CouponInvalid),
            CheckoutError::CouponAlreadyUsed => AppError::new(ErrorCode::CouponAlreadyUsed),
            CheckoutError::AmountOverflow => AppError::new(ErrorCode::AmountOverflow),
            CheckoutError::Timeout | CheckoutError::Store(StoreError::LockTimeout) => {
                AppError::new(ErrorCode::TimeoutError)
            }
            CheckoutError::Store(store_err) => {
                tracing::error!(error = %store_err, "Checkout storage error");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

pub struct CheckoutEngine {
    store: Arc<dyn Store>,
    loyalty: Arc<LoyaltyDispatcher>,
    deadline: Duration,
}

impl CheckoutEngine {
    pub fn new(store: Arc<dyn Store>, loyalty: Arc<LoyaltyDispatcher>, deadline: Duration) -> Self {
        Self {
            store,
            loyalty,
            deadline,
        }
    }

    pub fn loyalty(&self) -> &LoyaltyDispatcher {
        &self.loyalty
    }

    /// Place an order from the user's current cart.
    ///
    /// A blank `coupon_code` counts as no coupon.
    pub async fn place_order(
        &self,
        user_id: i64,
        coupon_code: Option<&str>,
    ) -> Result<OrderDetail, CheckoutError> {
        let coupon_code = coupon_code.map(str::trim).filter(|c| !c.is_empty());

        let prepared =
            tokio::time::timeout(self.deadline, self.prepare(user_id, coupon_code)).await;
        let (tx, detail) = match prepared {
            Ok(Ok(prepared)) => prepared,
            Ok(Err(e)) => {
                if e.is_business_rule() {
                    tracing::debug!(user_id, error = %e, "Checkout rejected");
                }
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(user_id, deadline = ?self.deadline, "Checkout deadline exceeded, rolled back");
                return Err(CheckoutError::Timeout);
            }
        };

        // Commit is never cut short: its outcome is the order's outcome
        tx.commit().await?;

        tracing::info!(
            order_id = detail.order.id,
            user_id,
            total = detail.order.total_amount,
            "Order placed"
        );
        self.loyalty.notify(user_id);
        Ok(detail)
    }

    /// Run every checkout step short of commit. Dropping the returned
    /// transaction rolls it back.
    async fn prepare(
        &self,
        user_id: i64,
        coupon_code: Option<&str>,
    ) -> Result<(Box<dyn StoreTx>, OrderDetail), CheckoutError> {
        let mut tx = self.store.begin().await?;
        match place_in_tx(tx.as_mut(), user_id, coupon_code).await {
            Ok(detail) => Ok((tx, detail)),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(user_id, error = %rollback_err, "Checkout rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn place_in_tx(
    tx: &mut dyn StoreTx,
    user_id: i64,
    coupon_code: Option<&str>,
) -> Result<OrderDetail, CheckoutError> {
    tx.lock_cart(user_id).await?;
    let mut lines = tx.cart_lines(user_id).await?;
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    // product_id -> requested units; BTreeMap iterates in lock order
    let mut requested: BTreeMap<i64, i64> = BTreeMap::new();
    for line in &lines {
        *requested.entry(line.product_id).or_default() += i64::from(line.quantity);
    }

    let mut prices: BTreeMap<i64, i64> = BTreeMap::new();
    for (&product_id, &wanted) in &requested {
        let available = match tx.lock_product(product_id).await? {
            Some(product) => {
                prices.insert(product_id, product.price);
                product.quantity_left
            }
            None => 0,
        };
        if wanted > i64::from(available) {
            return Err(CheckoutError::InsufficientStock {
                product_id,
                requested: wanted,
                available,
            });
        }
    }

    // Price from the locked rows
    for line in &mut lines {
        if let Some(&price) = prices.get(&line.product_id) {
            line.unit_price = price;
        }
    }

    let subtotal = pricing::subtotal(&lines).ok_or(CheckoutError::AmountOverflow)?;

    let (discount, total, coupon_id) = match coupon_code {
        Some(code) => {
            let coupon = tx
                .lock_coupon_by_code(user_id, code)
                .await?
                .ok_or(CheckoutError::InvalidCoupon)?;
            if coupon.is_used {
                return Err(CheckoutError::CouponAlreadyUsed);
            }
            let priced = pricing::apply_discount(subtotal, coupon.discount_percent)
                .ok_or(CheckoutError::AmountOverflow)?;
            tx.mark_coupon_used(coupon.id).await?;
            (priced.discount, priced.total, Some(coupon.id))
        }
        None => (0, subtotal, None),
    };

    let order = tx
        .insert_order(&NewOrder {
            user_id,
            subtotal_amount: subtotal,
            discount_amount: discount,
            total_amount: total,
            coupon_id,
        })
        .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in &lines {
        items.push(tx.insert_order_item(order.id, line).await?);
    }

    for (&product_id, &units) in &requested {
        // Bounded by quantity_left, checked above
        tx.decrement_stock(product_id, units as i32).await?;
    }

    tx.clear_cart(user_id).await?;

    Ok(OrderDetail { order, items })
}
