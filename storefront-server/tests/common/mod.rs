//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use shared::error::{AppError, ErrorCode};
use shared::models::{Coupon, Product, ProductCreate, User, UserRole};
use storefront_server::checkout::{CheckoutEngine, LoyaltyDispatcher};
use storefront_server::error::ServiceError;
use storefront_server::services::cart;
use storefront_server::store::{MemoryStore, Store};

pub const DEADLINE: Duration = Duration::from_secs(5);

pub fn engine(store: &MemoryStore) -> CheckoutEngine {
    engine_with(store, DEADLINE, 64)
}

pub fn engine_with(store: &MemoryStore, deadline: Duration, queue: usize) -> CheckoutEngine {
    let store: Arc<dyn Store> = Arc::new(store.clone());
    let loyalty = Arc::new(LoyaltyDispatcher::spawn(
        store.clone(),
        queue,
        Duration::from_secs(2),
    ));
    CheckoutEngine::new(store, loyalty, deadline)
}

pub async fn user(store: &MemoryStore, email: &str) -> User {
    store
        .create_user(email, "not-a-real-hash", UserRole::User)
        .await
        .expect("create user")
}

pub async fn product(store: &MemoryStore, price: i64, quantity_left: i32) -> Product {
    store
        .create_product(&ProductCreate {
            name: format!("Product at {price}"),
            image_url: None,
            price,
            quantity_left,
        })
        .await
        .expect("create product")
}

pub async fn add_to_cart(store: &MemoryStore, user: &User, product: &Product, quantity: i32) {
    cart::add_to_cart(store, user.id, product.id, quantity)
        .await
        .expect("add to cart");
}

pub async fn coupon(store: &MemoryStore, user: &User, code: &str, percent: i32) -> Coupon {
    store
        .create_coupon(user.id, code, percent)
        .await
        .expect("create coupon")
}

pub async fn stock(store: &MemoryStore, product: &Product) -> i32 {
    store
        .get_product(product.id)
        .await
        .expect("get product")
        .expect("product exists")
        .quantity_left
}

pub async fn cart_quantity(store: &MemoryStore, user: &User) -> i32 {
    store
        .list_cart(user.id)
        .await
        .expect("list cart")
        .iter()
        .map(|item| item.quantity)
        .sum()
}

pub fn code(err: ServiceError) -> ErrorCode {
    AppError::from(err).code
}

/// Poll until `check` holds, for effects of the loyalty worker.
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
