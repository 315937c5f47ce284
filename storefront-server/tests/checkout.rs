//! Checkout transaction: pricing, stock, coupons, atomicity and concurrency

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use shared::models::ORDER_STATUS_COMPLETED;
use storefront_server::checkout::CheckoutError;
use storefront_server::store::{MemoryStore, Store, StoreError};

#[tokio::test]
async fn test_plain_order_decrements_stock_and_empties_cart() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    add_to_cart(&store, &alice, &lamp, 2).await;

    let detail = engine.place_order(alice.id, None).await.unwrap();

    assert_eq!(detail.order.status, ORDER_STATUS_COMPLETED);
    assert_eq!(detail.order.subtotal_amount, 1000);
    assert_eq!(detail.order.discount_amount, 0);
    assert_eq!(detail.order.total_amount, 1000);
    assert_eq!(detail.order.coupon_id, None);
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].product_id, lamp.id);
    assert_eq!(detail.items[0].quantity, 2);
    assert_eq!(detail.items[0].unit_price, 500);

    assert_eq!(stock(&store, &lamp).await, 8);
    assert!(store.list_cart(alice.id).await.unwrap().is_empty());

    let stored = store.get_order(alice.id, detail.order.id).await.unwrap();
    assert_eq!(stored, Some(detail));
}

#[tokio::test]
async fn test_coupon_discount_is_applied_and_redeemed() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    let ten = coupon(&store, &alice, "TENOFF", 10).await;
    add_to_cart(&store, &alice, &lamp, 2).await;

    let detail = engine.place_order(alice.id, Some("TENOFF")).await.unwrap();

    assert_eq!(detail.order.subtotal_amount, 1000);
    assert_eq!(detail.order.discount_amount, 100);
    assert_eq!(detail.order.total_amount, 900);
    assert_eq!(detail.order.coupon_id, Some(ten.id));

    let coupons = store.coupons_of(alice.id);
    assert!(coupons.iter().all(|c| c.is_used));
    assert_eq!(store.count_unused_coupons(alice.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_discount_truncates_fractional_cents() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let pen = product(&store, 333, 10).await;
    coupon(&store, &alice, "FIFTEEN", 15).await;
    add_to_cart(&store, &alice, &pen, 3).await;

    let detail = engine.place_order(alice.id, Some("FIFTEEN")).await.unwrap();

    // 999 * 15 / 100 = 149.85
    assert_eq!(detail.order.discount_amount, 149);
    assert_eq!(detail.order.total_amount, 850);
}

#[tokio::test]
async fn test_insufficient_stock_leaves_everything_untouched() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let bob = user(&store, "bob@shop.io").await;
    let lamp = product(&store, 500, 5).await;

    add_to_cart(&store, &alice, &lamp, 5).await;
    add_to_cart(&store, &bob, &lamp, 2).await;
    engine.place_order(bob.id, None).await.unwrap();
    assert_eq!(stock(&store, &lamp).await, 3);

    let err = engine.place_order(alice.id, None).await.unwrap_err();
    match err {
        CheckoutError::InsufficientStock {
            product_id,
            requested,
            available,
        } => {
            assert_eq!(product_id, lamp.id);
            assert_eq!(requested, 5);
            assert_eq!(available, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(stock(&store, &lamp).await, 3);
    assert_eq!(cart_quantity(&store, &alice).await, 5);
    assert!(store.list_user_orders(alice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_one_short_line_rejects_the_whole_order() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let bob = user(&store, "bob@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    let bulb = product(&store, 100, 1).await;

    add_to_cart(&store, &alice, &lamp, 3).await;
    add_to_cart(&store, &alice, &bulb, 1).await;
    add_to_cart(&store, &bob, &bulb, 1).await;
    engine.place_order(bob.id, None).await.unwrap();

    let err = engine.place_order(alice.id, None).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InsufficientStock { product_id, .. } if product_id == bulb.id));

    assert_eq!(stock(&store, &lamp).await, 10);
    assert_eq!(stock(&store, &bulb).await, 0);
    assert_eq!(cart_quantity(&store, &alice).await, 4);
}

#[tokio::test]
async fn test_used_coupon_is_rejected_without_side_effects() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    coupon(&store, &alice, "ONCE", 20).await;

    add_to_cart(&store, &alice, &lamp, 1).await;
    engine.place_order(alice.id, Some("ONCE")).await.unwrap();

    add_to_cart(&store, &alice, &lamp, 2).await;
    let err = engine.place_order(alice.id, Some("ONCE")).await.unwrap_err();
    assert!(matches!(err, CheckoutError::CouponAlreadyUsed));

    assert_eq!(stock(&store, &lamp).await, 9);
    assert_eq!(cart_quantity(&store, &alice).await, 2);
    assert_eq!(store.list_user_orders(alice.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_or_foreign_coupon_is_invalid() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let bob = user(&store, "bob@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    coupon(&store, &bob, "BOBS", 50).await;
    add_to_cart(&store, &alice, &lamp, 1).await;

    let err = engine.place_order(alice.id, Some("NOPE")).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidCoupon));

    let err = engine.place_order(alice.id, Some("BOBS")).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidCoupon));

    assert_eq!(store.count_unused_coupons(bob.id).await.unwrap(), 1);
    assert_eq!(stock(&store, &lamp).await, 10);
    assert_eq!(cart_quantity(&store, &alice).await, 1);
}

#[tokio::test]
async fn test_blank_coupon_code_means_no_coupon() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    add_to_cart(&store, &alice, &lamp, 1).await;

    let detail = engine.place_order(alice.id, Some("  ")).await.unwrap();
    assert_eq!(detail.order.total_amount, 500);
    assert_eq!(detail.order.coupon_id, None);
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;

    let err = engine.place_order(alice.id, None).await.unwrap_err();
    assert!(matches!(err, CheckoutError::EmptyCart));
    assert_eq!(store.order_count(), 0);
}

#[tokio::test]
async fn test_failure_midway_rolls_back_every_table() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    let bulb = product(&store, 100, 10).await;
    coupon(&store, &alice, "TENOFF", 10).await;
    add_to_cart(&store, &alice, &lamp, 2).await;
    add_to_cart(&store, &alice, &bulb, 3).await;

    store.set_fail_on_order_item(true);
    let err = engine.place_order(alice.id, Some("TENOFF")).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Store(_)));

    assert_eq!(store.order_count(), 0);
    assert_eq!(store.order_item_count(), 0);
    assert_eq!(stock(&store, &lamp).await, 10);
    assert_eq!(stock(&store, &bulb).await, 10);
    assert_eq!(store.count_unused_coupons(alice.id).await.unwrap(), 1);
    assert_eq!(cart_quantity(&store, &alice).await, 5);

    // The same cart goes through once the store recovers
    store.set_fail_on_order_item(false);
    let detail = engine.place_order(alice.id, Some("TENOFF")).await.unwrap();
    assert_eq!(detail.order.total_amount, 1170);
}

#[tokio::test]
async fn test_failed_commit_rolls_back() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    add_to_cart(&store, &alice, &lamp, 4).await;

    store.set_fail_on_commit(true);
    let err = engine.place_order(alice.id, None).await.unwrap_err();
    assert!(!err.is_business_rule());

    assert_eq!(store.order_count(), 0);
    assert_eq!(stock(&store, &lamp).await, 10);
    assert_eq!(cart_quantity(&store, &alice).await, 4);
}

#[tokio::test]
async fn test_deadline_rolls_back_blocked_checkout() {
    let store = MemoryStore::with_lock_timeout(Duration::from_secs(30));
    let engine = engine_with(&store, Duration::from_millis(100), 8);
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    add_to_cart(&store, &alice, &lamp, 1).await;

    let mut holder = store.begin().await.unwrap();
    holder.lock_product(lamp.id).await.unwrap();

    let err = engine.place_order(alice.id, None).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Timeout));
    holder.rollback().await.unwrap();

    assert_eq!(store.order_count(), 0);
    assert_eq!(stock(&store, &lamp).await, 10);
    assert_eq!(cart_quantity(&store, &alice).await, 1);

    // Locks of the abandoned attempt were released
    engine.place_order(alice.id, None).await.unwrap();
}

#[tokio::test]
async fn test_slow_commit_outlasting_deadline_still_places_order() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, Duration::from_millis(50), 8);
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    add_to_cart(&store, &alice, &lamp, 3).await;

    store.set_commit_delay(Duration::from_millis(200));
    let detail = engine.place_order(alice.id, None).await.unwrap();
    store.set_commit_delay(Duration::ZERO);

    assert_eq!(detail.order.total_amount, 1500);
    assert_eq!(store.order_count(), 1);
    assert_eq!(stock(&store, &lamp).await, 7);
    assert_eq!(cart_quantity(&store, &alice).await, 0);
}

#[tokio::test]
async fn test_lock_wait_timeout_surfaces_as_store_error() {
    let store = MemoryStore::with_lock_timeout(Duration::from_millis(50));
    let engine = engine(&store);
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    add_to_cart(&store, &alice, &lamp, 1).await;

    let mut holder = store.begin().await.unwrap();
    holder.lock_product(lamp.id).await.unwrap();

    let err = engine.place_order(alice.id, None).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Store(StoreError::LockTimeout)));
    drop(holder);
    assert_eq!(cart_quantity(&store, &alice).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_unit_goes_to_exactly_one_buyer() {
    let store = MemoryStore::new();
    let engine = Arc::new(engine(&store));
    let alice = user(&store, "alice@shop.io").await;
    let bob = user(&store, "bob@shop.io").await;
    let lamp = product(&store, 500, 1).await;
    add_to_cart(&store, &alice, &lamp, 1).await;
    add_to_cart(&store, &bob, &lamp, 1).await;

    let (a, b) = tokio::join!(
        tokio::spawn({
            let engine = engine.clone();
            async move { engine.place_order(alice.id, None).await }
        }),
        tokio::spawn({
            let engine = engine.clone();
            async move { engine.place_order(bob.id, None).await }
        }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let won = results.iter().filter(|r| r.is_ok()).count();
    let short = results
        .iter()
        .filter(|r| matches!(r, Err(CheckoutError::InsufficientStock { .. })))
        .count();
    assert_eq!(won, 1);
    assert_eq!(short, 1);
    assert_eq!(stock(&store, &lamp).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_checkouts_never_oversell() {
    const STOCK: i32 = 20;
    const BUYERS: usize = 60;

    let store = MemoryStore::new();
    let engine = Arc::new(engine_with(&store, Duration::from_secs(10), 256));
    let lamp = product(&store, 250, STOCK).await;

    let mut buyers = Vec::with_capacity(BUYERS);
    for i in 0..BUYERS {
        let buyer = user(&store, &format!("buyer{i}@shop.io")).await;
        add_to_cart(&store, &buyer, &lamp, 1 + (i % 2) as i32).await;
        buyers.push(buyer);
    }

    let handles: Vec<_> = buyers
        .iter()
        .map(|buyer| {
            let engine = engine.clone();
            let user_id = buyer.id;
            tokio::spawn(async move { engine.place_order(user_id, None).await })
        })
        .collect();

    let mut sold = 0i64;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(detail) => sold += i64::from(detail.items[0].quantity),
            Err(CheckoutError::InsufficientStock { .. }) => {}
            Err(e) => panic!("unexpected checkout failure: {e}"),
        }
    }

    let left = stock(&store, &lamp).await;
    assert!(left >= 0);
    assert!(sold <= i64::from(STOCK));
    assert_eq!(sold + i64::from(left), i64::from(STOCK));

    let committed: i64 = store
        .list_orders(1000, 0)
        .await
        .unwrap()
        .iter()
        .map(|o| o.subtotal_amount / 250)
        .sum();
    assert_eq!(committed, sold);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_overlapping_carts_do_not_deadlock() {
    const BUYERS: usize = 24;

    let store = MemoryStore::new();
    let engine = Arc::new(engine_with(&store, Duration::from_secs(10), 256));
    let products = [
        product(&store, 100, 1000).await,
        product(&store, 200, 1000).await,
        product(&store, 300, 1000).await,
    ];

    let mut buyers = Vec::with_capacity(BUYERS);
    for i in 0..BUYERS {
        let buyer = user(&store, &format!("buyer{i}@shop.io")).await;
        // Alternate the order lines are added in
        if i % 2 == 0 {
            for p in &products {
                add_to_cart(&store, &buyer, p, 1).await;
            }
        } else {
            for p in products.iter().rev() {
                add_to_cart(&store, &buyer, p, 1).await;
            }
        }
        buyers.push(buyer);
    }

    let handles: Vec<_> = buyers
        .iter()
        .map(|buyer| {
            let engine = engine.clone();
            let user_id = buyer.id;
            tokio::spawn(async move { engine.place_order(user_id, None).await })
        })
        .collect();

    let results = tokio::time::timeout(
        Duration::from_secs(20),
        futures::future::join_all(handles),
    )
    .await
    .expect("checkouts deadlocked");

    for result in results {
        let detail = result.unwrap().unwrap();
        assert_eq!(detail.order.total_amount, 600);
        assert_eq!(detail.items.len(), 3);
    }
    for p in &products {
        assert_eq!(stock(&store, p).await, 1000 - BUYERS as i32);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_user_double_submit_places_one_order() {
    let store = MemoryStore::new();
    let engine = Arc::new(engine(&store));
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 500, 10).await;
    add_to_cart(&store, &alice, &lamp, 2).await;

    let (a, b) = tokio::join!(
        tokio::spawn({
            let engine = engine.clone();
            async move { engine.place_order(alice.id, None).await }
        }),
        tokio::spawn({
            let engine = engine.clone();
            async move { engine.place_order(alice.id, None).await }
        }),
    );
    let results = [a.unwrap(), b.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(CheckoutError::EmptyCart)))
    );
    assert_eq!(stock(&store, &lamp).await, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_coupon_redeemed_at_most_once_under_contention() {
    let store = MemoryStore::new();
    let engine = Arc::new(engine(&store));
    let alice = user(&store, "alice@shop.io").await;
    let lamp = product(&store, 1000, 100).await;
    coupon(&store, &alice, "HALF", 50).await;
    add_to_cart(&store, &alice, &lamp, 1).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            let user_id = alice.id;
            tokio::spawn(async move { engine.place_order(user_id, Some("HALF")).await })
        })
        .collect();

    let discounted = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter_map(|r| r.unwrap().ok())
        .filter(|d| d.order.discount_amount > 0)
        .count();
    assert_eq!(discounted, 1);
    assert!(store.coupons_of(alice.id).iter().all(|c| c.is_used));
}
