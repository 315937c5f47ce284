//! Cart service
//!
//! Adding to the cart merges into an existing line. Both add and update
//! check the resulting quantity against stock under the product row lock,
//! the same lock checkout takes, so a cart never holds more units than
//! were available when it was last changed.

use shared::error::{AppError, ErrorCode};
use shared::models::CartItem;

use crate::error::ServiceResult;
use crate::store::Store;

pub async fn get_cart(store: &dyn Store, user_id: i64) -> ServiceResult<Vec<CartItem>> {
    Ok(store.list_cart(user_id).await?)
}

/// Add `quantity` units of a product, creating or incrementing the line.
pub async fn add_to_cart(
    store: &dyn Store,
    user_id: i64,
    product_id: i64,
    quantity: i32,
) -> ServiceResult<CartItem> {
    if quantity < 1 {
        return Err(AppError::new(ErrorCode::CartQuantityInvalid).into());
    }

    let mut tx = store.begin().await?;
    tx.lock_cart(user_id).await?;
    let product = tx
        .lock_product(product_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;

    let in_cart = tx
        .cart_item(user_id, product_id)
        .await?
        .map_or(0, |item| item.quantity);
    let wanted = i64::from(in_cart) + i64::from(quantity);
    if wanted > i64::from(product.quantity_left) {
        return Err(exceeded(product_id, wanted, product.quantity_left).into());
    }

    let item = tx.upsert_cart_item(user_id, product_id, quantity).await?;
    tx.commit().await?;
    Ok(item)
}

/// Set an existing line to exactly `quantity` units.
pub async fn update_quantity(
    store: &dyn Store,
    user_id: i64,
    product_id: i64,
    quantity: i32,
) -> ServiceResult<CartItem> {
    if quantity < 1 {
        return Err(AppError::new(ErrorCode::CartQuantityInvalid).into());
    }

    let mut tx = store.begin().await?;
    tx.lock_cart(user_id).await?;
    let product = tx
        .lock_product(product_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;
    if quantity > product.quantity_left {
        return Err(exceeded(product_id, i64::from(quantity), product.quantity_left).into());
    }

    let item = tx
        .set_cart_quantity(user_id, product_id, quantity)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::CartItemNotFound))?;
    tx.commit().await?;
    Ok(item)
}

pub async fn delete_item(store: &dyn Store, user_id: i64, product_id: i64) -> ServiceResult<()> {
    if !store.delete_cart_item(user_id, product_id).await? {
        return Err(AppError::new(ErrorCode::CartItemNotFound).into());
    }
    Ok(())
}

fn exceeded(product_id: i64, requested: i64, available: i32) -> AppError {
    AppError::new(ErrorCode::CartQuantityExceeded)
        .with_detail("product_id", product_id)
        .with_detail("requested", requested)
        .with_detail("available", available)
}
