//! Order queries. Orders are written only by the checkout engine.

use shared::error::{AppError, ErrorCode};
use shared::models::{Order, OrderDetail};

use crate::error::ServiceResult;
use crate::store::Store;

use super::PageQuery;

pub async fn user_orders(store: &dyn Store, user_id: i64) -> ServiceResult<Vec<Order>> {
    Ok(store.list_user_orders(user_id).await?)
}

/// One of the user's orders with its items. Other users' orders read as missing.
pub async fn user_order(
    store: &dyn Store,
    user_id: i64,
    order_id: i64,
) -> ServiceResult<OrderDetail> {
    store
        .get_order(user_id, order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound).into())
}

pub async fn all_orders(store: &dyn Store, page: PageQuery) -> ServiceResult<Vec<Order>> {
    let (limit, offset) = page.limit_offset();
    Ok(store.list_orders(limit, offset).await?)
}
