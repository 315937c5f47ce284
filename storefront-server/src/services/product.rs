//! Product catalog

use shared::error::{AppError, ErrorCode};
use shared::models::{Product, ProductCreate};

use crate::error::ServiceResult;
use crate::store::Store;

pub async fn list_products(store: &dyn Store) -> ServiceResult<Vec<Product>> {
    Ok(store.list_products().await?)
}

pub async fn get_product(store: &dyn Store, product_id: i64) -> ServiceResult<Product> {
    store
        .get_product(product_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound).into())
}

pub async fn create_product(store: &dyn Store, req: &ProductCreate) -> ServiceResult<Product> {
    if req.name.trim().is_empty() {
        return Err(AppError::validation("product name must not be empty").into());
    }
    if req.price < 0 {
        return Err(AppError::new(ErrorCode::ProductInvalidPrice)
            .with_detail("price", req.price)
            .into());
    }
    if req.quantity_left < 0 {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            "quantity_left must not be negative",
        )
        .into());
    }

    let product = store
        .create_product(&ProductCreate {
            name: req.name.trim().to_string(),
            ..req.clone()
        })
        .await?;
    tracing::info!(product_id = product.id, name = %product.name, "Product created");
    Ok(product)
}
