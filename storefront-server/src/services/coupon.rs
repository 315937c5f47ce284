//! Coupon service

use shared::error::{AppError, ErrorCode};
use shared::models::{Coupon, CouponCreate};

use crate::error::ServiceResult;
use crate::store::Store;
use crate::util::generate_coupon_code;

use super::PageQuery;

const MAX_CODE_LEN: usize = 64;

/// Issue a coupon to a user. A missing or blank code is generated.
pub async fn create_coupon(store: &dyn Store, req: &CouponCreate) -> ServiceResult<Coupon> {
    if !(0..=100).contains(&req.discount_percent) {
        return Err(AppError::new(ErrorCode::DiscountOutOfRange)
            .with_detail("discount_percent", req.discount_percent)
            .into());
    }

    let code = match req.code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            if code.len() > MAX_CODE_LEN {
                return Err(AppError::validation(format!(
                    "coupon code must be at most {MAX_CODE_LEN} characters"
                ))
                .into());
            }
            code.to_string()
        }
        _ => generate_coupon_code(),
    };

    if store.find_user(req.user_id).await?.is_none() {
        return Err(AppError::not_found("User").into());
    }

    match store
        .create_coupon(req.user_id, &code, req.discount_percent)
        .await
    {
        Ok(coupon) => Ok(coupon),
        Err(e) if e.is_unique_violation() => Err(AppError::new(ErrorCode::CouponCodeExists)
            .with_detail("code", code)
            .into()),
        Err(e) => Err(e.into()),
    }
}

/// Unused coupons of a user, newest first.
pub async fn available_coupons(store: &dyn Store, user_id: i64) -> ServiceResult<Vec<Coupon>> {
    Ok(store.list_unused_coupons(user_id).await?)
}

/// Every coupon, newest first.
pub async fn all_coupons(store: &dyn Store, page: PageQuery) -> ServiceResult<Vec<Coupon>> {
    let (limit, offset) = page.limit_offset();
    Ok(store.list_coupons(limit, offset).await?)
}
