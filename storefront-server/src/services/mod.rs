//! Business services
//!
//! Validation happens here, before any transaction is opened. Handlers
//! call these and convert [`ServiceError`](crate::error::ServiceError)
//! into `AppError`.

pub mod account;
pub mod cart;
pub mod coupon;
pub mod order;
pub mod product;

use serde::Deserialize;

const DEFAULT_PER_PAGE: i64 = 20;
const MAX_PER_PAGE: i64 = 100;

/// `?page=&per_page=` query, 1-based
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageQuery {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    /// `(limit, offset)` after clamping
    pub fn limit_offset(&self) -> (i64, i64) {
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let page = self.page.unwrap_or(1).max(1);
        (per_page, (page - 1).saturating_mul(per_page))
    }
}
