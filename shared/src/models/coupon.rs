//! Coupon Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Percentage applied by coupons issued for loyalty
pub const LOYALTY_DISCOUNT_PERCENT: i32 = 10;

/// Single-use discount code owned by one user
///
/// `is_used` only ever moves from `false` to `true`, in the same commit
/// as the order that redeems it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Coupon {
    pub id: i64,
    pub user_id: i64,
    pub code: String,
    /// 0..=100
    pub discount_percent: i32,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin create coupon payload; the code is generated when omitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponCreate {
    pub user_id: i64,
    pub code: Option<String>,
    pub discount_percent: i32,
}
