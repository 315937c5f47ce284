//! Order Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status written by checkout; orders have no further transitions
pub const ORDER_STATUS_COMPLETED: &str = "completed";

/// Persisted order, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub status: String,
    /// Sum of line totals before any discount
    pub subtotal_amount: i64,
    /// Amount taken off by the coupon (0 without one)
    pub discount_amount: i64,
    /// `subtotal_amount - discount_amount`
    pub total_amount: i64,
    pub coupon_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of one purchased line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: i64,
    pub created_at: DateTime<Utc>,
}

/// Order with its items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Values the checkout engine hands to the store for a new order row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: i64,
    pub subtotal_amount: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub coupon_id: Option<i64>,
}
