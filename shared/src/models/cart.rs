//! Cart Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of a user's cart; `(user_id, product_id)` is unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CartItem {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cart line joined with the authoritative product price, read at checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: i64,
}

/// Add-to-cart payload (quantity defaults to one unit)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartAdd {
    pub quantity: Option<i32>,
}

/// Set-quantity payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartQuantityUpdate {
    pub quantity: i32,
}
