//! Order pricing
//!
//! All amounts are `i64` minor currency units. Every operation is checked;
//! `None` means the amount does not fit.

use shared::models::CartLine;

/// Discount split of an order total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discounted {
    pub discount: i64,
    pub total: i64,
}

pub fn line_total(unit_price: i64, quantity: i32) -> Option<i64> {
    unit_price.checked_mul(i64::from(quantity))
}

/// Sum of `unit_price × quantity` over all lines.
pub fn subtotal(lines: &[CartLine]) -> Option<i64> {
    lines.iter().try_fold(0i64, |acc, line| {
        acc.checked_add(line_total(line.unit_price, line.quantity)?)
    })
}

/// Take `percent` off `subtotal`, truncating the discount toward zero.
/// `percent` is clamped to `0..=100`.
pub fn apply_discount(subtotal: i64, percent: i32) -> Option<Discounted> {
    let percent = i64::from(percent.clamp(0, 100));
    let discount = subtotal.checked_mul(percent)? / 100;
    Some(Discounted {
        discount,
        total: subtotal - discount,
    })
}
