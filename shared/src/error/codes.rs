//! Unified error codes for the storefront
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Cart errors
//! - 4xxx: Order errors
//! - 5xxx: Coupon errors
//! - 6xxx: Product errors
//! - 9xxx: System errors

use serde::Serialize;
use std::fmt;

/// Error code carried in every error body, serialized as a bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Invalid credentials (email/password)
    InvalidCredentials = 1002,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,
    /// Account is disabled
    AccountDisabled = 1007,
    /// Email is already registered
    EmailAlreadyRegistered = 1008,
    /// Password too short
    PasswordTooShort = 1009,
    /// Too many attempts
    TooManyAttempts = 1010,

    // ==================== 2xxx: Permission ====================
    /// Admin role required
    AdminRequired = 2003,

    // ==================== 3xxx: Cart ====================
    /// Cart line not found
    CartItemNotFound = 3001,
    /// Requested cart quantity exceeds available stock
    CartQuantityExceeded = 3002,
    /// Cart quantity must be at least one
    CartQuantityInvalid = 3003,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Not enough stock to fulfil the order
    InsufficientStock = 4002,
    /// Checkout attempted with an empty cart
    CartEmpty = 4003,
    /// Order amount does not fit the currency range
    AmountOverflow = 4004,

    // ==================== 5xxx: Coupon ====================
    /// Coupon unknown or not owned by the caller
    CouponInvalid = 5001,
    /// Coupon has already been redeemed
    CouponAlreadyUsed = 5002,
    /// Coupon code already exists
    CouponCodeExists = 5003,
    /// Discount percent outside 0..=100
    DiscountOutOfRange = 5004,

    // ==================== 6xxx: Product ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product has invalid price
    ProductInvalidPrice = 6002,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Operation timeout
    TimeoutError = 9004,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "User is not authenticated",
            ErrorCode::InvalidCredentials => "Invalid email or password",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is invalid",
            ErrorCode::AccountDisabled => "Account is disabled",
            ErrorCode::EmailAlreadyRegistered => "Email is already registered",
            ErrorCode::PasswordTooShort => "Password must be at least 8 characters",
            ErrorCode::TooManyAttempts => "Too many attempts",

            // Permission
            ErrorCode::AdminRequired => "Administrator role is required",

            // Cart
            ErrorCode::CartItemNotFound => "Cart item not found",
            ErrorCode::CartQuantityExceeded => "Requested quantity exceeds available stock",
            ErrorCode::CartQuantityInvalid => "Quantity must be at least 1",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::InsufficientStock => "Insufficient stock for product",
            ErrorCode::CartEmpty => "Cart is empty",
            ErrorCode::AmountOverflow => "Order amount is out of range",

            // Coupon
            ErrorCode::CouponInvalid => "Invalid coupon",
            ErrorCode::CouponAlreadyUsed => "Coupon has already been used",
            ErrorCode::CouponCodeExists => "Coupon code already exists",
            ErrorCode::DiscountOutOfRange => "Discount percent must be between 0 and 100",

            // Product
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductInvalidPrice => "Product has invalid price",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::TimeoutError => "Operation timed out",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::ValidationFailed.code(), 2);
        assert_eq!(ErrorCode::InvalidCredentials.code(), 1002);
        assert_eq!(ErrorCode::AdminRequired.code(), 2003);
        assert_eq!(ErrorCode::CartQuantityExceeded.code(), 3002);
        assert_eq!(ErrorCode::InsufficientStock.code(), 4002);
        assert_eq!(ErrorCode::CartEmpty.code(), 4003);
        assert_eq!(ErrorCode::CouponInvalid.code(), 5001);
        assert_eq!(ErrorCode::CouponAlreadyUsed.code(), 5002);
        assert_eq!(ErrorCode::ProductNotFound.code(), 6001);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&ErrorCode::CouponAlreadyUsed).unwrap();
        assert_eq!(json, "5002");
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorCode::CartEmpty.to_string(), "4003");
    }

    #[test]
    fn test_message() {
        assert_eq!(ErrorCode::CartEmpty.message(), "Cart is empty");
        assert_eq!(ErrorCode::CouponInvalid.message(), "Invalid coupon");
    }
}
