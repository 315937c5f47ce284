//! Shared types for the storefront
//!
//! Error codes, the unified API error/response types, and the data
//! models exchanged between the store layer, the checkout engine and
//! the HTTP API.

pub mod error;
pub mod models;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, ErrorBody, ErrorCategory, ErrorCode};
