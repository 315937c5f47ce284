//! Service-layer error type
//!
//! `ServiceError` sits between store errors and the API-layer `AppError`:
//! infrastructure failures are logged once here and leave the service as
//! an opaque `InternalError`, business errors pass through unchanged.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

use crate::store::StoreError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum ServiceError {
    /// Store or other infrastructure failure (logged, mapped to InternalError)
    Db(BoxError),
    /// Business-rule error carrying its final ErrorCode
    App(AppError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LockTimeout => ServiceError::App(AppError::new(ErrorCode::TimeoutError)),
            other => ServiceError::Db(other.into()),
        }
    }
}

impl From<BoxError> for ServiceError {
    fn from(e: BoxError) -> Self {
        ServiceError::Db(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Db(db_err) => {
                tracing::error!(error = %db_err, "Service storage error");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failure_becomes_opaque_internal_error() {
        let err: AppError =
            ServiceError::from(StoreError::Unavailable("pool closed".into())).into();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(!err.message.contains("pool closed"));
    }

    #[test]
    fn test_lock_timeout_is_retryable() {
        let err: AppError = ServiceError::from(StoreError::LockTimeout).into();
        assert_eq!(err.code, ErrorCode::TimeoutError);
    }

    #[test]
    fn test_business_error_passes_through() {
        let err: AppError = ServiceError::from(AppError::new(ErrorCode::CartItemNotFound)).into();
        assert_eq!(err.code, ErrorCode::CartItemNotFound);
    }
}
