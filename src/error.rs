use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use redis::ErrorKind;
use serde_json::json;

/// Pipeline errors
///
/// Every variant is surfaced to the worker runtime, which leaves the batch
/// pending so the stream's redelivery decides what happens next.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Malformed message: {0}")]
    MalformedEvent(String),

    #[error("Store error: {0}")]
    Store(redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store throttled: {0}")]
    Throttled(String),

    #[error("{operation} still throttled after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: u32 },

    #[error("Preference profile not found for user {0}")]
    ProfileNotFound(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a bounded retry may clear this error
    pub fn is_throttling(&self) -> bool {
        matches!(self, AppError::Throttled(_))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        if is_capacity_error(&err) {
            AppError::Throttled(err.to_string())
        } else {
            AppError::Store(err)
        }
    }
}

/// Redis replies that mean "try again later" rather than "this is broken"
fn is_capacity_error(err: &redis::RedisError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BusyLoadingError
            | ErrorKind::TryAgain
            | ErrorKind::ClusterDown
            | ErrorKind::MasterDown
    ) || err.code() == Some("OOM")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Store(_)
            | AppError::Database(_)
            | AppError::Throttled(_)
            | AppError::RetriesExhausted { .. }
            | AppError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ProfileNotFound(_) => StatusCode::NOT_FOUND,
            AppError::MalformedEvent(_) => StatusCode::BAD_REQUEST,
            AppError::Catalog(_) => StatusCode::BAD_GATEWAY,
            AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_error_is_throttling() {
        let err = redis::RedisError::from((ErrorKind::BusyLoadingError, "LOADING"));
        assert!(AppError::from(err).is_throttling());
    }

    #[test]
    fn test_tryagain_is_throttling() {
        let err = redis::RedisError::from((ErrorKind::TryAgain, "TRYAGAIN"));
        assert!(AppError::from(err).is_throttling());
    }

    #[test]
    fn test_io_error_is_not_throttling() {
        let err = redis::RedisError::from((ErrorKind::IoError, "connection reset"));
        let app_err = AppError::from(err);
        assert!(!app_err.is_throttling());
        assert!(matches!(app_err, AppError::Store(_)));
    }

    #[test]
    fn test_profile_not_found_message() {
        let err = AppError::ProfileNotFound("user-1".to_string());
        assert_eq!(err.to_string(), "Preference profile not found for user user-1");
    }

    #[test]
    fn test_store_errors_map_to_unavailable() {
        let response = AppError::Throttled("busy".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
