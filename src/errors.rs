use crate::services::storage_service::StorageError;
use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;

/// A lightweight wrapper for request failures that keeps the message local.
///
/// Rendered as a plain-text, single-line body. There is no machine-readable
/// error code; clients discriminate on the status alone.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 405 Method Not Allowed
    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        } else {
            tracing::warn!(status = %self.status, "{}", self.message);
        }

        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n", self.message),
        )
            .into_response()
    }
}

/// Single translation table from storage failure kind to HTTP status.
impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = match &err {
            StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
            StorageError::Conflict { .. } => StatusCode::CONFLICT,
            StorageError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            StorageError::TimedOut { .. } => StatusCode::REQUEST_TIMEOUT,
            StorageError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn storage_errors_map_by_kind() {
        let not_found: AppError = StorageError::NotFound {
            what: "object `a` in bucket `b`".into(),
        }
        .into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let conflict: AppError = StorageError::Conflict {
            what: "bucket `b` is not empty".into(),
        }
        .into();
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        let invalid: AppError = StorageError::InvalidArgument("bad key".into()).into();
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

        let slow: AppError = StorageError::TimedOut {
            what: "receiving object `k`".into(),
        }
        .into();
        assert_eq!(slow.status, StatusCode::REQUEST_TIMEOUT);

        let io: AppError = StorageError::Io {
            context: "failed to write object".into(),
            source: io::Error::other("disk full"),
        }
        .into();
        assert_eq!(io.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(io.message.contains("disk full"));
    }
}
