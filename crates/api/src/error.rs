use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use domain::error::DomainError;
use domain::stores::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited")]
    RateLimited,

    /// A cross-aggregate write sequence was interrupted and compensated.
    /// The request as a whole is safe to retry.
    #[error("Retryable failure: {0}")]
    Retryable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests. Please try again later.".into(),
            ),
            ApiError::Retryable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "retryable", msg.clone())
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Forbidden => ApiError::Forbidden(
                "You do not have permission to perform this action".to_string(),
            ),
            DomainError::NotFound(what) => {
                ApiError::NotFound(format!("The requested {} was not found", what))
            }
            DomainError::Conflict(kind) => ApiError::Conflict(kind.as_str().to_string()),
            DomainError::PartialFailure { .. } => ApiError::Retryable(
                "The operation could not be completed consistently. Please retry.".to_string(),
            ),
            DomainError::Validation(msg) => ApiError::Validation(msg),
            DomainError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("Resource not found".to_string()),
            StoreError::Conflict(kind) => ApiError::Conflict(kind.as_str().to_string()),
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    format!(
                        "{}: {}",
                        field,
                        e.message.clone().map(|m| m.to_string()).unwrap_or_default()
                    )
                })
            })
            .collect();

        ApiError::Validation(details.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::error::ConflictKind;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases: Vec<(DomainError, StatusCode)> = vec![
            (DomainError::Forbidden, StatusCode::FORBIDDEN),
            (DomainError::NotFound("site"), StatusCode::NOT_FOUND),
            (
                DomainError::Conflict(ConflictKind::AlreadyAssigned),
                StatusCode::CONFLICT,
            ),
            (
                DomainError::PartialFailure {
                    operation: "assign",
                    completed: "equipment",
                    failed: "site roster",
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                DomainError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                DomainError::Storage("db down".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn partial_failure_is_presented_as_please_retry() {
        let err = ApiError::from(DomainError::PartialFailure {
            operation: "return",
            completed: "site roster",
            failed: "equipment",
        });
        match err {
            ApiError::Retryable(msg) => assert!(msg.contains("retry")),
            other => panic!("expected Retryable, got {:?}", other),
        }
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let response = ApiError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
