use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use skyfare_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{message}")]
    ConflictError { message: String, code: &'static str },
    #[error("{0}")]
    PaymentRequired(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::AuthenticationError(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::AuthorizationError(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::NotFoundError(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::ConflictError { code, .. } => (StatusCode::CONFLICT, code),
            AppError::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, "payment_failed"),
            AppError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            AppError::InternalServerError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let error_message = match &self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let code = err.code();
        match err {
            CoreError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            CoreError::NotFound { .. } => AppError::NotFoundError(err.to_string()),
            CoreError::PaymentFailed(_) => AppError::PaymentRequired(err.to_string()),
            CoreError::SeatUnavailable(_)
            | CoreError::InvalidTransition { .. }
            | CoreError::StateConflict(_)
            | CoreError::AlreadyPaid(_)
            | CoreError::DuplicateReference(_)
            | CoreError::ConstraintViolation(_) => AppError::ConflictError {
                message: err.to_string(),
                code,
            },
            CoreError::StorageError(_) | CoreError::InternalError(_) => {
                AppError::InternalServerError(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (CoreError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::not_found("Booking", "1"), StatusCode::NOT_FOUND),
            (CoreError::SeatUnavailable("E1A".into()), StatusCode::CONFLICT),
            (CoreError::AlreadyPaid("ABC123".into()), StatusCode::CONFLICT),
            (CoreError::PaymentFailed("declined".into()), StatusCode::PAYMENT_REQUIRED),
            (CoreError::StorageError("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_conflict_keeps_core_code() {
        let err = AppError::from(CoreError::StateConflict("booking is cancelled".into()));
        assert_eq!(err.status_and_code(), (StatusCode::CONFLICT, "state_conflict"));
    }

    #[tokio::test]
    async fn test_rate_limited_body_matches_other_errors() {
        let response = AppError::RateLimited("Rate limit exceeded".into()).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "Rate limit exceeded", "code": "rate_limited" }));
    }
}
