//! Mapping domain and guard failures to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use shop_auth::AuthError;
use shop_commerce::{CommerceError, ErrorKind};

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    Commerce(CommerceError),
    /// A domain error reported with a status other than its kind's default.
    CommerceAs(StatusCode, CommerceError),
    /// A guard denied the request.
    Denied { status: StatusCode, reason: String },
    /// Malformed request outside the domain's own validation.
    BadRequest(String),
}

impl ApiError {
    /// Status transitions requested by the customer are input errors, not conflicts.
    pub fn customer_transition(err: CommerceError) -> Self {
        match err {
            CommerceError::InvalidStatusTransition { .. } => ApiError::CommerceAs(StatusCode::BAD_REQUEST, err),
            other => ApiError::Commerce(other),
        }
    }
}

impl From<CommerceError> for ApiError {
    fn from(err: CommerceError) -> Self {
        ApiError::Commerce(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Denied {
            status: err.status(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::BusinessRule => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn denied_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::FORBIDDEN => "FORBIDDEN",
        StatusCode::TOO_MANY_REQUESTS => "RATE_LIMITED",
        _ => "REQUEST_DENIED",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Commerce(err) => {
                let status = status_for(err.kind());
                let message = match err.kind() {
                    ErrorKind::Internal => {
                        tracing::error!(error = %err, "request failed");
                        "internal error".to_string()
                    }
                    ErrorKind::Unavailable => {
                        tracing::warn!(error = %err, "store unavailable");
                        "service temporarily unavailable".to_string()
                    }
                    _ => err.to_string(),
                };
                (status, err.code().to_string(), message)
            }
            ApiError::CommerceAs(status, err) => (status, err.code().to_string(), err.to_string()),
            ApiError::Denied { status, reason } => (status, denied_code(status).to_string(), reason),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR".to_string(), message),
        };

        (status, Json(ErrorBody { error: ErrorDetail { code, message } })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_for_kind() {
        assert_eq!(status_for(ErrorKind::BusinessRule), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::Unavailable), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let response = ApiError::from(CommerceError::Database("disk on fire at /var/db".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_customer_transition_is_bad_request() {
        let err = ApiError::customer_transition(CommerceError::InvalidStatusTransition {
            from: "SHIPPED".into(),
            to: "CANCELLED".into(),
        });
        assert!(matches!(err, ApiError::CommerceAs(StatusCode::BAD_REQUEST, _)));

        let err = ApiError::customer_transition(CommerceError::NotOrderOwner("o1".into()));
        assert!(matches!(err, ApiError::Commerce(_)));
    }
}
