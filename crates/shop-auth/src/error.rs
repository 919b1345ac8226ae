//! Authorization errors.

use http::StatusCode;
use thiserror::Error;

use crate::{Permission, Role};

/// Authorization error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No caller identity on the request.
    #[error("authentication required")]
    Unauthenticated,

    /// Role header present but not a known role.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// Caller's role is below the one required.
    #[error("requires role {required}")]
    InsufficientRole { required: Role },

    /// Caller's role does not grant the permission.
    #[error("missing permission {0}")]
    MissingPermission(Permission),

    /// Too many requests in the current window.
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl AuthError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated | AuthError::UnknownRole(_) => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientRole { .. } | AuthError::MissingPermission(_) => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Check if this is an authentication failure.
    pub fn is_auth_failure(&self) -> bool {
        self.status() == StatusCode::UNAUTHORIZED
    }

    /// Check if this is a permission error.
    pub fn is_permission_error(&self) -> bool {
        self.status() == StatusCode::FORBIDDEN
    }
}
