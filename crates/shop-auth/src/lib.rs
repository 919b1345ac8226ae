//! Caller identity and request guards for the shop API.
//!
//! Identity arrives in trusted headers set by the upstream authenticator.
//! Routes declare an ordered [`Pipeline`] of guards that run before the
//! handler; the first guard to deny decides the response.

mod error;
mod guard;
mod principal;
mod rate_limit;

pub use error::AuthError;
pub use guard::{Guard, GuardDecision, Pipeline, RequireAuthenticated, RequirePermission, RequireRole};
pub use principal::{
    Permission, Principal, RequestMeta, Role, API_KEY_HEADER, USER_ID_HEADER, USER_ROLE_HEADER,
};
pub use rate_limit::{RateLimit, RateLimitConfig};
