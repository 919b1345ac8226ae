//! Request guards and the pipeline that runs them.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;

use crate::{AuthError, Permission, RequestMeta, Role};

/// Outcome of a single guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny { status: StatusCode, reason: String },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

impl From<AuthError> for GuardDecision {
    fn from(err: AuthError) -> Self {
        GuardDecision::Deny {
            status: err.status(),
            reason: err.to_string(),
        }
    }
}

/// A check run before a handler.
pub trait Guard: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn check(&self, meta: &RequestMeta) -> GuardDecision;
}

/// Requires an identified caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireAuthenticated;

impl Guard for RequireAuthenticated {
    fn name(&self) -> &'static str {
        "authenticated"
    }

    fn check(&self, meta: &RequestMeta) -> GuardDecision {
        if meta.principal.is_authenticated() {
            GuardDecision::Allow
        } else {
            AuthError::Unauthenticated.into()
        }
    }
}

/// Requires a role at or above the given one.
#[derive(Debug, Clone, Copy)]
pub struct RequireRole(pub Role);

impl Guard for RequireRole {
    fn name(&self) -> &'static str {
        "role"
    }

    fn check(&self, meta: &RequestMeta) -> GuardDecision {
        match meta.principal.role() {
            None => AuthError::Unauthenticated.into(),
            Some(role) if role.at_least(self.0) => GuardDecision::Allow,
            Some(_) => AuthError::InsufficientRole { required: self.0 }.into(),
        }
    }
}

/// Requires the caller's role to grant a permission.
#[derive(Debug, Clone, Copy)]
pub struct RequirePermission(pub Permission);

impl Guard for RequirePermission {
    fn name(&self) -> &'static str {
        "permission"
    }

    fn check(&self, meta: &RequestMeta) -> GuardDecision {
        match meta.principal.role() {
            None => AuthError::Unauthenticated.into(),
            Some(role) if role.grants(self.0) => GuardDecision::Allow,
            Some(_) => AuthError::MissingPermission(self.0).into(),
        }
    }
}

/// Ordered list of guards; the first deny wins.
#[derive(Clone, Default)]
pub struct Pipeline {
    guards: Vec<Arc<dyn Guard>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a guard to the end of the pipeline.
    pub fn with(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    /// Append a guard that is shared with other pipelines.
    pub fn with_shared(mut self, guard: Arc<dyn Guard>) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn check(&self, meta: &RequestMeta) -> GuardDecision {
        for guard in &self.guards {
            let decision = guard.check(meta);
            if let GuardDecision::Deny { status, reason } = &decision {
                tracing::debug!(
                    guard = guard.name(),
                    status = status.as_u16(),
                    reason = %reason,
                    user_id = ?meta.principal.user_id(),
                    "request denied"
                );
                return decision;
            }
        }
        GuardDecision::Allow
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.guards.iter().map(|g| g.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Principal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn caller(role: Role) -> RequestMeta {
        RequestMeta::new(Principal::user("u1", role))
    }

    struct Counting(Arc<AtomicUsize>);

    impl Guard for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn check(&self, _meta: &RequestMeta) -> GuardDecision {
            self.0.fetch_add(1, Ordering::SeqCst);
            GuardDecision::Allow
        }
    }

    #[test]
    fn test_anonymous_is_unauthorized() {
        let meta = RequestMeta::default();
        let decision = RequireAuthenticated.check(&meta);
        assert!(matches!(decision, GuardDecision::Deny { status, .. } if status == StatusCode::UNAUTHORIZED));
        assert!(matches!(RequireRole(Role::Admin).check(&meta), GuardDecision::Deny { status, .. } if status == StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_role_guard() {
        assert!(RequireRole(Role::Staff).check(&caller(Role::Admin)).is_allowed());
        let decision = RequireRole(Role::Admin).check(&caller(Role::Customer));
        assert_eq!(
            decision,
            GuardDecision::Deny {
                status: StatusCode::FORBIDDEN,
                reason: "requires role admin".into(),
            }
        );
    }

    #[test]
    fn test_permission_guard() {
        assert!(RequirePermission(Permission::PlaceOrder).check(&caller(Role::Customer)).is_allowed());
        assert!(!RequirePermission(Permission::ManagePayments).check(&caller(Role::Staff)).is_allowed());
    }

    #[test]
    fn test_pipeline_stops_at_first_deny() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .with(RequireAuthenticated)
            .with(RequireRole(Role::Admin))
            .with(Counting(seen.clone()));

        assert!(!pipeline.check(&caller(Role::Customer)).is_allowed());
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        assert!(pipeline.check(&caller(Role::Admin)).is_allowed());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_pipeline_allows() {
        assert!(Pipeline::new().is_empty());
        assert!(Pipeline::new().check(&RequestMeta::default()).is_allowed());
    }
}
