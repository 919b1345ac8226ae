//! Caller identity.

use std::fmt;
use std::str::FromStr;

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use shop_commerce::ids::UserId;

use crate::AuthError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";
/// Header carrying an API key, used as the rate limit key when present.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Caller role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Customer,
    /// Store staff; may move orders through fulfillment.
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    /// Get permission level (higher = more permissions).
    pub fn level(&self) -> u8 {
        match self {
            Role::Customer => 0,
            Role::Staff => 1,
            Role::Admin => 2,
        }
    }

    /// Check if this role is at least `required`.
    pub fn at_least(&self, required: Role) -> bool {
        self.level() >= required.level()
    }

    pub fn grants(&self, permission: Permission) -> bool {
        use Permission::*;
        match self {
            Role::Customer => matches!(permission, PlaceOrder | ViewOwnOrders),
            Role::Staff => !matches!(permission, ManagePayments),
            Role::Admin => true,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" | "user" => Ok(Role::Customer),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            other => Err(AuthError::UnknownRole(other.to_string())),
        }
    }
}

/// Something a route may require of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    PlaceOrder,
    ViewOwnOrders,
    ViewAllOrders,
    UpdateOrderStatus,
    ManagePayments,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::PlaceOrder => "place_order",
            Permission::ViewOwnOrders => "view_own_orders",
            Permission::ViewAllOrders => "view_all_orders",
            Permission::UpdateOrderStatus => "update_order_status",
            Permission::ManagePayments => "manage_payments",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Principal {
    #[default]
    Anonymous,
    Authenticated { id: UserId, role: Role },
}

impl Principal {
    pub fn user(id: impl Into<UserId>, role: Role) -> Self {
        Principal::Authenticated { id: id.into(), role }
    }

    /// Read identity from the trusted headers.
    ///
    /// A missing user id is anonymous; a missing role defaults to customer.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthError> {
        let Some(id) = header(headers, USER_ID_HEADER) else {
            return Ok(Principal::Anonymous);
        };
        let role = match header(headers, USER_ROLE_HEADER) {
            Some(raw) => raw.parse()?,
            None => Role::default(),
        };
        Ok(Principal::Authenticated {
            id: UserId::new(id),
            role,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::Authenticated { .. })
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Principal::Authenticated { id, .. } => Some(id),
            Principal::Anonymous => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Principal::Authenticated { role, .. } => Some(*role),
            Principal::Anonymous => None,
        }
    }

    /// Staff and admins see every order.
    pub fn sees_all_orders(&self) -> bool {
        self.can(Permission::ViewAllOrders)
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.role().is_some_and(|r| r.grants(permission))
    }
}

/// What guards get to look at.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub principal: Principal,
    pub api_key: Option<String>,
}

impl RequestMeta {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthError> {
        Ok(Self {
            principal: Principal::from_headers(headers)?,
            api_key: header(headers, API_KEY_HEADER).map(str::to_string),
        })
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
