//! Order routes.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use shop_auth::{
    Guard, GuardDecision, Permission, Pipeline, Principal, RateLimit, RateLimitConfig, RequestMeta,
    RequireAuthenticated, RequirePermission,
};
use shop_commerce::prelude::*;

use crate::error::ApiError;

/// Header carrying the client's idempotency key for order creation.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Guard pipelines, one per access level.
struct Guards {
    place: Pipeline,
    own: Pipeline,
    all: Pipeline,
    fulfil: Pipeline,
    payments: Pipeline,
}

impl Guards {
    fn new(rate_limit: &RateLimitConfig) -> Self {
        let limiter: Arc<dyn Guard> = Arc::new(RateLimit::from_config(rate_limit));
        let base = || {
            Pipeline::new()
                .with(RequireAuthenticated)
                .with_shared(limiter.clone())
        };
        Self {
            place: base().with(RequirePermission(Permission::PlaceOrder)),
            own: base().with(RequirePermission(Permission::ViewOwnOrders)),
            all: base().with(RequirePermission(Permission::ViewAllOrders)),
            fulfil: base().with(RequirePermission(Permission::UpdateOrderStatus)),
            payments: base().with(RequirePermission(Permission::ManagePayments)),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    orders: Arc<OrderOrchestrator>,
    guards: Arc<Guards>,
}

impl AppState {
    pub fn new(orders: Arc<OrderOrchestrator>, rate_limit: &RateLimitConfig) -> Self {
        Self {
            orders,
            guards: Arc::new(Guards::new(rate_limit)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orders", post(create_order).get(list_orders))
        .route("/admin/orders", get(list_all_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/payment", get(get_payment))
        .route("/orders/{id}/status", put(update_status))
        .route("/orders/{id}/payment-status", put(update_payment_status))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/orders/{id}/return", post(request_return))
        .route("/orders/{id}/refund", post(refund_payment))
        .with_state(state)
}

fn admit(pipeline: &Pipeline, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let meta = RequestMeta::from_headers(headers)?;
    match pipeline.check(&meta) {
        GuardDecision::Allow => Ok(meta.principal),
        GuardDecision::Deny { status, reason } => Err(ApiError::Denied { status, reason }),
    }
}

fn caller(principal: &Principal) -> Result<UserId, ApiError> {
    principal
        .user_id()
        .cloned()
        .ok_or_else(|| shop_auth::AuthError::Unauthenticated.into())
}

fn actor(principal: &Principal) -> Result<Actor, ApiError> {
    if principal.sees_all_orders() {
        Ok(Actor::Admin)
    } else {
        caller(principal).map(Actor::Customer)
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

async fn health() -> &'static str {
    "ok"
}

async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderPlacement>), ApiError> {
    let principal = admit(&state.guards.place, &headers)?;
    let user = caller(&principal)?;
    let request = body(payload)?;
    let key = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| ApiError::BadRequest("Idempotency-Key must be visible ASCII".into()))?,
        ),
        None => None,
    };

    let placement = state.orders.create_order(&user, request, key).await?;
    let status = if placement.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(placement)))
}

async fn list_orders(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<Order>>, ApiError> {
    let principal = admit(&state.guards.own, &headers)?;
    let user = caller(&principal)?;
    Ok(Json(state.orders.orders_for_user(&user).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<OrderStatus>,
    branch_id: Option<String>,
}

async fn list_all_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<OrderPage>, ApiError> {
    admit(&state.guards.all, &headers)?;
    let Query(params) = params.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let defaults = OrderQuery::default();
    let query = OrderQuery {
        page: params.page.unwrap_or(defaults.page),
        limit: params.limit.unwrap_or(defaults.limit),
        status: params.status,
        branch_id: params.branch_id.map(BranchId::new),
    };
    Ok(Json(state.orders.list_orders(&query).await?))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Order>, ApiError> {
    let principal = admit(&state.guards.own, &headers)?;
    let order = state.orders.get_order(&OrderId::new(id), &actor(&principal)?).await?;
    Ok(Json(order))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Payment>, ApiError> {
    let principal = admit(&state.guards.own, &headers)?;
    let payment = state
        .orders
        .payment_for_order(&OrderId::new(id), &actor(&principal)?)
        .await?;
    Ok(Json(payment))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdate {
    status: OrderStatus,
    #[serde(default)]
    cancel_reason: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    admit(&state.guards.fulfil, &headers)?;
    let update = body(payload)?;
    let detail = TransitionDetail {
        reason: update.cancel_reason.or(update.reason),
        images: update.images,
    };
    let order = state
        .orders
        .update_status(&OrderId::new(id), update.status, detail)
        .await?;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentStatusUpdate {
    payment_status: PaymentStatus,
    #[serde(default)]
    transaction_id: Option<String>,
}

async fn update_payment_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<PaymentStatusUpdate>, JsonRejection>,
) -> Result<Json<PaymentOutcome>, ApiError> {
    admit(&state.guards.payments, &headers)?;
    let update = body(payload)?;
    let outcome = state
        .orders
        .update_payment_status(&OrderId::new(id), update.payment_status, update.transaction_id)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CancelRequest {
    cancel_reason: String,
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let principal = admit(&state.guards.own, &headers)?;
    let user = caller(&principal)?;
    let request = body(payload)?;
    let order = state
        .orders
        .cancel_order(&OrderId::new(id), &user, &request.cancel_reason)
        .await
        .map_err(ApiError::customer_transition)?;
    Ok(Json(order))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReturnRequest {
    reason: String,
    images: Vec<String>,
}

async fn request_return(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ReturnRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let principal = admit(&state.guards.own, &headers)?;
    let user = caller(&principal)?;
    let request = body(payload)?;
    let order = state
        .orders
        .request_return(&OrderId::new(id), &user, &request.reason, request.images)
        .await
        .map_err(ApiError::customer_transition)?;
    Ok(Json(order))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RefundRequest {
    /// Omitted for a full refund of what remains.
    amount: Option<i64>,
    reason: String,
}

async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<RefundRequest>, JsonRejection>,
) -> Result<Json<PaymentOutcome>, ApiError> {
    admit(&state.guards.payments, &headers)?;
    let request = body(payload)?;
    let currency = state.orders.config().currency;
    let amount = request.amount.map(|a| Money::new(a, currency));
    let outcome = state
        .orders
        .refund_payment(&OrderId::new(id), amount, &request.reason)
        .await?;
    Ok(Json(outcome))
}
