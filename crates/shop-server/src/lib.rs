//! HTTP surface for the shop order service.
//!
//! Routes map onto [`OrderOrchestrator`] operations. Every route runs a guard
//! [`Pipeline`](shop_auth::Pipeline) before its handler, and domain errors
//! become `{"error": {"code", "message"}}` bodies.

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use shop_commerce::checkout::OrderOrchestrator;
use shop_db::Db;

pub use config::ServerConfig;
pub use routes::AppState;

/// Build the application router over `db`.
pub fn app(db: Db, config: &ServerConfig) -> Router {
    let orders = OrderOrchestrator::new(db)
        .with_config(config.orders.to_order_config())
        .with_payment_policy(config.payments);
    routes::router(AppState::new(Arc::new(orders), &config.rate_limit))
}
