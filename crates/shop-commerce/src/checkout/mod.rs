//! Checkout module.
//!
//! Order creation input, the order model with its status machine, and the
//! orchestrator that places orders and drives them afterward.

mod address;
mod cart;
mod orchestrator;
mod order;
mod request;

pub use address::ShippingInfo;
pub use cart::{CartStore, StoreCartStore};
pub use orchestrator::{
    Actor, OrderConfig, OrderOrchestrator, OrderPage, OrderPlacement, OrderQuery, PaymentOutcome,
    MAX_IDEMPOTENCY_KEY_LEN,
};
pub use order::{AppliedVoucher, Order, OrderLine, OrderStatus, TransitionDetail};
pub use request::{CreateOrderRequest, OrderItemRequest, MAX_QUANTITY_PER_LINE};
