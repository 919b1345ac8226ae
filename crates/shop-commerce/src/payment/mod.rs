//! Payments: one durable intent per order, advanced by gateway callbacks
//! or admin action.

mod initiator;
mod model;

pub use initiator::{PaymentInitiator, PaymentPolicy, PaymentUpdate};
pub use model::{Payment, PaymentMethod, PaymentStatus, RefundRecord};
