//! Order placement and fulfillment for the shop backend.
//!
//! - **Catalog**: products, variants, branch stock, read-only availability
//! - **Pricing**: unit prices from base price, product discount or variant
//! - **Voucher**: eligibility checks, discount computation, redemption
//! - **Payment**: payment intents, status machine, refunds
//! - **Checkout**: the order model, its status machine and the orchestrator
//! - **Outbox**: events written in the same unit of work as their cause
//!
//! # Example
//!
//! ```rust,ignore
//! use shop_commerce::prelude::*;
//!
//! let orchestrator = OrderOrchestrator::new(db.clone());
//!
//! let request = CreateOrderRequest {
//!     products: vec![OrderItemRequest::new("P1", 2)],
//!     voucher_id: None,
//!     voucher_code: Some("SAVE10".into()),
//!     shipping_info: ShippingInfo::new("12 Le Loi, District 1", "0901234567"),
//!     branch_id: BranchId::new("hcm-01"),
//!     payment_method: PaymentMethod::BankTransfer,
//! };
//!
//! let placed = orchestrator.create_order(&user_id, request, Some("req-42")).await?;
//! println!("Total: {}", placed.order.total);
//!
//! // Later, from the payment gateway callback
//! orchestrator
//!     .update_payment_status(&placed.order.id, PaymentStatus::Completed, Some(txn_id))
//!     .await?;
//! ```

pub mod error;
pub mod ids;
pub mod money;

pub mod catalog;
pub mod checkout;
pub mod outbox;
pub mod payment;
pub mod pricing;
pub mod retry;
pub mod voucher;

pub use error::{CommerceError, ErrorKind};
pub use ids::*;
pub use money::{Currency, Money};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{CommerceError, ErrorKind};
    pub use crate::ids::*;
    pub use crate::money::{Currency, Money};

    // Catalog
    pub use crate::catalog::{
        Branch, InventoryLedger, Product, ProductDemand, ProductStatus, ProductStockLedger, ProductVariant,
        StockEntry, StockScope, VariantOption,
    };

    // Pricing and vouchers
    pub use crate::pricing::PricingEngine;
    pub use crate::voucher::{DiscountValue, ScopedLine, Voucher, VoucherQuote, VoucherSelector, VoucherValidator};

    // Payment
    pub use crate::payment::{Payment, PaymentInitiator, PaymentMethod, PaymentPolicy, PaymentStatus};

    // Checkout
    pub use crate::checkout::{
        Actor, CartStore, CreateOrderRequest, Order, OrderConfig, OrderItemRequest, OrderLine,
        OrderOrchestrator, OrderPage, OrderPlacement, OrderQuery, OrderStatus, PaymentOutcome, ShippingInfo,
        TransitionDetail,
    };

    pub use crate::outbox::{EventPublisher, LogPublisher, Outbox, OutboxEvent, OutboxRelay};
    pub use crate::retry::{BackoffStrategy, RetryPolicy};
}
