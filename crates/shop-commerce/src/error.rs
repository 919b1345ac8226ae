//! Commerce error types.

use shop_db::DbError;
use thiserror::Error;

/// Broad class of a [`CommerceError`], used by callers to choose a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any side effect.
    Validation,
    /// Well-formed request that breaks a business rule.
    BusinessRule,
    /// The referenced entity does not exist.
    NotFound,
    /// The entity is in a state that does not allow the operation.
    Conflict,
    /// The caller may not act on this entity.
    Forbidden,
    /// Transient store failure; safe to retry if the operation is idempotent.
    Unavailable,
    /// Anything else.
    Internal,
}

/// Errors that can occur in order placement and fulfillment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommerceError {
    /// Invalid request input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Quantity exceeds maximum allowed.
    #[error("Quantity {0} exceeds maximum allowed ({1})")]
    QuantityExceedsLimit(u32, u32),

    /// Product not found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but is not for sale.
    #[error("Product is not available: {0}")]
    ProductUnavailable(String),

    /// Variant not found on the product.
    #[error("Variant {variant_id} not found on product {product_id}")]
    VariantNotFound {
        product_id: String,
        variant_id: String,
    },

    /// Fulfillment branch not found or inactive.
    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    /// Not enough stock to fill a line.
    #[error("Insufficient stock for {product_id}{}: requested {requested}, available {available}",
        variant_id.as_deref().map(|v| format!(" (variant {v})")).unwrap_or_default())]
    InsufficientStock {
        product_id: String,
        variant_id: Option<String>,
        requested: u32,
        available: u32,
    },

    /// Voucher not found.
    #[error("Voucher not found: {0}")]
    VoucherNotFound(String),

    /// Voucher inactive or outside its validity window.
    #[error("Voucher expired or inactive: {0}")]
    VoucherExpired(String),

    /// Order subtotal below the voucher minimum.
    #[error("Voucher {code} requires a minimum order of {minimum}, subtotal is {subtotal}")]
    MinimumOrderValueNotMet {
        code: String,
        minimum: i64,
        subtotal: i64,
    },

    /// Voucher usage limit reached.
    #[error("Voucher usage limit reached: {0}")]
    UsageLimitReached(String),

    /// The user already redeemed this voucher.
    #[error("Voucher {0} already used by this user")]
    AlreadyUsedByUser(String),

    /// Voucher is restricted to a first order.
    #[error("Voucher {0} is only valid on a first order")]
    NotFirstOrder(String),

    /// Voucher is limited to products or categories the order does not contain.
    #[error("Voucher {0} does not apply to any product in this order")]
    VoucherNotApplicable(String),

    /// Order total is below the smallest amount a payment may carry.
    #[error("Payment amount {amount} is below the minimum of {minimum}")]
    PaymentBelowMinimum { amount: i64, minimum: i64 },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Payment not found.
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// The caller does not own the order.
    #[error("Order {0} does not belong to the caller")]
    NotOrderOwner(String),

    /// Invalid order status transition.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Invalid payment status transition.
    #[error("Invalid payment transition from {from} to {to}")]
    InvalidPaymentTransition { from: String, to: String },

    /// Order cannot complete before its payment does.
    #[error("Payment for order {0} is not completed")]
    PaymentNotCompleted(String),

    /// Refund would exceed the amount paid.
    #[error("Refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsAmount { requested: i64, refundable: i64 },

    /// Refund requested after the refund window closed.
    #[error("Refund window of {0} days has expired")]
    RefundWindowExpired(i64),

    /// Too many refunds on one payment.
    #[error("Maximum of {0} refund attempts reached")]
    RefundAttemptsExceeded(u32),

    /// Another writer changed the entity between read and write.
    #[error("Concurrent modification of {0}")]
    ConcurrentModification(String),

    /// Currency mismatch.
    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: String, got: String },

    /// Arithmetic overflow.
    #[error("Arithmetic overflow in money calculation")]
    Overflow,

    /// Transient store failure.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CommerceError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        use CommerceError::*;
        match self {
            Validation(_) | QuantityExceedsLimit(..) => ErrorKind::Validation,
            ProductUnavailable(_)
            | VariantNotFound { .. }
            | InsufficientStock { .. }
            | VoucherExpired(_)
            | MinimumOrderValueNotMet { .. }
            | UsageLimitReached(_)
            | AlreadyUsedByUser(_)
            | NotFirstOrder(_)
            | VoucherNotApplicable(_)
            | PaymentBelowMinimum { .. }
            | RefundExceedsAmount { .. }
            | RefundWindowExpired(_)
            | RefundAttemptsExceeded(_)
            | CurrencyMismatch { .. }
            | Overflow => ErrorKind::BusinessRule,
            ProductNotFound(_)
            | BranchNotFound(_)
            | VoucherNotFound(_)
            | OrderNotFound(_)
            | PaymentNotFound(_) => ErrorKind::NotFound,
            InvalidStatusTransition { .. }
            | InvalidPaymentTransition { .. }
            | PaymentNotCompleted(_)
            | ConcurrentModification(_) => ErrorKind::Conflict,
            NotOrderOwner(_) => ErrorKind::Forbidden,
            Unavailable(_) => ErrorKind::Unavailable,
            Database(_) | Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Stable reason code for clients.
    pub fn code(&self) -> &'static str {
        use CommerceError::*;
        match self {
            Validation(_) => "VALIDATION_ERROR",
            QuantityExceedsLimit(..) => "QUANTITY_EXCEEDS_LIMIT",
            ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            ProductUnavailable(_) => "PRODUCT_UNAVAILABLE",
            VariantNotFound { .. } => "VARIANT_NOT_FOUND",
            BranchNotFound(_) => "BRANCH_NOT_FOUND",
            InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            VoucherNotFound(_) => "VOUCHER_NOT_FOUND",
            VoucherExpired(_) => "VOUCHER_EXPIRED",
            MinimumOrderValueNotMet { .. } => "MINIMUM_ORDER_VALUE_NOT_MET",
            UsageLimitReached(_) => "USAGE_LIMIT_REACHED",
            AlreadyUsedByUser(_) => "ALREADY_USED_BY_USER",
            NotFirstOrder(_) => "NOT_FIRST_ORDER",
            VoucherNotApplicable(_) => "VOUCHER_NOT_APPLICABLE",
            PaymentBelowMinimum { .. } => "PAYMENT_BELOW_MINIMUM",
            OrderNotFound(_) => "ORDER_NOT_FOUND",
            PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            NotOrderOwner(_) => "NOT_ORDER_OWNER",
            InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            InvalidPaymentTransition { .. } => "INVALID_PAYMENT_TRANSITION",
            PaymentNotCompleted(_) => "PAYMENT_NOT_COMPLETED",
            RefundExceedsAmount { .. } => "REFUND_EXCEEDS_AMOUNT",
            RefundWindowExpired(_) => "REFUND_WINDOW_EXPIRED",
            RefundAttemptsExceeded(_) => "REFUND_ATTEMPTS_EXCEEDED",
            ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Overflow => "AMOUNT_OVERFLOW",
            Unavailable(_) => "SERVICE_UNAVAILABLE",
            Database(_) | Serialization(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the whole operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CommerceError::Unavailable(_))
    }
}

impl From<DbError> for CommerceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Timeout(_) | DbError::Unavailable(_) => CommerceError::Unavailable(e.to_string()),
            DbError::Serialization(msg) => CommerceError::Serialization(msg),
            other => CommerceError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CommerceError {
    fn from(e: serde_json::Error) -> Self {
        CommerceError::Serialization(e.to_string())
    }
}
