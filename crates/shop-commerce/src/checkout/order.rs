//! Order types and the order status machine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkout::ShippingInfo;
use crate::ids::{BranchId, OrderId, ProductId, UserId, VariantId, VoucherId};
use crate::money::Money;
use crate::payment::{PaymentMethod, PaymentStatus};
use crate::CommerceError;

/// Order status.
///
/// ```text
/// PENDING        -> CONFIRMED | PROCESSING | CANCELLED | PAYMENT_FAILED
/// CONFIRMED      -> PROCESSING
/// PROCESSING     -> SHIPPED | CANCELLED
/// SHIPPED        -> DELIVERED | COMPLETED
/// DELIVERED      -> COMPLETED | RETURNED
/// PAYMENT_FAILED -> CANCELLED
/// ```
///
/// COMPLETED, CANCELLED and RETURNED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order placed, awaiting payment or review.
    #[default]
    Pending,
    /// Payment received or order verified.
    Confirmed,
    /// Order being prepared.
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Received by the customer.
    Delivered,
    /// Closed successfully.
    Completed,
    /// Cancelled before shipping.
    Cancelled,
    /// Sent back after delivery.
    Returned,
    /// Payment did not go through.
    PaymentFailed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
        OrderStatus::PaymentFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
        }
    }

    /// Check if order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Returned
        )
    }

    /// Check if order can be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Statuses reachable in one step.
    pub fn next_states(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Processing, Cancelled, PaymentFailed],
            Confirmed => &[Processing],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered, Completed],
            Delivered => &[Completed, Returned],
            PaymentFailed => &[Cancelled],
            Completed | Cancelled | Returned => &[],
        }
    }

    /// Check if transition to another status is valid.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.next_states().contains(&target)
    }

    /// Validate a transition, returning the conflict error on failure.
    pub fn ensure_transition(&self, target: OrderStatus) -> Result<(), CommerceError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(CommerceError::InvalidStatusTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One product entry on an order, with its price snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    /// Product name at time of order.
    pub product_name: String,
    /// SKU at time of order (variant SKU if a variant was chosen).
    pub sku: String,
    #[serde(default)]
    pub selected_options: BTreeMap<String, String>,
    pub quantity: u32,
    /// Unit price at time of order. Never recomputed.
    pub unit_price: Money,
    pub line_total: Money,
}

/// Voucher applied at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppliedVoucher {
    pub voucher_id: VoucherId,
    pub code: String,
    pub discount: Money,
}

/// Extra input some transitions require.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionDetail {
    /// Cancel or return reason.
    pub reason: Option<String>,
    /// Return evidence.
    pub images: Vec<String>,
}

impl TransitionDetail {
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            images: Vec::new(),
        }
    }

    fn required_reason(&self, what: &str) -> Result<String, CommerceError> {
        match self.reason.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => Ok(r.to_string()),
            _ => Err(CommerceError::Validation(format!("{what} reason is required"))),
        }
    }
}

/// A placed order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: OrderId,
    /// Owner. Never changes.
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    #[serde(default)]
    pub voucher: Option<AppliedVoucher>,
    pub subtotal: Money,
    pub discount: Money,
    /// `subtotal - discount`.
    pub total: Money,
    pub shipping_info: ShippingInfo,
    pub branch_id: BranchId,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    /// Mirror of the payment's status.
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    #[serde(default)]
    pub return_reason: Option<String>,
    #[serde(default)]
    pub return_images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub return_requested_at: Option<DateTime<Utc>>,
}

impl Order {
    pub const COLLECTION: &'static str = "orders";

    /// Check whether `user` owns this order.
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.user_id == user
    }

    /// Move to `target`, enforcing the transition table and its guards.
    ///
    /// PAYMENT_FAILED is never a valid target here; only a failed payment
    /// moves an order there, through [`Order::apply_payment_status`].
    pub fn transition(
        &mut self,
        target: OrderStatus,
        detail: &TransitionDetail,
        now: DateTime<Utc>,
    ) -> Result<(), CommerceError> {
        self.status.ensure_transition(target)?;

        match target {
            OrderStatus::PaymentFailed => {
                return Err(CommerceError::InvalidStatusTransition {
                    from: self.status.as_str().to_string(),
                    to: target.as_str().to_string(),
                });
            }
            OrderStatus::Cancelled => {
                self.cancel_reason = Some(detail.required_reason("cancel")?);
                self.cancelled_at = Some(now);
            }
            OrderStatus::Completed => {
                if self.payment_status != PaymentStatus::Completed {
                    return Err(CommerceError::PaymentNotCompleted(self.id.to_string()));
                }
            }
            OrderStatus::Returned => {
                self.return_reason = Some(detail.required_reason("return")?);
                self.return_images = detail.images.clone();
                self.return_requested_at = Some(now);
            }
            _ => {}
        }

        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    /// Mirror a payment status change, cascading to the order status.
    ///
    /// Returns the new order status if it changed.
    pub fn apply_payment_status(&mut self, payment: PaymentStatus, now: DateTime<Utc>) -> Option<OrderStatus> {
        self.payment_status = payment;
        self.updated_at = now;

        let cascade = match (payment, self.status) {
            (PaymentStatus::Completed, OrderStatus::Pending) => Some(OrderStatus::Confirmed),
            (PaymentStatus::Failed, OrderStatus::Pending) => Some(OrderStatus::PaymentFailed),
            _ => None,
        };
        if let Some(next) = cascade {
            self.status = next;
        }
        cascade
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        let total = Money::new(200_000, Currency::VND);
        Order {
            id: OrderId::new("o-1"),
            user_id: UserId::new("u-1"),
            lines: Vec::new(),
            voucher: None,
            subtotal: total,
            discount: Money::zero(Currency::VND),
            total,
            shipping_info: ShippingInfo::new("12 Le Loi", "0901234567"),
            branch_id: BranchId::new("b-1"),
            payment_method: PaymentMethod::Cash,
            status,
            payment_status: PaymentStatus::Pending,
            cancel_reason: None,
            return_reason: None,
            return_images: Vec::new(),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            return_requested_at: None,
        }
    }

    #[test]
    fn test_payment_failed_only_via_payment() {
        let mut o = order(OrderStatus::Pending);
        let err = o
            .transition(OrderStatus::PaymentFailed, &TransitionDetail::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CommerceError::InvalidStatusTransition { .. }));
        assert_eq!(o.status, OrderStatus::Pending);

        assert_eq!(
            o.apply_payment_status(PaymentStatus::Failed, Utc::now()),
            Some(OrderStatus::PaymentFailed)
        );
    }

    #[test]
    fn test_order_status_can_cancel() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Confirmed.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
    }

    #[test]
    fn test_cancel_is_consistent_with_table() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.can_cancel(),
                status.can_transition_to(OrderStatus::Cancelled) && status != OrderStatus::PaymentFailed,
                "{status}"
            );
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in OrderStatus::ALL.iter().filter(|s| s.is_terminal()) {
            assert!(status.next_states().is_empty());
        }
    }

    #[test]
    fn test_cancel_requires_reason_and_sets_timestamp() {
        let mut o = order(OrderStatus::Pending);
        let err = o
            .transition(OrderStatus::Cancelled, &TransitionDetail::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));
        assert_eq!(o.status, OrderStatus::Pending);

        o.transition(OrderStatus::Cancelled, &TransitionDetail::reason("changed mind"), Utc::now())
            .unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert_eq!(o.cancel_reason.as_deref(), Some("changed mind"));
        assert!(o.cancelled_at.is_some());
    }

    #[test]
    fn test_cancel_from_shipped_is_rejected() {
        let mut o = order(OrderStatus::Shipped);
        let err = o
            .transition(OrderStatus::Cancelled, &TransitionDetail::reason("late"), Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            CommerceError::InvalidStatusTransition {
                from: "SHIPPED".into(),
                to: "CANCELLED".into()
            }
        );
    }

    #[test]
    fn test_complete_requires_payment() {
        let mut o = order(OrderStatus::Delivered);
        let err = o
            .transition(OrderStatus::Completed, &TransitionDetail::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CommerceError::PaymentNotCompleted(_)));

        o.payment_status = PaymentStatus::Completed;
        o.transition(OrderStatus::Completed, &TransitionDetail::default(), Utc::now())
            .unwrap();
        assert_eq!(o.status, OrderStatus::Completed);
    }

    #[test]
    fn test_return_records_reason_and_images() {
        let mut o = order(OrderStatus::Delivered);
        let detail = TransitionDetail {
            reason: Some("wrong shade".into()),
            images: vec!["https://img/1.jpg".into()],
        };
        o.transition(OrderStatus::Returned, &detail, Utc::now()).unwrap();
        assert_eq!(o.status, OrderStatus::Returned);
        assert_eq!(o.return_images.len(), 1);
        assert!(o.return_requested_at.is_some());
    }

    #[test]
    fn test_payment_cascade() {
        let mut o = order(OrderStatus::Pending);
        assert_eq!(
            o.apply_payment_status(PaymentStatus::Completed, Utc::now()),
            Some(OrderStatus::Confirmed)
        );
        assert_eq!(o.payment_status, PaymentStatus::Completed);

        let mut o = order(OrderStatus::Pending);
        assert_eq!(
            o.apply_payment_status(PaymentStatus::Failed, Utc::now()),
            Some(OrderStatus::PaymentFailed)
        );

        let mut o = order(OrderStatus::Shipped);
        assert_eq!(o.apply_payment_status(PaymentStatus::Completed, Utc::now()), None);
        assert_eq!(o.status, OrderStatus::Shipped);
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&OrderStatus::PaymentFailed).unwrap();
        assert_eq!(json, "\"PAYMENT_FAILED\"");
    }
}
