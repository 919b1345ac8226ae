//! Payment records and the payment status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{OrderId, PaymentId, UserId};
use crate::money::Money;
use crate::CommerceError;

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    BankTransfer,
    CreditCard,
    EWallet,
}

/// Payment status.
///
/// ```text
/// PENDING -> COMPLETED | FAILED
/// COMPLETED -> PARTIALLY_REFUNDED | REFUNDED
/// PARTIALLY_REFUNDED -> PARTIALLY_REFUNDED | REFUNDED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    PartiallyRefunded,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    /// No further transitions possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }

    /// Whether money has been received and not fully returned.
    pub fn is_refundable(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::PartiallyRefunded)
    }

    /// Check if transition to another status is valid.
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Completed)
                | (Pending, Failed)
                | (Completed, PartiallyRefunded)
                | (Completed, Refunded)
                | (PartiallyRefunded, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
        )
    }

    /// Validate a transition, returning the conflict error on failure.
    pub fn ensure_transition(&self, target: PaymentStatus) -> Result<(), CommerceError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(CommerceError::InvalidPaymentTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One processed refund.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundRecord {
    pub amount: Money,
    pub reason: String,
    pub processed_at: DateTime<Utc>,
}

/// A durable payment intent for one order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    /// Equal to the order total; never changes.
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refunded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refund_history: Vec<RefundRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Payments are stored under their order's id, one per order.
    pub const COLLECTION: &'static str = "payments";

    /// Total refunded so far.
    pub fn refunded_total(&self) -> Result<Money, CommerceError> {
        Money::sum(self.refund_history.iter().map(|r| &r.amount), self.amount.currency)
    }

    /// Amount still available for refund.
    pub fn refundable(&self) -> Result<Money, CommerceError> {
        self.amount.checked_sub(&self.refunded_total()?)
    }
}
