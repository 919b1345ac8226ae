//! Payment creation, status updates and refunds.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shop_db::{DbError, Tx};

use crate::ids::{OrderId, PaymentId, UserId};
use crate::money::Money;
use crate::payment::{Payment, PaymentMethod, PaymentStatus, RefundRecord};
use crate::CommerceError;

/// Payment amount and refund limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentPolicy {
    /// Smallest amount a payment may be created for, in the order currency's unit.
    pub min_amount: i64,
    /// Refunds allowed per payment.
    pub max_refund_attempts: u32,
    /// Days after payment during which refunds are accepted.
    pub refund_window_days: i64,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            min_amount: 1000,
            max_refund_attempts: 3,
            refund_window_days: 30,
        }
    }
}

/// Outcome of a status update.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub payment: Payment,
    /// Status before the update.
    pub previous: PaymentStatus,
}

impl PaymentUpdate {
    /// Whether the status actually moved.
    pub fn changed(&self) -> bool {
        self.previous != self.payment.status
    }
}

/// Creates payment intents and drives them through their status machine.
#[derive(Debug, Clone, Default)]
pub struct PaymentInitiator {
    policy: PaymentPolicy,
}

impl PaymentInitiator {
    /// Build an initiator with explicit limits.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let initiator = PaymentInitiator::new(PaymentPolicy {
    ///     min_amount: 10_000,
    ///     ..PaymentPolicy::default()
    /// });
    /// let payment = initiator.create(&mut tx, &order.id, &order.user_id, order.total, method)?;
    /// ```
    pub fn new(policy: PaymentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PaymentPolicy {
        &self.policy
    }

    /// Create the PENDING payment for an order.
    ///
    /// `amount` is the order total, passed through unchanged. Totals below
    /// [`PaymentPolicy::min_amount`] are rejected with `PaymentBelowMinimum`.
    pub fn create(
        &self,
        tx: &mut Tx,
        order_id: &OrderId,
        user_id: &UserId,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<Payment, CommerceError> {
        if amount.is_negative() {
            return Err(CommerceError::Validation("payment amount must not be negative".into()));
        }
        if amount.amount < self.policy.min_amount {
            return Err(CommerceError::PaymentBelowMinimum {
                amount: amount.amount,
                minimum: self.policy.min_amount,
            });
        }

        let now = Utc::now();
        let payment = Payment {
            id: PaymentId::generate(),
            order_id: order_id.clone(),
            user_id: user_id.clone(),
            amount,
            method,
            status: PaymentStatus::Pending,
            transaction_id: None,
            paid_at: None,
            refunded_at: None,
            refund_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        match tx.insert(Payment::COLLECTION, order_id.as_str(), &payment) {
            Ok(()) => Ok(payment),
            Err(DbError::Duplicate { .. }) => Err(CommerceError::Database(format!(
                "order {order_id} already has a payment"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Payment for an order, if any.
    pub fn find_by_order(&self, tx: &Tx, order_id: &OrderId) -> Result<Option<Payment>, CommerceError> {
        Ok(tx.get(Payment::COLLECTION, order_id.as_str())?)
    }

    /// Payment for an order, or `PaymentNotFound`.
    pub fn require_by_order(&self, tx: &Tx, order_id: &OrderId) -> Result<Payment, CommerceError> {
        self.find_by_order(tx, order_id)?
            .ok_or_else(|| CommerceError::PaymentNotFound(order_id.to_string()))
    }

    /// Move a payment to `target`.
    ///
    /// Setting the current status again is a no-op. `REFUNDED` refunds the
    /// whole remaining amount under the refund policy.
    pub fn transition(
        &self,
        tx: &mut Tx,
        order_id: &OrderId,
        target: PaymentStatus,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PaymentUpdate, CommerceError> {
        let current = self.require_by_order(tx, order_id)?;
        let previous = current.status;

        if previous == target {
            return Ok(PaymentUpdate {
                payment: current,
                previous,
            });
        }
        if target == PaymentStatus::Refunded {
            let payment = self.refund(tx, order_id, None, "full refund", now)?;
            return Ok(PaymentUpdate { payment, previous });
        }
        if target == PaymentStatus::PartiallyRefunded {
            return Err(CommerceError::Validation(
                "partial refunds need an amount; use the refund operation".into(),
            ));
        }
        previous.ensure_transition(target)?;

        let payment = tx
            .update_if(
                Payment::COLLECTION,
                order_id.as_str(),
                |p: &Payment| p.status == previous,
                |p| {
                    p.status = target;
                    if target == PaymentStatus::Completed {
                        p.paid_at = Some(now);
                    }
                    if transaction_id.is_some() {
                        p.transaction_id = transaction_id;
                    }
                    p.updated_at = now;
                },
            )
            .map_err(|e| conflict_or(e, order_id))?;

        tracing::info!(
            order_id = %order_id,
            from = %previous,
            to = %target,
            "payment status changed"
        );
        Ok(PaymentUpdate { payment, previous })
    }

    /// Refund part or all of a completed payment.
    ///
    /// `amount` of `None` refunds everything not yet refunded.
    pub fn refund(
        &self,
        tx: &mut Tx,
        order_id: &OrderId,
        amount: Option<Money>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Payment, CommerceError> {
        let current = self.require_by_order(tx, order_id)?;

        if !current.status.is_refundable() {
            return Err(CommerceError::InvalidPaymentTransition {
                from: current.status.as_str().to_string(),
                to: PaymentStatus::Refunded.as_str().to_string(),
            });
        }
        if current.refund_history.len() as u32 >= self.policy.max_refund_attempts {
            return Err(CommerceError::RefundAttemptsExceeded(self.policy.max_refund_attempts));
        }
        let paid_at = current.paid_at.unwrap_or(current.created_at);
        if now > paid_at + Duration::days(self.policy.refund_window_days) {
            return Err(CommerceError::RefundWindowExpired(self.policy.refund_window_days));
        }

        let refundable = current.refundable()?;
        let amount = amount.unwrap_or(refundable);
        if amount.amount <= 0 {
            return Err(CommerceError::Validation("refund amount must be positive".into()));
        }
        if amount.currency != refundable.currency {
            return Err(CommerceError::CurrencyMismatch {
                expected: refundable.currency.code().to_string(),
                got: amount.currency.code().to_string(),
            });
        }
        if amount.amount > refundable.amount {
            return Err(CommerceError::RefundExceedsAmount {
                requested: amount.amount,
                refundable: refundable.amount,
            });
        }

        let full = amount.amount == refundable.amount;
        let target = if full {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        current.status.ensure_transition(target)?;

        let previous = current.status;
        let history_len = current.refund_history.len();
        let reason = reason.to_string();
        let payment = tx
            .update_if(
                Payment::COLLECTION,
                order_id.as_str(),
                |p: &Payment| p.status == previous && p.refund_history.len() == history_len,
                |p| {
                    p.refund_history.push(RefundRecord {
                        amount,
                        reason,
                        processed_at: now,
                    });
                    p.status = target;
                    if full {
                        p.refunded_at = Some(now);
                    }
                    p.updated_at = now;
                },
            )
            .map_err(|e| conflict_or(e, order_id))?;

        tracing::info!(
            order_id = %order_id,
            amount = amount.amount,
            status = %payment.status,
            "payment refunded"
        );
        Ok(payment)
    }
}

fn conflict_or(e: DbError, order_id: &OrderId) -> CommerceError {
    match e {
        DbError::ConditionFailed { .. } => CommerceError::ConcurrentModification(format!("payment for order {order_id}")),
        DbError::NotFound { .. } => CommerceError::PaymentNotFound(order_id.to_string()),
        other => other.into(),
    }
}
