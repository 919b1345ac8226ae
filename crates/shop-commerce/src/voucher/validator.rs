//! Voucher validation and redemption against the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shop_db::{DbError, Tx};

use crate::checkout::Order;
use crate::ids::{UserId, VoucherId};
use crate::money::Money;
use crate::voucher::{canonical_code, ScopedLine, Voucher};
use crate::CommerceError;

/// How the caller names a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherSelector {
    Code(String),
    Id(VoucherId),
}

impl VoucherSelector {
    fn describe(&self) -> String {
        match self {
            VoucherSelector::Code(code) => canonical_code(code),
            VoucherSelector::Id(id) => id.to_string(),
        }
    }
}

/// A validated voucher and the discount it gives on one subtotal.
#[derive(Debug, Clone, PartialEq)]
pub struct VoucherQuote {
    pub voucher_id: VoucherId,
    pub code: String,
    pub discount: Money,
}

/// Validates vouchers and consumes usage slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoucherValidator;

impl VoucherValidator {
    pub fn new() -> Self {
        Self
    }

    /// Load a voucher by code or id.
    pub fn lookup(&self, tx: &Tx, selector: &VoucherSelector) -> Result<Voucher, CommerceError> {
        let found = match selector {
            VoucherSelector::Id(id) => tx.get::<Voucher>(Voucher::COLLECTION, id.as_str())?,
            VoucherSelector::Code(code) => {
                let code = canonical_code(code);
                tx.find::<Voucher, _>(Voucher::COLLECTION, |v| v.code == code)?
                    .into_iter()
                    .next()
            }
        };
        found.ok_or_else(|| CommerceError::VoucherNotFound(selector.describe()))
    }

    /// Run every eligibility check in order and price the discount.
    ///
    /// The minimum order value is checked against the whole `subtotal`, while
    /// a voucher limited to products or categories discounts only the `lines`
    /// it applies to. Nothing is written; see [`VoucherValidator::redeem`].
    pub fn validate_and_price(
        &self,
        tx: &Tx,
        selector: &VoucherSelector,
        user: &UserId,
        lines: &[ScopedLine<'_>],
        subtotal: &Money,
        now: DateTime<Utc>,
    ) -> Result<VoucherQuote, CommerceError> {
        let voucher = self.lookup(tx, selector)?;
        voucher.check(user, subtotal, now)?;

        if voucher.first_order_only {
            let previous = tx.count::<Order, _>(Order::COLLECTION, |o| &o.user_id == user)?;
            if previous > 0 {
                return Err(CommerceError::NotFirstOrder(voucher.code.clone()));
            }
        }

        let eligible = voucher.eligible_subtotal(lines, subtotal)?;
        let discount = voucher.discount_for(&eligible)?;
        tracing::debug!(code = %voucher.code, discount = discount.amount, "voucher validated");
        Ok(VoucherQuote {
            voucher_id: voucher.id,
            code: voucher.code,
            discount,
        })
    }

    /// Consume one usage slot for `user`.
    ///
    /// The limit and per-user checks are re-evaluated against the stored
    /// document in the same step that increments it.
    pub fn redeem(
        &self,
        tx: &mut Tx,
        voucher_id: &VoucherId,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Voucher, CommerceError> {
        let result = tx.update_if(
            Voucher::COLLECTION,
            voucher_id.as_str(),
            |v: &Voucher| v.is_live(now) && v.has_capacity() && v.allows_user(user),
            |v| v.record_use(user),
        );

        match result {
            Ok(voucher) => Ok(voucher),
            Err(DbError::NotFound { .. }) => Err(CommerceError::VoucherNotFound(voucher_id.to_string())),
            Err(DbError::ConditionFailed { .. }) => {
                let current: Voucher = tx
                    .get(Voucher::COLLECTION, voucher_id.as_str())?
                    .ok_or_else(|| CommerceError::VoucherNotFound(voucher_id.to_string()))?;
                Err(if !current.is_live(now) {
                    CommerceError::VoucherExpired(current.code)
                } else if !current.has_capacity() {
                    CommerceError::UsageLimitReached(current.code)
                } else {
                    CommerceError::AlreadyUsedByUser(current.code)
                })
            }
            Err(other) => Err(other.into()),
        }
    }
}
