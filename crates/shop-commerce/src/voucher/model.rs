//! Voucher types and the pure eligibility rules.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CategoryId, ProductId, UserId, VoucherId};
use crate::money::Money;
use crate::CommerceError;

/// Value of the discount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountValue {
    /// Percentage off (0.0 - 100.0).
    Percentage(f64),
    /// Fixed amount off.
    Fixed(Money),
}

impl DiscountValue {
    /// Calculate the discount for a subtotal.
    ///
    /// The result is always within `[0, subtotal]`, and a percentage discount
    /// never exceeds `max_discount`.
    pub fn calculate(&self, subtotal: &Money, max_discount: &Money) -> Result<Money, CommerceError> {
        let raw = match self {
            DiscountValue::Percentage(percent) => {
                let pct = percent.clamp(0.0, 100.0);
                subtotal.percentage(pct).min(max_discount)?
            }
            DiscountValue::Fixed(amount) => amount.min(subtotal)?,
        };

        let floor = Money::zero(subtotal.currency);
        if raw.amount < floor.amount {
            return Ok(floor);
        }
        raw.min(subtotal)
    }
}

/// A discount code that can be redeemed against orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Voucher {
    pub id: VoucherId,
    /// Upper-case code (e.g., "SAVE10").
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub value: DiscountValue,
    /// Smallest subtotal the voucher applies to.
    pub minimum_order_value: Money,
    /// Cap on a percentage discount.
    pub max_discount: Money,
    /// Products the voucher is limited to. Empty with no categories means any.
    #[serde(default)]
    pub applicable_products: BTreeSet<ProductId>,
    /// Categories the voucher is limited to.
    #[serde(default)]
    pub applicable_categories: BTreeSet<CategoryId>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub usage_limit: u32,
    #[serde(default)]
    pub used_count: u32,
    #[serde(default)]
    pub used_by_users: BTreeSet<UserId>,
    /// Each user may redeem at most once.
    #[serde(default = "default_true")]
    pub single_use_per_user: bool,
    #[serde(default)]
    pub first_order_only: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Voucher {
    pub const COLLECTION: &'static str = "vouchers";

    /// Create an active voucher valid between `start_date` and `end_date`.
    pub fn new(
        code: &str,
        value: DiscountValue,
        minimum_order_value: Money,
        max_discount: Money,
        usage_limit: u32,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: VoucherId::generate(),
            code: canonical_code(code),
            description: None,
            value,
            minimum_order_value,
            max_discount,
            applicable_products: BTreeSet::new(),
            applicable_categories: BTreeSet::new(),
            start_date,
            end_date,
            usage_limit,
            used_count: 0,
            used_by_users: BTreeSet::new(),
            single_use_per_user: true,
            first_order_only: false,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active and `now` within the validity window.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.start_date <= now && now <= self.end_date
    }

    /// Whether another redemption fits under the usage limit.
    pub fn has_capacity(&self) -> bool {
        self.used_count < self.usage_limit
    }

    /// Whether `user` may still redeem under the per-user rule.
    pub fn allows_user(&self, user: &UserId) -> bool {
        !self.single_use_per_user || !self.used_by_users.contains(user)
    }

    /// Whether the voucher is limited to some products or categories.
    pub fn is_scoped(&self) -> bool {
        !self.applicable_products.is_empty() || !self.applicable_categories.is_empty()
    }

    /// Whether a line for `product_id` in `category_ids` counts toward the discount.
    pub fn applies_to(&self, product_id: &ProductId, category_ids: &[CategoryId]) -> bool {
        !self.is_scoped()
            || self.applicable_products.contains(product_id)
            || category_ids.iter().any(|c| self.applicable_categories.contains(c))
    }

    /// Subtotal of the lines the voucher applies to.
    ///
    /// Fails with `VoucherNotApplicable` when a scoped voucher matches no line.
    pub fn eligible_subtotal(&self, lines: &[ScopedLine<'_>], subtotal: &Money) -> Result<Money, CommerceError> {
        if !self.is_scoped() {
            return Ok(*subtotal);
        }
        let eligible: Vec<&Money> = lines
            .iter()
            .filter(|l| self.applies_to(l.product_id, l.category_ids))
            .map(|l| l.line_total)
            .collect();
        if eligible.is_empty() {
            return Err(CommerceError::VoucherNotApplicable(self.code.clone()));
        }
        Money::sum(eligible.into_iter(), subtotal.currency)
    }

    /// Checks 2-5 of validation, in order. Existence and first-order are
    /// checked by the caller, which has store access.
    pub fn check(&self, user: &UserId, subtotal: &Money, now: DateTime<Utc>) -> Result<(), CommerceError> {
        if !self.is_live(now) {
            return Err(CommerceError::VoucherExpired(self.code.clone()));
        }
        if subtotal.amount < self.minimum_order_value.amount {
            return Err(CommerceError::MinimumOrderValueNotMet {
                code: self.code.clone(),
                minimum: self.minimum_order_value.amount,
                subtotal: subtotal.amount,
            });
        }
        if !self.has_capacity() {
            return Err(CommerceError::UsageLimitReached(self.code.clone()));
        }
        if !self.allows_user(user) {
            return Err(CommerceError::AlreadyUsedByUser(self.code.clone()));
        }
        Ok(())
    }

    /// Discount this voucher gives on `subtotal`.
    pub fn discount_for(&self, subtotal: &Money) -> Result<Money, CommerceError> {
        self.value.calculate(subtotal, &self.max_discount)
    }

    /// Consume one usage slot for `user`.
    pub fn record_use(&mut self, user: &UserId) {
        self.used_count += 1;
        self.used_by_users.insert(user.clone());
        self.updated_at = Utc::now();
    }
}

/// One priced order line, as seen by a scoped voucher.
#[derive(Debug, Clone, Copy)]
pub struct ScopedLine<'a> {
    pub product_id: &'a ProductId,
    pub category_ids: &'a [CategoryId],
    pub line_total: &'a Money,
}

/// Codes are matched case-insensitively by storing them upper-case.
pub fn canonical_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use chrono::Duration;

    fn vnd(amount: i64) -> Money {
        Money::new(amount, Currency::VND)
    }

    fn save10() -> Voucher {
        let now = Utc::now();
        Voucher::new(
            "save10",
            DiscountValue::Percentage(10.0),
            vnd(50_000),
            vnd(15_000),
            100,
            now - Duration::days(1),
            now + Duration::days(1),
        )
    }

    #[test]
    fn test_code_is_canonical() {
        assert_eq!(save10().code, "SAVE10");
        assert_eq!(canonical_code(" Save10 "), "SAVE10");
    }

    #[test]
    fn test_percentage_discount_is_capped() {
        assert_eq!(save10().discount_for(&vnd(200_000)).unwrap(), vnd(15_000));
        assert_eq!(save10().discount_for(&vnd(100_000)).unwrap(), vnd(10_000));
    }

    #[test]
    fn test_fixed_discount_never_exceeds_subtotal() {
        let value = DiscountValue::Fixed(vnd(80_000));
        let cap = vnd(10_000);
        assert_eq!(value.calculate(&vnd(50_000), &cap).unwrap(), vnd(50_000));
        assert_eq!(value.calculate(&vnd(100_000), &cap).unwrap(), vnd(80_000));
    }

    #[test]
    fn test_max_discount_is_required() {
        let mut doc = serde_json::to_value(save10()).unwrap();
        doc.as_object_mut().unwrap().remove("max_discount");
        assert!(serde_json::from_value::<Voucher>(doc).is_err());
    }

    #[test]
    fn test_scoped_voucher_prices_matching_lines() {
        let mut v = save10();
        v.applicable_products.insert(ProductId::new("P1"));
        v.applicable_categories.insert(CategoryId::new("lips"));

        let (p1, p2, p3) = (ProductId::new("P1"), ProductId::new("P2"), ProductId::new("P3"));
        let lips = [CategoryId::new("lips")];
        let (t1, t2, t3) = (vnd(100_000), vnd(40_000), vnd(60_000));
        let lines = [
            ScopedLine { product_id: &p1, category_ids: &[], line_total: &t1 },
            ScopedLine { product_id: &p2, category_ids: &lips, line_total: &t2 },
            ScopedLine { product_id: &p3, category_ids: &[], line_total: &t3 },
        ];
        assert_eq!(v.eligible_subtotal(&lines, &vnd(200_000)).unwrap(), vnd(140_000));

        let err = v.eligible_subtotal(&lines[2..], &vnd(60_000)).unwrap_err();
        assert_eq!(err, CommerceError::VoucherNotApplicable("SAVE10".into()));

        // Unscoped vouchers use the whole subtotal.
        assert_eq!(save10().eligible_subtotal(&lines[2..], &vnd(60_000)).unwrap(), vnd(60_000));
    }

    #[test]
    fn test_check_order() {
        let user = UserId::new("u1");
        let now = Utc::now();

        let mut expired = save10();
        expired.end_date = now - Duration::hours(1);
        // Expiry is reported before the minimum order value.
        assert!(matches!(
            expired.check(&user, &vnd(1), now),
            Err(CommerceError::VoucherExpired(_))
        ));

        assert!(matches!(
            save10().check(&user, &vnd(10_000), now),
            Err(CommerceError::MinimumOrderValueNotMet { .. })
        ));

        let mut full = save10();
        full.usage_limit = 1;
        full.used_count = 1;
        full.used_by_users.insert(user.clone());
        assert!(matches!(
            full.check(&user, &vnd(200_000), now),
            Err(CommerceError::UsageLimitReached(_))
        ));

        let mut used = save10();
        used.record_use(&user);
        assert!(matches!(
            used.check(&user, &vnd(200_000), now),
            Err(CommerceError::AlreadyUsedByUser(_))
        ));
        assert!(used.check(&UserId::new("u2"), &vnd(200_000), now).is_ok());
    }

    #[test]
    fn test_inactive_voucher_is_expired() {
        let mut v = save10();
        v.active = false;
        assert!(!v.is_live(Utc::now()));
    }

    #[test]
    fn test_multi_use_voucher_allows_repeat_user() {
        let user = UserId::new("u1");
        let mut v = save10();
        v.single_use_per_user = false;
        v.record_use(&user);
        assert!(v.allows_user(&user));
        assert_eq!(v.used_count, 1);
    }
}
