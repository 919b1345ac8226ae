//! Unit price resolution.
//!
//! A line without a variant pays the product's base price less the product
//! discount percentage. A line with a variant pays the variant's own price,
//! which is already final and never discounted again.

use crate::catalog::Product;
use crate::ids::VariantId;
use crate::money::{Currency, Money};
use crate::CommerceError;

/// Computes unit prices and line totals.
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingEngine;

impl PricingEngine {
    /// Stateless; every price comes from the product document.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let pricing = PricingEngine::new();
    /// let unit = pricing.price_for(&product, Some(&VariantId::new("red-5g")))?;
    /// let line = pricing.line_total(&unit, 3)?;
    /// let subtotal = pricing.subtotal([&line].into_iter(), Currency::VND)?;
    /// ```
    pub fn new() -> Self {
        Self
    }

    /// Unit price for a product, or for one of its variants.
    pub fn price_for(
        &self,
        product: &Product,
        variant_id: Option<&VariantId>,
    ) -> Result<Money, CommerceError> {
        let price = match variant_id {
            Some(id) => {
                let variant = product.variant(id).ok_or_else(|| CommerceError::VariantNotFound {
                    product_id: product.id.to_string(),
                    variant_id: id.to_string(),
                })?;
                variant.price
            }
            None => match product.discount_percentage {
                Some(pct) if pct > 0.0 => {
                    let pct = pct.min(100.0);
                    product.price.multiply_decimal(1.0 - pct / 100.0)
                }
                _ => product.price,
            },
        };

        if price.is_negative() {
            return Err(CommerceError::Validation(format!(
                "product {} has a negative price",
                product.id
            )));
        }
        Ok(price)
    }

    /// `unit_price * quantity`.
    pub fn line_total(&self, unit_price: &Money, quantity: u32) -> Result<Money, CommerceError> {
        unit_price.checked_mul(i64::from(quantity))
    }

    /// Sum of line totals.
    pub fn subtotal<'a>(
        &self,
        line_totals: impl Iterator<Item = &'a Money>,
        currency: Currency,
    ) -> Result<Money, CommerceError> {
        Money::sum(line_totals, currency)
    }
}
