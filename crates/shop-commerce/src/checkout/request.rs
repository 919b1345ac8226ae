//! Order creation input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::checkout::ShippingInfo;
use crate::ids::{BranchId, ProductId, VariantId, VoucherId};
use crate::payment::PaymentMethod;
use crate::voucher::VoucherSelector;
use crate::CommerceError;

/// Maximum quantity per order line.
pub const MAX_QUANTITY_PER_LINE: u32 = 1000;

/// One requested line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    /// Chosen options (e.g., shade, size), recorded on the line.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub quantity: u32,
}

impl OrderItemRequest {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: None,
            options: BTreeMap::new(),
            quantity,
        }
    }

    pub fn with_variant(mut self, variant_id: impl Into<VariantId>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }
}

/// Body of an order creation request. The owner comes from the caller's
/// identity, never from the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub products: Vec<OrderItemRequest>,
    #[serde(default)]
    pub voucher_id: Option<VoucherId>,
    #[serde(default)]
    pub voucher_code: Option<String>,
    pub shipping_info: ShippingInfo,
    pub branch_id: BranchId,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl CreateOrderRequest {
    /// Check shape and ranges. Runs before any store access.
    pub fn validate(&self) -> Result<(), CommerceError> {
        if self.products.is_empty() {
            return Err(CommerceError::Validation("order must contain at least one product".into()));
        }
        for (idx, item) in self.products.iter().enumerate() {
            if item.product_id.as_str().trim().is_empty() {
                return Err(CommerceError::Validation(format!("products[{idx}].productId is required")));
            }
            if item.quantity == 0 {
                return Err(CommerceError::Validation(format!(
                    "products[{idx}].quantity must be at least 1"
                )));
            }
            if item.quantity > MAX_QUANTITY_PER_LINE {
                return Err(CommerceError::QuantityExceedsLimit(item.quantity, MAX_QUANTITY_PER_LINE));
            }
        }
        if self.shipping_info.address.trim().is_empty() {
            return Err(CommerceError::Validation("shippingInfo.address is required".into()));
        }
        if self.shipping_info.contact.trim().is_empty() {
            return Err(CommerceError::Validation("shippingInfo.contact is required".into()));
        }
        if self.branch_id.as_str().trim().is_empty() {
            return Err(CommerceError::Validation("branchId is required".into()));
        }
        self.voucher_selector().map(|_| ())
    }

    /// The voucher named by the request, if any.
    pub fn voucher_selector(&self) -> Result<Option<VoucherSelector>, CommerceError> {
        match (&self.voucher_id, &self.voucher_code) {
            (Some(_), Some(_)) => Err(CommerceError::Validation(
                "give either voucherId or voucherCode, not both".into(),
            )),
            (Some(id), None) => Ok(Some(VoucherSelector::Id(id.clone()))),
            (None, Some(code)) if code.trim().is_empty() => {
                Err(CommerceError::Validation("voucherCode must not be blank".into()))
            }
            (None, Some(code)) => Ok(Some(VoucherSelector::Code(code.clone()))),
            (None, None) => Ok(None),
        }
    }
}
