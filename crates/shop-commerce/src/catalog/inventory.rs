//! Read-only stock availability.
//!
//! Stock is decremented by a separate inventory subsystem. Order placement
//! only reads it, through the same unit of work that writes the order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shop_db::Tx;

use crate::catalog::{Product, StockEntry};
use crate::ids::{BranchId, VariantId};
use crate::CommerceError;

/// Which stock locations count toward availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StockScope {
    /// Sum across every branch.
    #[default]
    AllLocations,
    /// Only the branch fulfilling the order, for variant lines.
    OrderBranch,
}

/// Units one order asks of a single product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductDemand {
    /// Lines without a variant.
    pub any: u32,
    /// Lines per variant.
    pub variants: BTreeMap<VariantId, u32>,
}

impl ProductDemand {
    pub fn add(&mut self, variant_id: Option<&VariantId>, quantity: u32) {
        let slot = match variant_id {
            Some(v) => self.variants.entry(v.clone()).or_insert(0),
            None => &mut self.any,
        };
        *slot = slot.saturating_add(quantity);
    }

    pub fn total(&self) -> u32 {
        self.variants
            .values()
            .fold(self.any, |acc, q| acc.saturating_add(*q))
    }
}

/// Answers "is quantity X available for product/variant Y".
pub trait InventoryLedger: Send + Sync {
    /// Units available for a product, optionally narrowed to a variant and a branch.
    fn available(
        &self,
        tx: &Tx,
        product: &Product,
        variant_id: Option<&VariantId>,
        branch_id: Option<&BranchId>,
    ) -> Result<u32, CommerceError>;

    /// Fail with `InsufficientStock` unless the whole demand on `product` can
    /// be served at once. Variant lines count only `variant_branch` stock when
    /// one is given.
    fn check_demand(
        &self,
        tx: &Tx,
        product: &Product,
        demand: &ProductDemand,
        variant_branch: Option<&BranchId>,
    ) -> Result<(), CommerceError>;

    /// Fail with `InsufficientStock` unless `quantity` units are available.
    fn check_available(
        &self,
        tx: &Tx,
        product: &Product,
        variant_id: Option<&VariantId>,
        branch_id: Option<&BranchId>,
        quantity: u32,
    ) -> Result<(), CommerceError> {
        let mut demand = ProductDemand::default();
        demand.add(variant_id, quantity);
        self.check_demand(tx, product, &demand, branch_id)
    }
}

/// Ledger over the stock entries embedded in product documents.
///
/// A product's entries form separate buckets: one per variant that has its
/// own entries, and one product-level bucket shared by every variant that
/// has none. Lines without a variant may draw on any bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductStockLedger;

impl ProductStockLedger {
    fn tracks_own_stock(product: &Product, variant_id: &VariantId) -> bool {
        product
            .inventory
            .iter()
            .any(|e| e.variant_id.as_ref() == Some(variant_id))
    }

    fn bucket(product: &Product, variant_id: Option<&VariantId>, branch_id: Option<&BranchId>) -> u32 {
        sum(product
            .inventory
            .iter()
            .filter(|e| branch_id.map_or(true, |b| &e.branch_id == b))
            .filter(|e| e.variant_id.as_ref() == variant_id))
    }
}

impl InventoryLedger for ProductStockLedger {
    fn available(
        &self,
        _tx: &Tx,
        product: &Product,
        variant_id: Option<&VariantId>,
        branch_id: Option<&BranchId>,
    ) -> Result<u32, CommerceError> {
        let total = match variant_id {
            Some(v) if Self::tracks_own_stock(product, v) => Self::bucket(product, Some(v), branch_id),
            Some(_) => Self::bucket(product, None, branch_id),
            None => sum(product
                .inventory
                .iter()
                .filter(|e| branch_id.map_or(true, |b| &e.branch_id == b))),
        };
        Ok(total)
    }

    fn check_demand(
        &self,
        tx: &Tx,
        product: &Product,
        demand: &ProductDemand,
        variant_branch: Option<&BranchId>,
    ) -> Result<(), CommerceError> {
        let insufficient = |variant_id: Option<&VariantId>, requested: u32, available: u32| {
            CommerceError::InsufficientStock {
                product_id: product.id.to_string(),
                variant_id: variant_id.map(|v| v.to_string()),
                requested,
                available,
            }
        };

        // Variants without entries of their own share product-level stock.
        let mut shared = 0u32;
        let mut shared_variants = Vec::new();
        for (variant_id, &quantity) in &demand.variants {
            if Self::tracks_own_stock(product, variant_id) {
                let available = Self::bucket(product, Some(variant_id), variant_branch);
                if available < quantity {
                    return Err(insufficient(Some(variant_id), quantity, available));
                }
            } else {
                shared = shared.saturating_add(quantity);
                shared_variants.push(variant_id);
            }
        }
        if !shared_variants.is_empty() {
            let available = Self::bucket(product, None, variant_branch);
            if available < shared {
                let named = match shared_variants.as_slice() {
                    [only] => Some(*only),
                    _ => None,
                };
                return Err(insufficient(named, shared, available));
            }
        }

        // Remaining units go to lines without a variant, from any bucket.
        let requested = demand.total();
        let available = self.available(tx, product, None, None)?;
        if available < requested {
            return Err(insufficient(None, requested, available));
        }
        Ok(())
    }
}

fn sum<'a>(entries: impl Iterator<Item = &'a StockEntry>) -> u32 {
    entries.fold(0u32, |acc, e| acc.saturating_add(e.quantity))
}
