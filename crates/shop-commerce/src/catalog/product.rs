//! Product and variant types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shop_db::Tx;

use crate::ids::{BranchId, CategoryId, ProductId, VariantId};
use crate::money::Money;
use crate::CommerceError;

/// Product status in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    /// Product is for sale.
    #[default]
    Active,
    /// Listed but temporarily not sellable.
    OutOfStock,
    /// No longer sold.
    Discontinued,
}

/// A product in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// Unique product identifier.
    pub id: ProductId,
    /// Stock keeping unit (unique).
    pub sku: String,
    /// Product name.
    pub name: String,
    /// Categories the product is listed under.
    #[serde(default, alias = "categoryIds")]
    pub category_ids: Vec<CategoryId>,
    /// Base price, used when no variant is selected.
    pub price: Money,
    /// Percentage taken off the base price.
    #[serde(default)]
    pub discount_percentage: Option<f64>,
    /// Product visibility status.
    #[serde(default)]
    pub status: ProductStatus,
    /// Purchasable variants.
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    /// Stock per branch.
    #[serde(default)]
    pub inventory: Vec<StockEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Collection products are stored in.
    pub const COLLECTION: &'static str = "products";

    /// Create a new active product with no variants or stock.
    pub fn new(sku: impl Into<String>, name: impl Into<String>, price: Money) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::generate(),
            sku: sku.into(),
            name: name.into(),
            category_ids: Vec::new(),
            price,
            discount_percentage: None,
            status: ProductStatus::Active,
            variants: Vec::new(),
            inventory: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if product can be ordered.
    pub fn is_available(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Find a variant by id.
    pub fn variant(&self, id: &VariantId) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| &v.id == id)
    }

    /// Record stock for a branch.
    pub fn add_stock(&mut self, entry: StockEntry) {
        self.inventory.push(entry);
    }

    /// Load a product through the unit of work.
    pub fn fetch(tx: &Tx, id: &ProductId) -> Result<Product, CommerceError> {
        tx.get(Self::COLLECTION, id.as_str())?
            .ok_or_else(|| CommerceError::ProductNotFound(id.to_string()))
    }
}

/// A specific purchasable version of a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductVariant {
    /// Unique variant identifier.
    pub id: VariantId,
    /// Stock keeping unit (unique).
    pub sku: String,
    /// Variant options (e.g., shade: Rose).
    #[serde(default)]
    pub options: Vec<VariantOption>,
    /// Final price of this variant.
    pub price: Money,
}

impl ProductVariant {
    /// Create a new variant.
    pub fn new(sku: impl Into<String>, price: Money) -> Self {
        Self {
            id: VariantId::generate(),
            sku: sku.into(),
            options: Vec::new(),
            price,
        }
    }

    /// Add an option to this variant.
    pub fn add_option(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.options.push(VariantOption::new(name, value));
    }
}

/// A variant option (e.g., color: Red).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VariantOption {
    /// Option name (e.g., "color", "shade", "size").
    pub name: String,
    /// Option value (e.g., "Red", "Rose", "30ml").
    pub value: String,
}

impl VariantOption {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Quantity on hand at one branch.
///
/// Entries without a `variant_id` hold stock for the product as a whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockEntry {
    pub branch_id: BranchId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

impl StockEntry {
    /// Product-level stock at a branch.
    pub fn new(branch_id: impl Into<BranchId>, quantity: u32) -> Self {
        Self {
            branch_id: branch_id.into(),
            variant_id: None,
            quantity,
        }
    }

    /// Variant-level stock at a branch.
    pub fn for_variant(branch_id: impl Into<BranchId>, variant_id: VariantId, quantity: u32) -> Self {
        Self {
            variant_id: Some(variant_id),
            ..Self::new(branch_id, quantity)
        }
    }

}
