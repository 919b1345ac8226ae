//! Product catalog module.
//!
//! Read-only access to products, variants, branch stock and branches.

mod branch;
mod inventory;
mod product;

pub use branch::Branch;
pub use inventory::{InventoryLedger, ProductDemand, ProductStockLedger, StockScope};
pub use product::{Product, ProductStatus, ProductVariant, StockEntry, VariantOption};
