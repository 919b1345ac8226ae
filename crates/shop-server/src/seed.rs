//! Catalog fixtures loaded at startup.
//!
//! Catalog and voucher management live outside this service; a seed file
//! lets a standalone server answer order requests.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shop_commerce::prelude::*;
use shop_db::{Db, Tx};

/// Documents to load at startup. Ones already in the store are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub branches: Vec<Branch>,
    pub products: Vec<Product>,
    pub vouchers: Vec<Voucher>,
}

impl SeedData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse seed file: {}", path.display()))
    }

    /// Insert every missing document in one unit of work.
    ///
    /// Stored documents win, so a restart keeps stock levels and voucher
    /// usage instead of resetting them. Returns how many were inserted.
    pub async fn apply(&self, db: &Db) -> Result<usize> {
        let mut tx = db.begin().await.context("Failed to open seed transaction")?;
        let mut inserted = 0;
        for branch in &self.branches {
            inserted += insert_missing(&mut tx, Branch::COLLECTION, branch.id.as_str(), branch)?;
        }
        for product in &self.products {
            inserted += insert_missing(&mut tx, Product::COLLECTION, product.id.as_str(), product)?;
        }
        for voucher in &self.vouchers {
            inserted += insert_missing(&mut tx, Voucher::COLLECTION, voucher.id.as_str(), voucher)?;
        }
        tx.commit().context("Failed to commit seed data")?;

        tracing::info!(
            branches = self.branches.len(),
            products = self.products.len(),
            vouchers = self.vouchers.len(),
            inserted,
            "catalog seeded"
        );
        Ok(inserted)
    }
}

fn insert_missing<T: Serialize>(tx: &mut Tx, collection: &str, id: &str, doc: &T) -> Result<usize> {
    if tx.exists(collection, id)? {
        return Ok(0);
    }
    tx.insert(collection, id, doc)?;
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed() -> SeedData {
        serde_json::from_value(json!({
            "branches": [{ "id": "hcm-01", "name": "District 1" }],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_apply_keeps_existing_documents() {
        let db = Db::new();
        assert_eq!(seed().apply(&db).await.unwrap(), 1);

        let mut tx = db.begin().await.unwrap();
        let mut branch: Branch = tx.get(Branch::COLLECTION, "hcm-01").unwrap().unwrap();
        branch.name = "Renamed".into();
        tx.put(Branch::COLLECTION, "hcm-01", &branch).unwrap();
        tx.commit().unwrap();

        assert_eq!(seed().apply(&db).await.unwrap(), 0);
        let tx = db.begin().await.unwrap();
        let branch: Branch = tx.get(Branch::COLLECTION, "hcm-01").unwrap().unwrap();
        assert_eq!(branch.name, "Renamed");
    }
}
