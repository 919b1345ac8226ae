//! Cart clearing after a successful checkout.

use async_trait::async_trait;
use shop_db::Db;

use crate::ids::UserId;
use crate::CommerceError;

/// Owner of the user's shopping cart.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Empty the user's cart.
    async fn clear(&self, user: &UserId) -> Result<(), CommerceError>;
}

/// Carts stored one document per user in the `carts` collection.
#[derive(Debug, Clone)]
pub struct StoreCartStore {
    db: Db,
}

impl StoreCartStore {
    pub const COLLECTION: &'static str = "carts";

    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CartStore for StoreCartStore {
    async fn clear(&self, user: &UserId) -> Result<(), CommerceError> {
        let mut tx = self.db.begin().await?;
        let existed = tx.delete(Self::COLLECTION, user.as_str())?;
        tx.commit()?;
        tracing::debug!(user_id = %user, existed, "cart cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clear_removes_cart() {
        let db = Db::new();
        let mut tx = db.begin().await.unwrap();
        tx.put(StoreCartStore::COLLECTION, "u-1", &serde_json::json!({"items": [1, 2]}))
            .unwrap();
        tx.commit().unwrap();

        let carts = StoreCartStore::new(db.clone());
        carts.clear(&UserId::new("u-1")).await.unwrap();
        // Clearing an absent cart is fine.
        carts.clear(&UserId::new("u-1")).await.unwrap();

        let tx = db.begin().await.unwrap();
        assert!(!tx.exists(StoreCartStore::COLLECTION, "u-1").unwrap());
    }
}
