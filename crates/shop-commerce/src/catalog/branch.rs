//! Fulfillment branches.

use serde::{Deserialize, Serialize};
use shop_db::Tx;

use crate::ids::BranchId;
use crate::CommerceError;

/// A store location that fulfills orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Branch {
    pub const COLLECTION: &'static str = "branches";

    pub fn new(id: impl Into<BranchId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: None,
            active: true,
        }
    }

    /// Load a branch that can take orders.
    pub fn require_active(tx: &Tx, id: &BranchId) -> Result<Branch, CommerceError> {
        match tx.get::<Branch>(Self::COLLECTION, id.as_str())? {
            Some(branch) if branch.active => Ok(branch),
            _ => Err(CommerceError::BranchNotFound(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shop_db::Db;

    #[tokio::test]
    async fn test_inactive_branch_is_not_found() {
        let db = Db::new();
        let mut tx = db.begin().await.unwrap();
        let mut closed = Branch::new("b-closed", "Old Town");
        closed.active = false;
        tx.insert(Branch::COLLECTION, "b-closed", &closed).unwrap();
        tx.insert(Branch::COLLECTION, "b-open", &Branch::new("b-open", "Center")).unwrap();

        assert!(Branch::require_active(&tx, &BranchId::new("b-open")).is_ok());
        assert!(matches!(
            Branch::require_active(&tx, &BranchId::new("b-closed")),
            Err(CommerceError::BranchNotFound(_))
        ));
        assert!(matches!(
            Branch::require_active(&tx, &BranchId::new("missing")),
            Err(CommerceError::BranchNotFound(_))
        ));
    }
}
