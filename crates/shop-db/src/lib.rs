//! Transactional document store for the order placement services.
//!
//! Provides an explicit unit-of-work API: every repository call takes a
//! [`Tx`] handle, and a set of writes either commits together or not at all.
//! Documents are stored as JSON, one row per document in a SQLite file, and
//! deserialized on read. An in-memory backend serves tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use shop_db::Db;
//!
//! let db = Db::open("shop.db", DbConfig::default())?;
//!
//! let mut tx = db.begin().await?;
//! tx.insert("orders", order.id.as_str(), &order)?;
//! tx.insert("payments", payment.id.as_str(), &payment)?;
//! tx.commit()?; // both documents, or neither
//!
//! // Conditional update keyed on the current state
//! let mut tx = db.begin().await?;
//! tx.update_if("vouchers", id, |v: &Voucher| v.used_count < v.usage_limit, |v| {
//!     v.used_count += 1;
//! })?;
//! tx.commit()?;
//! ```

mod db;
mod error;
mod fault;
mod store;
mod tx;

pub use db::{Db, DbConfig};
pub use error::DbError;
pub use fault::{Fault, FaultOp};
pub use tx::Tx;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{Db, DbConfig, DbError, Tx};
}
