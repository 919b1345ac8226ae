//! Database error types.

use std::time::Duration;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur when using the store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    /// The store could not be acquired, or the transaction outlived its deadline.
    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    /// Store unavailable (busy database file, connection loss, injected failure).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected a statement.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A document with this id already exists.
    #[error("Duplicate document {collection}/{id}")]
    Duplicate { collection: String, id: String },

    /// No document with this id.
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// A conditional update found the document in an unexpected state.
    #[error("Condition failed for {collection}/{id}")]
    ConditionFailed { collection: String, id: String },

    /// Failed to (de)serialize a document.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// Whether retrying the whole unit of work could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Timeout(_) | DbError::Unavailable(_))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                DbError::Unavailable(e.to_string())
            }
            _ => DbError::Storage(e.to_string()),
        }
    }
}
