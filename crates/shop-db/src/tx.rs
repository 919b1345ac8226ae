//! Unit-of-work handle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;

use crate::db::DbInner;
use crate::fault::{Fault, FaultOp};
use crate::store::{Journal, Store};
use crate::{Db, DbError};

/// An open transaction.
///
/// Writes are staged in a journal and become visible to other transactions
/// only on [`Tx::commit`]. Dropping a transaction without committing discards
/// every staged write.
pub struct Tx {
    id: u64,
    guard: OwnedMutexGuard<Store>,
    inner: Arc<DbInner>,
    journal: Journal,
    deadline: Instant,
    finished: bool,
}

impl Tx {
    pub(crate) fn new(
        id: u64,
        guard: OwnedMutexGuard<Store>,
        inner: Arc<DbInner>,
        deadline: Instant,
    ) -> Self {
        Self {
            id,
            guard,
            inner,
            journal: BTreeMap::new(),
            deadline,
            finished: false,
        }
    }

    /// Transaction identifier, for log correlation.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn lookup(&self, collection: &str, id: &str) -> Result<Option<Value>, DbError> {
        match self.journal.get(&(collection.to_string(), id.to_string())) {
            Some(staged) => Ok(staged.clone()),
            None => self.guard.get(collection, id),
        }
    }

    /// Documents of a collection as this transaction sees them, ordered by id.
    fn view(&self, collection: &str) -> Result<BTreeMap<String, Value>, DbError> {
        let mut docs = self.guard.scan(collection)?;

        for ((coll, id), staged) in &self.journal {
            if coll != collection {
                continue;
            }
            match staged {
                Some(doc) => {
                    docs.insert(id.clone(), doc.clone());
                }
                None => {
                    docs.remove(id);
                }
            }
        }
        Ok(docs)
    }

    fn check_fault(&self, op: FaultOp, collection: &str) -> Result<(), DbError> {
        match Db::take_fault(&self.inner, &Fault::on(op, collection)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn stage(&mut self, collection: &str, id: &str, doc: Option<Value>) {
        self.journal
            .insert((collection.to_string(), id.to_string()), doc);
    }

    /// Fetch a document by id.
    pub fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>, DbError> {
        match self.lookup(collection, id)? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Whether a document with this id exists.
    pub fn exists(&self, collection: &str, id: &str) -> Result<bool, DbError> {
        Ok(self.lookup(collection, id)?.is_some())
    }

    /// Fetch every document of a collection that satisfies `pred`.
    pub fn find<T, P>(&self, collection: &str, pred: P) -> Result<Vec<T>, DbError>
    where
        T: DeserializeOwned,
        P: Fn(&T) -> bool,
    {
        let mut out = Vec::new();
        for doc in self.view(collection)?.into_values() {
            let item: T = serde_json::from_value(doc)?;
            if pred(&item) {
                out.push(item);
            }
        }
        Ok(out)
    }

    /// Count the documents of a collection that satisfy `pred`.
    pub fn count<T, P>(&self, collection: &str, pred: P) -> Result<usize, DbError>
    where
        T: DeserializeOwned,
        P: Fn(&T) -> bool,
    {
        Ok(self.find(collection, pred)?.len())
    }

    /// Insert a new document. Fails if the id is taken.
    pub fn insert<T: Serialize>(&mut self, collection: &str, id: &str, doc: &T) -> Result<(), DbError> {
        self.check_fault(FaultOp::Insert, collection)?;
        if self.exists(collection, id)? {
            return Err(DbError::Duplicate {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        let value = serde_json::to_value(doc)?;
        self.stage(collection, id, Some(value));
        Ok(())
    }

    /// Insert or replace a document.
    pub fn put<T: Serialize>(&mut self, collection: &str, id: &str, doc: &T) -> Result<(), DbError> {
        self.check_fault(FaultOp::Put, collection)?;
        let value = serde_json::to_value(doc)?;
        self.stage(collection, id, Some(value));
        Ok(())
    }

    /// Conditional read-modify-write.
    ///
    /// Loads the document, checks `guard` against its current state and, only
    /// if it holds, applies `apply` and stages the result. Returns the updated
    /// document. The transaction holds the store exclusively, so no other
    /// writer can change the document between the check and the commit.
    pub fn update_if<T, G, F>(
        &mut self,
        collection: &str,
        id: &str,
        guard: G,
        apply: F,
    ) -> Result<T, DbError>
    where
        T: Serialize + DeserializeOwned,
        G: FnOnce(&T) -> bool,
        F: FnOnce(&mut T),
    {
        self.check_fault(FaultOp::Update, collection)?;
        let mut doc: T = self.get(collection, id)?.ok_or_else(|| DbError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        if !guard(&doc) {
            return Err(DbError::ConditionFailed {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        apply(&mut doc);
        let value = serde_json::to_value(&doc)?;
        self.stage(collection, id, Some(value));
        Ok(doc)
    }

    /// Delete a document. Returns whether it existed.
    pub fn delete(&mut self, collection: &str, id: &str) -> Result<bool, DbError> {
        self.check_fault(FaultOp::Delete, collection)?;
        let existed = self.exists(collection, id)?;
        if existed {
            self.stage(collection, id, None);
        }
        Ok(existed)
    }

    /// Atomically apply every staged write.
    pub fn commit(mut self) -> Result<(), DbError> {
        self.finished = true;
        if let Some(err) = Db::take_fault(&self.inner, &Fault::on_commit()) {
            self.guard.abort();
            return Err(err);
        }
        if Instant::now() > self.deadline {
            tracing::warn!(tx = self.id, "transaction exceeded its deadline, aborting");
            self.guard.abort();
            return Err(DbError::Timeout(self.inner.config.max_tx_duration));
        }

        let journal = std::mem::take(&mut self.journal);
        let writes = journal.len();
        self.guard.commit(journal)?;
        tracing::trace!(tx = self.id, writes, "transaction committed");
        Ok(())
    }

    /// Discard every staged write.
    pub fn rollback(mut self) {
        self.journal.clear();
        self.finished = true;
        self.guard.abort();
        tracing::trace!(tx = self.id, "transaction rolled back");
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if !self.journal.is_empty() {
            tracing::debug!(
                tx = self.id,
                writes = self.journal.len(),
                "transaction dropped without commit, discarding writes"
            );
        }
        self.guard.abort();
    }
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("id", &self.id)
            .field("staged", &self.journal.len())
            .finish_non_exhaustive()
    }
}
