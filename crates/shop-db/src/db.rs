//! Store handle and transaction entry points.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;

use crate::fault::{Fault, FaultPlan};
use crate::store::Store;
use crate::{DbError, Tx};

/// Time bounds applied to every transaction.
#[derive(Debug, Clone, Copy)]
pub struct DbConfig {
    /// How long `begin` waits for the store before giving up.
    pub lock_timeout: Duration,
    /// Maximum wall time between `begin` and `commit`.
    pub max_tx_duration: Duration,
}

impl DbConfig {
    /// Use one bound for both waiting and running.
    pub fn from_total(total: Duration) -> Self {
        Self {
            lock_timeout: total,
            max_tx_duration: total,
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            max_tx_duration: Duration::from_secs(10),
        }
    }
}

pub(crate) struct DbInner {
    pub(crate) store: Arc<AsyncMutex<Store>>,
    pub(crate) faults: Mutex<FaultPlan>,
    pub(crate) next_tx: AtomicU64,
    pub(crate) config: DbConfig,
}

/// Document store with serializable transactions.
///
/// Every read and write goes through a [`Tx`]. Only one transaction holds the
/// store at a time, so a read-then-write inside a transaction is a single
/// atomic step with respect to every other caller.
///
/// [`Db::open`] persists documents to a SQLite file; [`Db::new`] keeps them in
/// memory for tests and throwaway runs.
///
/// # Example
///
/// ```rust,ignore
/// let db = Db::open("shop.db", DbConfig::default())?;
/// let mut tx = db.begin().await?;
/// tx.insert("orders", order.id.as_str(), &order)?;
/// tx.commit()?;
/// ```
#[derive(Clone)]
pub struct Db {
    pub(crate) inner: Arc<DbInner>,
}

impl Db {
    /// Open an empty in-memory store with default time bounds.
    pub fn new() -> Self {
        Self::with_config(DbConfig::default())
    }

    /// Open an empty in-memory store with explicit time bounds.
    pub fn with_config(config: DbConfig) -> Self {
        Self::from_store(Store::memory(), config)
    }

    /// Open (or create) a SQLite-backed store at `path`.
    ///
    /// Every commit is a SQLite transaction, so committed documents survive a
    /// restart.
    pub fn open(path: impl AsRef<Path>, config: DbConfig) -> Result<Self, DbError> {
        let store = Store::open_sqlite(path.as_ref(), config.lock_timeout)?;
        Ok(Self::from_store(store, config))
    }

    fn from_store(store: Store, config: DbConfig) -> Self {
        Self {
            inner: Arc::new(DbInner {
                store: Arc::new(AsyncMutex::new(store)),
                faults: Mutex::new(FaultPlan::default()),
                next_tx: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// Get the configured time bounds.
    pub fn config(&self) -> DbConfig {
        self.inner.config
    }

    /// Begin a unit of work using the configured lock timeout.
    pub async fn begin(&self) -> Result<Tx, DbError> {
        self.begin_with_timeout(self.inner.config.lock_timeout).await
    }

    /// Begin a unit of work, waiting at most `lock_timeout` for the store.
    pub async fn begin_with_timeout(&self, lock_timeout: Duration) -> Result<Tx, DbError> {
        let mut guard = tokio::time::timeout(lock_timeout, self.inner.store.clone().lock_owned())
            .await
            .map_err(|_| DbError::Timeout(lock_timeout))?;
        guard.begin()?;

        let id = self.inner.next_tx.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(tx = id, "transaction started");

        Ok(Tx::new(
            id,
            guard,
            self.inner.clone(),
            Instant::now() + self.inner.config.max_tx_duration,
        ))
    }

    /// Arm a one-shot failure for the next matching operation.
    #[cfg(any(test, feature = "testing"))]
    pub fn inject_fault(&self, fault: Fault) {
        if let Ok(mut plan) = self.inner.faults.lock() {
            plan.arm(fault);
        }
    }

    pub(crate) fn take_fault(inner: &DbInner, fault: &Fault) -> Option<DbError> {
        inner
            .faults
            .lock()
            .ok()
            .and_then(|mut plan| plan.take(fault))
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
