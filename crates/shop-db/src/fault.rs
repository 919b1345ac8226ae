//! One-shot failure injection for exercising rollback paths.

use crate::DbError;

/// Store operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    Insert,
    Put,
    Update,
    Delete,
    Commit,
}

/// A failure to raise on the next matching operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub op: FaultOp,
    /// Restrict to one collection; `None` matches any.
    pub collection: Option<String>,
}

impl Fault {
    /// Fail the next operation of `op` on `collection`.
    pub fn on(op: FaultOp, collection: impl Into<String>) -> Self {
        Self {
            op,
            collection: Some(collection.into()),
        }
    }

    /// Fail the next commit.
    pub fn on_commit() -> Self {
        Self {
            op: FaultOp::Commit,
            collection: None,
        }
    }

    fn matches(&self, requested: &Fault) -> bool {
        self.op == requested.op
            && match (&self.collection, &requested.collection) {
                (None, _) => true,
                (Some(want), Some(got)) => want == got,
                (Some(_), None) => false,
            }
    }
}

/// Armed faults, each consumed by the first operation that matches it.
#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
    armed: Vec<Fault>,
}

impl FaultPlan {
    #[cfg_attr(not(any(test, feature = "testing")), allow(dead_code))]
    pub(crate) fn arm(&mut self, fault: Fault) {
        self.armed.push(fault);
    }

    pub(crate) fn take(&mut self, requested: &Fault) -> Option<DbError> {
        let idx = self.armed.iter().position(|f| f.matches(requested))?;
        let fault = self.armed.remove(idx);
        Some(DbError::Unavailable(format!(
            "injected {:?} failure{}",
            fault.op,
            requested
                .collection
                .as_deref()
                .map(|c| format!(" on {c}"))
                .unwrap_or_default()
        )))
    }
}
