//! The backend trait seam.
//!
//! Backend key/value stores — clustered and standalone alike — are
//! external collaborators: this crate only ever calls them through these
//! traits and never assumes anything about what's behind them (Raft,
//! a single-node embedded store, a test double). See
//! [`crate::memory_backend`] for a minimal concrete implementation used
//! by this crate's own tests.

use crate::error::Result;

/// The consistency level a transaction is opened with.
///
/// `EventualCommitted` is the level the migration controller depends on
/// to leave a partitioned cluster without a quorum: a transaction opened
/// this way must be able to commit (trivially, since it's read-only)
/// without contacting a majority of peers. A backend that cannot offer
/// this — one that always requires a quorum to commit, even for a
/// no-op commit of a read-only transaction — cannot be used safely as a
/// clustered target; the controller's whole reason for choosing this
/// consistency level on the way out evaporates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// The backend's normal, strongest consistency level.
    Strong,
    /// Locally-known state, committable without contacting peers.
    EventualCommitted,
}

/// An opaque key/value backend, clustered or standalone.
pub trait Backend: Send + Sync {
    /// Start the backend. Called once, from `FacadeDatabase::start()`.
    fn start(&self) -> Result<()>;

    /// Stop the backend. Called once, from `FacadeDatabase::stop()`;
    /// errors are logged by the caller, never propagated.
    fn stop(&self) -> Result<()>;

    /// Open a transaction at the backend's default (strong) consistency.
    fn create_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Open a transaction at a specific consistency level. The default
    /// implementation ignores `consistency` and opens a normal
    /// transaction — correct for a standalone backend, which has no
    /// weaker level to offer. Clustered backends must override this to
    /// honor [`Consistency::EventualCommitted`].
    fn create_transaction_with_consistency(
        &self,
        consistency: Consistency,
    ) -> Result<Box<dyn Transaction>> {
        let _ = consistency;
        self.create_transaction()
    }
}

/// A transaction against a [`Backend`].
///
/// `commit` and `rollback` take `self` by boxed value: once a
/// transaction has been committed or rolled back it cannot be reused,
/// which the ownership transfer enforces at the type level rather than
/// by a runtime "already finished" check.
pub trait Transaction: Send {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Write `value` under `key`, overwriting any existing value.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`, if present.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Every key/value pair currently visible to this transaction.
    /// Merge strategies use this to copy data between backends.
    fn scan(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Remove every key. Used by [`crate::merge::OverwriteMerge`] to
    /// clear the destination before copying.
    fn clear(&mut self) -> Result<()>;

    /// Commit the transaction.
    fn commit(self: Box<Self>) -> Result<()>;

    /// Roll back the transaction, discarding any writes.
    fn rollback(self: Box<Self>) -> Result<()>;
}
