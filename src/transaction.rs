//! The transaction handle returned by [`crate::FacadeDatabase::create_transaction`].
//!
//! Wraps a single backend transaction together with the migration
//! epoch (`Inner::migration_count`) observed when it was opened. If a
//! migration completes while the transaction is still open, the
//! backend it was opened against is no longer the active one and its
//! writes would silently not apply to the target now serving traffic —
//! spec §4.7 requires `commit` to detect this and fail rather than
//! return success for a write nobody will ever see again.

use std::sync::Arc;

use crate::backend::Transaction;
use crate::error::{FacadeError, Result};
use crate::shared::Shared;

/// A transaction against whichever backend was active when it was
/// opened, tied to that backend for its whole lifetime even if the
/// facade migrates elsewhere in the meantime.
pub struct FacadeTransaction {
    inner: Box<dyn Transaction>,
    shared: Arc<Shared>,
    migration_count_at_open: u64,
}

impl FacadeTransaction {
    pub(crate) fn new(
        inner: Box<dyn Transaction>,
        shared: Arc<Shared>,
        migration_count_at_open: u64,
    ) -> Self {
        Self {
            inner,
            shared,
            migration_count_at_open,
        }
    }

    /// Read the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    /// Write `value` under `key`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.put(key, value)
    }

    /// Remove `key`, if present.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.inner.delete(key)
    }

    /// Every key/value pair currently visible to this transaction.
    pub fn scan(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan()
    }

    /// Commit the transaction.
    ///
    /// Fails with [`FacadeError::Retry`] without committing if a
    /// migration completed since this transaction was opened — the
    /// backend it holds open is no longer the one serving traffic, so
    /// the caller should open a fresh transaction against the current
    /// target and retry its work.
    pub fn commit(self) -> Result<()> {
        let migrated = {
            let inner = self.shared.inner.lock().expect("facade lock poisoned");
            inner.migration_count != self.migration_count_at_open
        };

        if migrated {
            let _ = self.inner.rollback();
            return Err(FacadeError::Retry(
                "a migration completed while this transaction was open".into(),
            ));
        }

        self.inner.commit()
    }

    /// Roll back the transaction, discarding any writes. Always safe,
    /// regardless of any migration that may have happened meanwhile.
    pub fn rollback(self) -> Result<()> {
        self.inner.rollback()
    }
}
