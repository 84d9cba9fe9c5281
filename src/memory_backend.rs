//! A minimal in-memory [`Backend`] implementation.
//!
//! This is not a production backend — real clustered and standalone
//! key/value stores are external collaborators the facade only ever
//! sees through the [`Backend`]/[`Transaction`] traits (spec §1). This
//! type exists purely so the migration controller is exercisable in
//! this crate's own tests and doc examples, the same role `tempdir()`
//! fixtures play in the teacher crate's test suite.
//!
//! Transactions snapshot the table on open (copy-on-open) and replace it
//! wholesale on commit, which is a correct (if unsophisticated) read
//! model for a single-writer-at-a-time workload: the facade never opens
//! two read-write transactions against the same backend concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::{Backend, Consistency, Transaction};
use crate::error::Result;

type Table = HashMap<Vec<u8>, Vec<u8>>;

/// An in-memory key/value backend.
#[derive(Clone)]
pub struct MemoryBackend {
    table: Arc<Mutex<Table>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Snapshot the current contents, for assertions in tests.
    pub fn snapshot(&self) -> Table {
        self.table.lock().expect("memory backend lock poisoned").clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn create_transaction(&self) -> Result<Box<dyn Transaction>> {
        let snapshot = self.table.lock().expect("memory backend lock poisoned").clone();
        Ok(Box::new(MemoryTransaction {
            table: Arc::clone(&self.table),
            working: snapshot,
        }))
    }

    fn create_transaction_with_consistency(
        &self,
        _consistency: Consistency,
    ) -> Result<Box<dyn Transaction>> {
        // A single in-memory map has no weaker level to offer; both
        // consistency levels see the same locally-known snapshot.
        self.create_transaction()
    }
}

struct MemoryTransaction {
    table: Arc<Mutex<Table>>,
    working: Table,
}

impl Transaction for MemoryTransaction {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.working.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.working.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.working.remove(key);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .working
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn clear(&mut self) -> Result<()> {
        self.working.clear();
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        *self.table.lock().expect("memory backend lock poisoned") = self.working;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_visible_after_commit() {
        let backend = MemoryBackend::new();
        let mut tx = backend.create_transaction().unwrap();
        tx.put(b"k", b"v").unwrap();
        tx.commit().unwrap();

        let tx2 = backend.create_transaction().unwrap();
        assert_eq!(tx2.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn put_is_not_visible_after_rollback() {
        let backend = MemoryBackend::new();
        let mut tx = backend.create_transaction().unwrap();
        tx.put(b"k", b"v").unwrap();
        tx.rollback().unwrap();

        let tx2 = backend.create_transaction().unwrap();
        assert_eq!(tx2.get(b"k").unwrap(), None);
    }

    #[test]
    fn transactions_snapshot_on_open() {
        let backend = MemoryBackend::new();
        let mut writer = backend.create_transaction().unwrap();
        let reader = backend.create_transaction().unwrap();

        writer.put(b"k", b"v").unwrap();
        writer.commit().unwrap();

        // `reader` opened before the write, so it must not see it.
        assert_eq!(reader.get(b"k").unwrap(), None);
    }
}
