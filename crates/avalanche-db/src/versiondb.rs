//! Version database with copy-on-write semantics.
//!
//! Writes are buffered in memory and reads fall through to the underlying
//! database for keys that were not touched. [`VersionDb::commit`] lands the
//! whole buffer through one batch, so either every staged write becomes
//! durable or none does.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    Batch, BatchOp, Database, DatabaseError, DbIterator, KeyValueReader, KeyValueWriter, Result,
};

/// A database wrapper that buffers writes until commit.
pub struct VersionDb {
    /// `None` marks a buffered delete.
    mem: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    db: Arc<dyn Database>,
    closed: AtomicBool,
}

impl VersionDb {
    /// Creates a version layer over `db`.
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            mem: RwLock::new(BTreeMap::new()),
            db,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns true if there are uncommitted writes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.mem.read().is_empty()
    }

    /// Writes all buffered changes to the underlying database atomically.
    pub fn commit(&self) -> Result<()> {
        self.check_closed()?;
        let batch = self.commit_batch()?;
        if batch.is_empty() {
            return Ok(());
        }
        self.db.write_batch(batch)?;
        self.mem.write().clear();
        Ok(())
    }

    /// Returns the buffered changes as a batch without applying them.
    pub fn commit_batch(&self) -> Result<Batch> {
        self.check_closed()?;
        let mut batch = self.db.new_batch();
        for (key, value) in self.mem.read().iter() {
            match value {
                Some(value) => batch.put(key, value),
                None => batch.delete(key),
            }
        }
        Ok(batch)
    }

    /// Discards all buffered changes.
    pub fn abort(&self) {
        self.mem.write().clear();
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(DatabaseError::Closed)
        } else {
            Ok(())
        }
    }
}

impl KeyValueReader for VersionDb {
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_closed()?;
        if let Some(state) = self.mem.read().get(key) {
            return Ok(state.clone());
        }
        self.db.get(key)
    }
}

impl KeyValueWriter for VersionDb {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_closed()?;
        self.mem.write().insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_closed()?;
        self.mem.write().insert(key.to_vec(), None);
        Ok(())
    }
}

impl Database for VersionDb {
    fn write_batch(&self, batch: Batch) -> Result<()> {
        self.check_closed()?;
        let mut mem = self.mem.write();
        for op in batch.ops() {
            match op {
                BatchOp::Put { key, value } => {
                    mem.insert(key.clone(), Some(value.clone()));
                }
                BatchOp::Delete { key } => {
                    mem.insert(key.clone(), None);
                }
            }
        }
        Ok(())
    }

    fn new_iterator_with_prefix(&self, prefix: &[u8]) -> Result<DbIterator> {
        self.check_closed()?;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.db.new_iterator_with_prefix(prefix)?.collect();

        let mem = self.mem.read();
        for (key, state) in mem
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match state {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(DbIterator::new(merged.into_iter().collect()))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.abort();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.db.is_closed()
    }
}
