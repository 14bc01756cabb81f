//! Prefix database wrapper.
//!
//! Partitions the key space of an underlying database: every key written
//! through a [`PrefixDb`] is stored as `prefix ‖ key`, and iteration strips
//! the prefix again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{
    Batch, Database, DatabaseError, DbIterator, KeyValueReader, KeyValueWriter, Result,
};

/// A database view that prefixes all keys.
pub struct PrefixDb {
    prefix: Vec<u8>,
    db: Arc<dyn Database>,
    closed: AtomicBool,
}

impl PrefixDb {
    /// Creates a view of `db` namespaced under `prefix`.
    ///
    /// Prefixes sharing a database must not be prefixes of each other.
    pub fn new(db: Arc<dyn Database>, prefix: &[u8]) -> Self {
        Self {
            prefix: prefix.to_vec(),
            db,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the prefix used by this view.
    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(DatabaseError::Closed)
        } else {
            Ok(())
        }
    }

    fn prefix_key(&self, key: &[u8]) -> Vec<u8> {
        let mut prefixed = Vec::with_capacity(self.prefix.len() + key.len());
        prefixed.extend_from_slice(&self.prefix);
        prefixed.extend_from_slice(key);
        prefixed
    }
}

impl KeyValueReader for PrefixDb {
    fn has(&self, key: &[u8]) -> Result<bool> {
        self.check_closed()?;
        self.db.has(&self.prefix_key(key))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_closed()?;
        self.db.get(&self.prefix_key(key))
    }
}

impl KeyValueWriter for PrefixDb {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_closed()?;
        self.db.put(&self.prefix_key(key), value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_closed()?;
        self.db.delete(&self.prefix_key(key))
    }
}

impl Database for PrefixDb {
    fn write_batch(&self, batch: Batch) -> Result<()> {
        self.check_closed()?;
        self.db.write_batch(batch.map_keys(|k| self.prefix_key(k)))
    }

    fn new_iterator_with_prefix(&self, prefix: &[u8]) -> Result<DbIterator> {
        self.check_closed()?;
        let strip = self.prefix.len();
        let entries = self
            .db
            .new_iterator_with_prefix(&self.prefix_key(prefix))?
            .map(|(k, v)| (k[strip..].to_vec(), v))
            .collect();
        Ok(DbIterator::new(entries))
    }

    fn close(&self) -> Result<()> {
        // The underlying database may be shared with other views.
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.db.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemDb;

    #[test]
    fn test_keys_are_namespaced() {
        let base = Arc::new(MemDb::new());
        let a = PrefixDb::new(base.clone(), b"a/");
        let b = PrefixDb::new(base.clone(), b"b/");

        a.put(b"key", b"1").unwrap();
        b.put(b"key", b"2").unwrap();

        assert_eq!(a.get(b"key").unwrap(), Some(b"1".to_vec()));
        assert_eq!(b.get(b"key").unwrap(), Some(b"2".to_vec()));
        assert_eq!(base.get(b"a/key").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_iteration_strips_prefix() {
        let base = Arc::new(MemDb::new());
        let db = PrefixDb::new(base.clone(), b"p/");
        db.put(b"x1", b"1").unwrap();
        db.put(b"x2", b"2").unwrap();
        db.put(b"y", b"3").unwrap();
        base.put(b"x1", b"outside").unwrap();

        let entries: Vec<_> = db.new_iterator_with_prefix(b"x").unwrap().collect();
        assert_eq!(
            entries,
            vec![
                (b"x1".to_vec(), b"1".to_vec()),
                (b"x2".to_vec(), b"2".to_vec())
            ]
        );
        assert_eq!(db.new_iterator_with_prefix(b"").unwrap().count(), 3);
    }

    #[test]
    fn test_batch_is_prefixed() {
        let base = Arc::new(MemDb::new());
        let db = PrefixDb::new(base.clone(), b"p/");
        let mut batch = db.new_batch();
        batch.put(b"k", b"v");
        db.write_batch(batch).unwrap();
        assert!(base.has(b"p/k").unwrap());
    }

    #[test]
    fn test_close_keeps_underlying_open() {
        let base = Arc::new(MemDb::new());
        let db = PrefixDb::new(base.clone(), b"p/");
        db.close().unwrap();
        assert!(db.is_closed());
        assert!(!base.is_closed());
        assert_eq!(db.get(b"k"), Err(DatabaseError::Closed));
    }
}
