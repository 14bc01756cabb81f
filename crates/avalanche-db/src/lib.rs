//! Key-value database abstraction used by the bootstrapper's job queue.
//!
//! The layers compose:
//!
//! - **MemDb**: in-memory engine for tests and ephemeral chains
//! - **PrefixDb**: namespaces one key space inside another database
//! - **VersionDb**: buffers writes until [`VersionDb::commit`], which lands
//!   them through a single atomic [`Batch`]
//!
//! ```
//! use avalanche_db::{Database, KeyValueReader, KeyValueWriter, MemDb};
//!
//! let db = MemDb::new();
//! db.put(b"key", b"value").unwrap();
//! assert_eq!(db.get(b"key").unwrap(), Some(b"value".to_vec()));
//! ```

mod error;
mod memdb;
mod prefixdb;
mod versiondb;

pub use error::{DatabaseError, Result};
pub use memdb::MemDb;
pub use prefixdb::PrefixDb;
pub use versiondb::VersionDb;

/// Read access to a key-value store.
pub trait KeyValueReader: Send + Sync {
    /// Returns whether the key exists.
    fn has(&self, key: &[u8]) -> Result<bool>;

    /// Returns the value for `key`, or `None` if it is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// Write access to a key-value store.
pub trait KeyValueWriter: Send + Sync {
    /// Sets the value for `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;
}

/// A complete database.
pub trait Database: KeyValueReader + KeyValueWriter {
    /// Applies every operation in `batch` atomically.
    fn write_batch(&self, batch: Batch) -> Result<()>;

    /// Returns a snapshot iterator over all keys starting with `prefix`, in
    /// ascending key order.
    fn new_iterator_with_prefix(&self, prefix: &[u8]) -> Result<DbIterator>;

    /// Closes the database. Later operations fail with [`DatabaseError::Closed`].
    fn close(&self) -> Result<()>;

    /// Returns whether the database is closed.
    fn is_closed(&self) -> bool;

    /// Creates an empty batch.
    fn new_batch(&self) -> Batch {
        Batch::default()
    }
}

/// A single staged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A set of writes applied atomically by [`Database::write_batch`].
#[derive(Debug, Clone, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
    size: usize,
}

impl Batch {
    /// Stages a put.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.size += key.len() + value.len();
        self.ops.push(BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Stages a delete.
    pub fn delete(&mut self, key: &[u8]) {
        self.size += key.len();
        self.ops.push(BatchOp::Delete { key: key.to_vec() });
    }

    /// Returns the number of key and value bytes staged.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of staged operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the staged operations in order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Rewrites every key in the batch with `f`.
    #[must_use]
    pub fn map_keys(self, f: impl Fn(&[u8]) -> Vec<u8>) -> Self {
        let ops = self
            .ops
            .into_iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => BatchOp::Put { key: f(&key), value },
                BatchOp::Delete { key } => BatchOp::Delete { key: f(&key) },
            })
            .collect::<Vec<_>>();
        let size = ops
            .iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => key.len() + value.len(),
                BatchOp::Delete { key } => key.len(),
            })
            .sum();
        Self { ops, size }
    }
}

/// A snapshot of key-value pairs taken when the iterator was created.
#[derive(Debug, Default)]
pub struct DbIterator {
    entries: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
}

impl DbIterator {
    /// Creates an iterator over already sorted entries.
    #[must_use]
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl Iterator for DbIterator {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}
