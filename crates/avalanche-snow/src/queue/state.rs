//! Persistent indexes of the jobs queue.

use std::sync::Arc;

use avalanche_db::{Database, DatabaseError, KeyValueReader, KeyValueWriter, PrefixDb};
use avalanche_ids::{Id, ID_LEN};

use crate::{ConsensusError, Result};

const PENDING_PREFIX: &[u8] = b"pending/";
const DEPENDENTS_PREFIX: &[u8] = b"dependents/";
const EXECUTED_PREFIX: &[u8] = b"executed/";
const MISSING_PREFIX: &[u8] = b"missing/";
const METADATA_PREFIX: &[u8] = b"meta/";

const EXECUTED_COUNT_KEY: &[u8] = b"executed";
const PENDING_COUNT_KEY: &[u8] = b"pending";

/// Index tables of the queue, each in its own key prefix.
///
/// - `pending`: job ID to job bytes, for jobs blocked on a dependency
/// - `dependents`: `dependency ID ‖ job ID` for every blocked edge
/// - `executed`: IDs of executed jobs and fulfilled dependencies
/// - `missing`: fetchable dependencies that no pushed job provides
/// - `metadata`: executed and pending counters
pub(crate) struct State {
    pending: PrefixDb,
    dependents: PrefixDb,
    executed: PrefixDb,
    missing: PrefixDb,
    metadata: PrefixDb,
}

impl State {
    pub(crate) fn new(db: Arc<dyn Database>) -> Self {
        Self {
            pending: PrefixDb::new(db.clone(), PENDING_PREFIX),
            dependents: PrefixDb::new(db.clone(), DEPENDENTS_PREFIX),
            executed: PrefixDb::new(db.clone(), EXECUTED_PREFIX),
            missing: PrefixDb::new(db.clone(), MISSING_PREFIX),
            metadata: PrefixDb::new(db, METADATA_PREFIX),
        }
    }

    pub(crate) fn has_pending(&self, id: &Id) -> Result<bool> {
        Ok(self.pending.has(id.as_ref())?)
    }

    pub(crate) fn get_pending(&self, id: &Id) -> Result<Option<Vec<u8>>> {
        Ok(self.pending.get(id.as_ref())?)
    }

    pub(crate) fn put_pending(&self, id: &Id, bytes: &[u8]) -> Result<()> {
        if !self.has_pending(id)? {
            self.add_count(PENDING_COUNT_KEY, 1)?;
        }
        Ok(self.pending.put(id.as_ref(), bytes)?)
    }

    /// Removes `id` from the pending table, returning whether it was there.
    pub(crate) fn remove_pending(&self, id: &Id) -> Result<bool> {
        if !self.has_pending(id)? {
            return Ok(false);
        }
        self.pending.delete(id.as_ref())?;
        self.sub_count(PENDING_COUNT_KEY, 1)?;
        Ok(true)
    }

    pub(crate) fn pending_ids(&self) -> Result<Vec<Id>> {
        self.pending
            .new_iterator_with_prefix(&[])?
            .map(|(key, _)| parse_id(&key))
            .collect()
    }

    pub(crate) fn add_dependent(&self, dependency: &Id, job: &Id) -> Result<()> {
        Ok(self.dependents.put(&dependent_key(dependency, job), &[])?)
    }

    /// Removes and returns every job recorded as blocked on `dependency`.
    pub(crate) fn take_dependents(&self, dependency: &Id) -> Result<Vec<Id>> {
        let mut jobs = Vec::new();
        for (key, _) in self.dependents.new_iterator_with_prefix(dependency.as_ref())? {
            self.dependents.delete(&key)?;
            jobs.push(parse_id(&key[ID_LEN..])?);
        }
        Ok(jobs)
    }

    pub(crate) fn is_executed(&self, id: &Id) -> Result<bool> {
        Ok(self.executed.has(id.as_ref())?)
    }

    pub(crate) fn put_executed(&self, id: &Id) -> Result<()> {
        Ok(self.executed.put(id.as_ref(), &[])?)
    }

    pub(crate) fn add_missing(&self, id: &Id) -> Result<()> {
        Ok(self.missing.put(id.as_ref(), &[])?)
    }

    pub(crate) fn remove_missing(&self, id: &Id) -> Result<()> {
        Ok(self.missing.delete(id.as_ref())?)
    }

    pub(crate) fn missing_ids(&self) -> Result<Vec<Id>> {
        self.missing
            .new_iterator_with_prefix(&[])?
            .map(|(key, _)| parse_id(&key))
            .collect()
    }

    pub(crate) fn executed_count(&self) -> Result<u64> {
        self.count(EXECUTED_COUNT_KEY)
    }

    pub(crate) fn increment_executed(&self) -> Result<()> {
        self.add_count(EXECUTED_COUNT_KEY, 1)
    }

    pub(crate) fn pending_count(&self) -> Result<u64> {
        self.count(PENDING_COUNT_KEY)
    }

    /// Deletes every key of every index.
    pub(crate) fn clear(&self) -> Result<()> {
        for table in [
            &self.pending,
            &self.dependents,
            &self.executed,
            &self.missing,
            &self.metadata,
        ] {
            for (key, _) in table.new_iterator_with_prefix(&[])? {
                table.delete(&key)?;
            }
        }
        Ok(())
    }

    fn count(&self, key: &[u8]) -> Result<u64> {
        match self.metadata.get(key)? {
            None => Ok(0),
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    ConsensusError::Database(DatabaseError::Corruption(format!(
                        "counter {} has {} bytes",
                        String::from_utf8_lossy(key),
                        bytes.len()
                    )))
                })?;
                Ok(u64::from_be_bytes(arr))
            }
        }
    }

    fn add_count(&self, key: &[u8], delta: u64) -> Result<()> {
        let value = self.count(key)?.saturating_add(delta);
        Ok(self.metadata.put(key, &value.to_be_bytes())?)
    }

    fn sub_count(&self, key: &[u8], delta: u64) -> Result<()> {
        let value = self.count(key)?.saturating_sub(delta);
        Ok(self.metadata.put(key, &value.to_be_bytes())?)
    }
}

fn dependent_key(dependency: &Id, job: &Id) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 * ID_LEN);
    key.extend_from_slice(dependency.as_ref());
    key.extend_from_slice(job.as_ref());
    key
}

fn parse_id(bytes: &[u8]) -> Result<Id> {
    Id::from_slice(bytes).map_err(|e| {
        ConsensusError::Database(DatabaseError::Corruption(format!(
            "malformed id key: {e}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use avalanche_db::MemDb;

    #[test]
    fn test_dependents_are_scoped_by_dependency() {
        let state = State::new(Arc::new(MemDb::new()));
        let (a, b) = (Id::from_hash(b"a"), Id::from_hash(b"b"));
        let (j1, j2) = (Id::from_hash(b"j1"), Id::from_hash(b"j2"));
        state.add_dependent(&a, &j1).unwrap();
        state.add_dependent(&a, &j2).unwrap();
        state.add_dependent(&b, &j1).unwrap();

        let mut taken = state.take_dependents(&a).unwrap();
        taken.sort();
        let mut expected = vec![j1, j2];
        expected.sort();
        assert_eq!(taken, expected);
        assert!(state.take_dependents(&a).unwrap().is_empty());
        assert_eq!(state.take_dependents(&b).unwrap(), vec![j1]);
    }

    #[test]
    fn test_pending_counter_follows_table() {
        let state = State::new(Arc::new(MemDb::new()));
        let id = Id::from_hash(b"job");
        state.put_pending(&id, b"bytes").unwrap();
        state.put_pending(&id, b"bytes").unwrap();
        assert_eq!(state.pending_count().unwrap(), 1);

        assert!(state.remove_pending(&id).unwrap());
        assert!(!state.remove_pending(&id).unwrap());
        assert_eq!(state.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_clear_wipes_every_index() {
        let db = Arc::new(MemDb::new());
        let state = State::new(db.clone());
        let id = Id::from_hash(b"job");
        state.put_pending(&id, b"bytes").unwrap();
        state.put_executed(&id).unwrap();
        state.add_missing(&id).unwrap();
        state.increment_executed().unwrap();

        state.clear().unwrap();
        assert!(db.is_empty());
        assert_eq!(state.executed_count().unwrap(), 0);
    }
}
