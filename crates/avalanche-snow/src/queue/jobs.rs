//! The jobs queue.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use avalanche_db::{Database, VersionDb};
use avalanche_ids::Id;
use metrics::{counter, gauge};
use tracing::{debug, trace};

use super::state::State;
use super::{Job, Parser};
use crate::{ConsensusError, Result};

/// A persistent queue that executes jobs once their dependencies resolve.
///
/// Every public mutation stages its writes in a [`VersionDb`] and commits
/// them as one batch when it returns `Ok`. On error the staged writes are
/// discarded, so the database never holds half of a step.
pub struct Jobs {
    db: Arc<VersionDb>,
    state: State,
    parser: Arc<dyn Parser>,
}

impl Jobs {
    /// Creates a queue over `db`, rehydrating persisted jobs with `parser`.
    pub fn new(db: Arc<dyn Database>, parser: Arc<dyn Parser>) -> Self {
        let db = Arc::new(VersionDb::new(db));
        let state = State::new(db.clone());
        Self { db, state, parser }
    }

    /// Registers a job.
    ///
    /// Returns `Ok(false)` if the job is already pending or executed. A job
    /// with no unresolved dependencies executes before this returns, along
    /// with every pending job it unblocks.
    pub fn push(&mut self, job: Box<dyn Job>) -> Result<bool> {
        let result = self.push_job(job);
        self.finish(result)
    }

    fn push_job(&mut self, job: Box<dyn Job>) -> Result<bool> {
        let id = job.id();
        if self.state.has_pending(&id)? || self.state.is_executed(&id)? {
            return Ok(false);
        }

        let unresolved = self.unresolved_dependencies(job.as_ref())?;
        self.state.remove_missing(&id)?;
        if unresolved.is_empty() {
            self.execute_all(VecDeque::from([job]))?;
            return Ok(true);
        }

        let fetchable = job.fetchable_dependencies()?;
        for dependency in &unresolved {
            self.state.add_dependent(dependency, &id)?;
            if fetchable.contains(dependency) && !self.state.has_pending(dependency)? {
                self.state.add_missing(dependency)?;
            }
        }
        self.state.put_pending(&id, &job.bytes())?;
        trace!(%id, blocked_on = unresolved.len(), "job pending");
        Ok(true)
    }

    /// Marks `id` as resolved outside the queue and executes every job that
    /// was only waiting on it.
    pub fn fulfill(&mut self, id: Id) -> Result<()> {
        let result = self.fulfill_id(id);
        self.finish(result)
    }

    fn fulfill_id(&mut self, id: Id) -> Result<()> {
        if self.state.is_executed(&id)? {
            return Ok(());
        }
        self.state.put_executed(&id)?;
        self.state.remove_missing(&id)?;
        let mut ready = VecDeque::new();
        self.resolve(&id, &mut ready)?;
        self.execute_all(ready)
    }

    /// Returns true if `job` still depends on something the queue has not
    /// resolved.
    pub fn has_missing_dependencies(&self, job: &dyn Job) -> Result<bool> {
        Ok(!self.unresolved_dependencies(job)?.is_empty())
    }

    /// Returns true if `id` is pending or executed.
    pub fn has(&self, id: &Id) -> Result<bool> {
        Ok(self.state.has_pending(id)? || self.state.is_executed(id)?)
    }

    pub fn is_executed(&self, id: &Id) -> Result<bool> {
        self.state.is_executed(id)
    }

    /// Number of jobs waiting on a dependency.
    pub fn pending_len(&self) -> Result<u64> {
        self.state.pending_count()
    }

    /// Number of jobs executed by this queue, across restarts.
    pub fn executed_count(&self) -> Result<u64> {
        self.state.executed_count()
    }

    /// Fetchable dependencies that no pushed job provides.
    pub fn missing_ids(&self) -> Result<Vec<Id>> {
        self.state.missing_ids()
    }

    /// Re-checks every persisted pending job and executes the ones whose
    /// dependencies were resolved while the queue was not running.
    ///
    /// Returns the number of jobs executed.
    pub fn restore(&mut self) -> Result<u64> {
        let result = self.restore_pending();
        self.finish(result)
    }

    fn restore_pending(&mut self) -> Result<u64> {
        let before = self.state.executed_count()?;
        let mut ready = VecDeque::new();
        for id in self.state.pending_ids()? {
            let Some(bytes) = self.state.get_pending(&id)? else {
                continue;
            };
            let job = self.parser.parse(&bytes)?;
            if !self.has_missing_dependencies(job.as_ref())? {
                self.state.remove_pending(&id)?;
                ready.push_back(job);
            }
        }
        self.execute_all(ready)?;
        let executed = self.state.executed_count()?.saturating_sub(before);
        if executed > 0 {
            debug!(executed, "restored pending jobs");
        }
        Ok(executed)
    }

    /// Drops all queue state.
    pub fn clear(&mut self) -> Result<()> {
        let result = self.state.clear();
        self.finish(result)
    }

    /// Executes jobs until none is ready.
    ///
    /// Jobs unblocked by an execution are appended to the back of the
    /// work-list, so siblings run in the order they became ready.
    fn execute_all(&mut self, mut ready: VecDeque<Box<dyn Job>>) -> Result<()> {
        while let Some(mut job) = ready.pop_front() {
            let id = job.id();
            if self.has_missing_dependencies(job.as_ref())? {
                return Err(ConsensusError::MissingDependencies(id));
            }
            job.execute()?;
            self.state.remove_pending(&id)?;
            self.state.put_executed(&id)?;
            self.state.remove_missing(&id)?;
            self.state.increment_executed()?;
            counter!("jobs_executed").increment(1);
            trace!(%id, "job executed");

            self.resolve(&id, &mut ready)?;
        }
        Ok(())
    }

    /// Queues every dependent of `id` that has nothing left to wait on.
    fn resolve(&mut self, id: &Id, ready: &mut VecDeque<Box<dyn Job>>) -> Result<()> {
        for dependent in self.state.take_dependents(id)? {
            let Some(bytes) = self.state.get_pending(&dependent)? else {
                continue;
            };
            let job = self.parser.parse(&bytes)?;
            if !self.has_missing_dependencies(job.as_ref())? {
                self.state.remove_pending(&dependent)?;
                ready.push_back(job);
            }
        }
        Ok(())
    }

    fn unresolved_dependencies(&self, job: &dyn Job) -> Result<HashSet<Id>> {
        let id = job.id();
        let mut unresolved = HashSet::new();
        for dependency in job.missing_dependencies()? {
            if dependency != id && !self.state.is_executed(&dependency)? {
                unresolved.insert(dependency);
            }
        }
        Ok(unresolved)
    }

    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.db.commit()?;
                gauge!("jobs_pending").set(self.state.pending_count()? as f64);
                Ok(value)
            }
            Err(err) => {
                self.db.abort();
                Err(err)
            }
        }
    }
}
