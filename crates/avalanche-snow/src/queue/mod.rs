//! Dependency-aware job queue.
//!
//! Jobs are pushed in any order. A job whose dependencies are all resolved
//! executes immediately; otherwise it is persisted as pending and executes
//! as soon as the last of its dependencies is executed or fulfilled. All
//! bookkeeping lives in a key-value database so a restarted node resumes
//! where it stopped.

mod jobs;
mod state;

use std::collections::HashSet;

use avalanche_ids::Id;

use crate::Result;

pub use jobs::Jobs;

/// A unit of deferred work.
pub trait Job: Send {
    /// Content-addressed identifier of the job.
    fn id(&self) -> Id;

    /// Serialized form, handed back to a [`Parser`] to rehydrate the job.
    fn bytes(&self) -> Vec<u8>;

    /// IDs this job cannot execute without.
    ///
    /// Computed on every call since dependencies may be resolved outside the
    /// queue.
    fn missing_dependencies(&self) -> Result<HashSet<Id>>;

    /// The missing dependencies that have to be fetched from elsewhere.
    /// Others are expected to be pushed along with the jobs that carry them.
    ///
    /// Only these are reported by [`Jobs::missing_ids`].
    fn fetchable_dependencies(&self) -> Result<HashSet<Id>> {
        self.missing_dependencies()
    }

    /// Applies the job's effect.
    ///
    /// Must be idempotent: executing a job whose effect was already applied
    /// returns `Ok(())`.
    fn execute(&mut self) -> Result<()>;
}

/// Turns persisted job bytes back into a job.
pub trait Parser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Box<dyn Job>>;
}
