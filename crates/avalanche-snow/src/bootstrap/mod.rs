//! DAG bootstrapping.
//!
//! A bootstrapping node agrees with its beacons on a stop vertex, fetches
//! every unaccepted ancestor of it, and executes the vertices and their
//! transactions through the [`Jobs`](crate::queue::Jobs) queue so nothing is
//! accepted before its dependencies. Once the stop vertex is accepted the
//! VM is linearized and the chain moves to normal operation.

mod bootstrapper;
mod getter;
mod jobs;
mod requests;
pub mod startup;

use std::collections::HashSet;
use std::sync::Arc;

use avalanche_ids::Id;

use crate::Result;

pub use bootstrapper::{BootstrapPhase, Bootstrapper};
pub use getter::Getter;
pub use jobs::{JobParser, TxJob, VertexJob};
pub use requests::OutstandingRequests;
pub use startup::StartupTracker;

/// Local status of a vertex or transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Not stored locally
    Unknown,
    /// Stored but not decided
    Processing,
    /// Rejected
    Rejected,
    /// Accepted and finalized
    Accepted,
}

impl Status {
    /// Returns true if decided (accepted or rejected).
    pub fn decided(&self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }

    /// Returns true if the item is stored locally.
    pub fn fetched(&self) -> bool {
        !matches!(self, Status::Unknown)
    }
}

/// A transaction carried by a vertex.
pub trait Tx: Send + Sync {
    fn id(&self) -> Id;

    fn bytes(&self) -> Vec<u8>;

    fn status(&self) -> Status;

    /// Transactions this one depends on that are not accepted yet.
    fn missing_dependencies(&self) -> Result<HashSet<Id>>;

    fn verify(&self) -> Result<()>;

    fn accept(&self) -> Result<()>;
}

/// A node of the DAG.
pub trait Vertex: Send + Sync {
    fn id(&self) -> Id;

    fn bytes(&self) -> Vec<u8>;

    fn parent_ids(&self) -> Vec<Id>;

    /// Length of the longest path to the genesis vertex.
    fn height(&self) -> u64;

    fn status(&self) -> Status;

    fn txs(&self) -> Result<Vec<Arc<dyn Tx>>>;

    fn accept(&self) -> Result<()>;
}

/// The DAG VM a bootstrapping chain drives.
pub trait DagVm: Send + Sync {
    /// Parses and stores a vertex. A stored vertex that is not yet decided
    /// reports [`Status::Processing`].
    fn parse_vertex(&self, bytes: &[u8]) -> Result<Arc<dyn Vertex>>;

    fn parse_tx(&self, bytes: &[u8]) -> Result<Arc<dyn Tx>>;

    /// Returns the vertex if it is stored locally.
    fn get_vertex(&self, id: &Id) -> Result<Option<Arc<dyn Vertex>>>;

    /// Accepted vertices with no accepted children.
    fn edge(&self) -> Vec<Id>;

    /// Converts the accepted DAG ending at `stop_vertex_id` into a linear
    /// chain. Called once per chain.
    fn linearize(&self, stop_vertex_id: Id) -> Result<()>;
}
