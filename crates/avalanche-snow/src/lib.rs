//! Avalanche DAG bootstrapping and poll aggregation.
//!
//! # Architecture
//!
//! - **Queue**: persistent dependency queue that executes jobs once the
//!   jobs they depend on have executed
//! - **Bootstrap**: agrees on a stop vertex with the beacons, fetches its
//!   ancestry and accepts it through the queue, then linearizes the VM
//! - **Startup**: holds bootstrapping back until enough stake is connected
//! - **Poll**: aggregates the votes of outstanding queries
//! - **Handler**: applies a chain's inbound messages on one task
//!
//! # Example
//!
//! ```
//! use avalanche_ids::{Id, NodeId};
//! use avalanche_snow::poll::Set;
//! use avalanche_utils::Bag;
//!
//! let (a, b) = (NodeId::from_bytes([1; 20]), NodeId::from_bytes([2; 20]));
//! let vtx = Id::from_hash(b"vtx");
//!
//! let mut polls = Set::new();
//! let request_id = polls.next_request_id();
//! polls.add(request_id, Bag::of([a, b]));
//! assert!(polls.vote(request_id, a, vtx).is_empty());
//!
//! let results = polls.vote(request_id, b, vtx);
//! assert_eq!(results[0].count(&vtx), 2);
//! ```

pub mod bootstrap;
pub mod config;
pub mod context;
mod error;
pub mod handler;
pub mod poll;
pub mod queue;
pub mod sender;
pub mod validators;

pub use bootstrap::{
    BootstrapPhase, Bootstrapper, DagVm, Getter, StartupTracker, Status, Tx, Vertex,
};
pub use config::{BootstrapConfig, Config, PollConfig, StartupConfig};
pub use context::{ConsensusContext, EngineState};
pub use error::{ConsensusError, Result};
pub use handler::{Handler, Message};
pub use queue::{Job, Jobs, Parser};
pub use sender::{ChannelSender, OutboundMessage, Sender};
pub use validators::{Validator, ValidatorSet};
