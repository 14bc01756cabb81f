//! Error types for bootstrapping and polling.

use avalanche_db::DatabaseError;
use avalanche_ids::{Id, NodeId};
use thiserror::Error;

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors that can occur while bootstrapping a chain or running polls.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Storage failure in the jobs queue
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Bytes could not be turned into a job, vertex or transaction
    #[error("parse error: {0}")]
    Parse(String),

    /// A job was executed while one of its dependencies was unresolved
    #[error("job {0} executed with missing dependencies")]
    MissingDependencies(Id),

    /// A rejected vertex is an ancestor of the stop vertex
    #[error("vertex {0} is rejected")]
    RejectedVertex(Id),

    /// Transaction failed verification during bootstrap
    #[error("transaction {id} failed verification: {reason}")]
    InvalidTx { id: Id, reason: String },

    /// Failure reported by the VM
    #[error("vm error: {0}")]
    Vm(String),

    /// No vertex reached the frontier quorum
    #[error("accepted frontier not agreed on after {retries} retries")]
    FrontierUnresolved { retries: usize },

    /// Bootstrap kept finding unresolved jobs
    #[error("bootstrap restarted {0} times without accepting the stop vertex")]
    TooManyRestarts(usize),

    /// Not enough validator weight to sample
    #[error("insufficient validators: need {needed}, have {have}")]
    InsufficientValidators { needed: u64, have: u64 },

    #[error("validator weights overflow u64")]
    WeightOverflow,

    #[error("validator {0} already exists")]
    ValidatorExists(NodeId),

    #[error("validator {0} not found")]
    ValidatorNotFound(NodeId),

    /// The consumer of an engine channel went away
    #[error("{0} channel closed")]
    ChannelClosed(&'static str),

    /// Configuration failed validation
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}
