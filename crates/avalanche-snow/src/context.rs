//! Per-chain consensus context.

use std::fmt;
use std::sync::Arc;

use avalanche_ids::Id;
use parking_lot::RwLock;

/// State of a chain's consensus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting to start bootstrapping
    Initializing,
    /// Fetching and executing accepted history from beacons
    Bootstrapping,
    /// Caught up; polls drive consensus
    NormalOp,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Initializing => write!(f, "Initializing"),
            EngineState::Bootstrapping => write!(f, "Bootstrapping"),
            EngineState::NormalOp => write!(f, "NormalOp"),
        }
    }
}

/// Context shared between a chain's engine and the components observing it.
///
/// Clones share the same state cell.
#[derive(Debug, Clone)]
pub struct ConsensusContext {
    /// Chain this context belongs to.
    pub chain_id: Id,
    state: Arc<RwLock<EngineState>>,
}

impl ConsensusContext {
    /// Creates a context in the [`EngineState::Initializing`] state.
    pub fn new(chain_id: Id) -> Self {
        Self {
            chain_id,
            state: Arc::new(RwLock::new(EngineState::Initializing)),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
    }
}
