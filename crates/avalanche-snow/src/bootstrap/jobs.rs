//! Queue jobs for vertices and transactions.
//!
//! Both kinds share one queue. Persisted bytes carry a one-byte tag so the
//! [`JobParser`] can tell them apart.

use std::collections::HashSet;
use std::sync::Arc;

use avalanche_ids::Id;
use metrics::counter;
use tracing::trace;

use super::{DagVm, Status, Tx, Vertex};
use crate::queue::{Job, Parser};
use crate::{ConsensusError, Result};

const VERTEX_TAG: u8 = 0;
const TX_TAG: u8 = 1;

/// Accepts a vertex once its parents and transactions are accepted.
pub struct VertexJob {
    vm: Arc<dyn DagVm>,
    vertex: Arc<dyn Vertex>,
}

impl VertexJob {
    pub fn new(vm: Arc<dyn DagVm>, vertex: Arc<dyn Vertex>) -> Self {
        Self { vm, vertex }
    }
}

impl Job for VertexJob {
    fn id(&self) -> Id {
        self.vertex.id()
    }

    fn bytes(&self) -> Vec<u8> {
        tagged(VERTEX_TAG, self.vertex.bytes())
    }

    fn missing_dependencies(&self) -> Result<HashSet<Id>> {
        let mut missing = self.fetchable_dependencies()?;
        for tx in self.vertex.txs()? {
            if tx.status() != Status::Accepted {
                missing.insert(tx.id());
            }
        }
        Ok(missing)
    }

    /// Unaccepted parents. The vertex's own transactions are pushed with it.
    fn fetchable_dependencies(&self) -> Result<HashSet<Id>> {
        let mut missing = HashSet::new();
        for parent_id in self.vertex.parent_ids() {
            let accepted = self
                .vm
                .get_vertex(&parent_id)?
                .is_some_and(|parent| parent.status() == Status::Accepted);
            if !accepted {
                missing.insert(parent_id);
            }
        }
        Ok(missing)
    }

    fn execute(&mut self) -> Result<()> {
        let id = self.vertex.id();
        match self.vertex.status() {
            Status::Accepted => return Ok(()),
            Status::Rejected => return Err(ConsensusError::RejectedVertex(id)),
            Status::Unknown | Status::Processing => {}
        }
        if !self.missing_dependencies()?.is_empty() {
            return Err(ConsensusError::MissingDependencies(id));
        }
        self.vertex.accept()?;
        counter!("bootstrap_accepted_vertices").increment(1);
        trace!(vtx_id = %id, height = self.vertex.height(), "accepted vertex");
        Ok(())
    }
}

/// Verifies and accepts a transaction once its own dependencies are accepted.
pub struct TxJob {
    tx: Arc<dyn Tx>,
}

impl TxJob {
    pub fn new(tx: Arc<dyn Tx>) -> Self {
        Self { tx }
    }
}

impl Job for TxJob {
    fn id(&self) -> Id {
        self.tx.id()
    }

    fn bytes(&self) -> Vec<u8> {
        tagged(TX_TAG, self.tx.bytes())
    }

    fn missing_dependencies(&self) -> Result<HashSet<Id>> {
        self.tx.missing_dependencies()
    }

    /// Transactions arrive inside vertices, never on their own.
    fn fetchable_dependencies(&self) -> Result<HashSet<Id>> {
        Ok(HashSet::new())
    }

    fn execute(&mut self) -> Result<()> {
        let id = self.tx.id();
        match self.tx.status() {
            Status::Accepted => return Ok(()),
            Status::Rejected => {
                return Err(ConsensusError::InvalidTx {
                    id,
                    reason: "transaction is rejected".into(),
                })
            }
            Status::Unknown | Status::Processing => {}
        }
        if !self.tx.missing_dependencies()?.is_empty() {
            return Err(ConsensusError::MissingDependencies(id));
        }
        self.tx.verify().map_err(|err| ConsensusError::InvalidTx {
            id,
            reason: err.to_string(),
        })?;
        self.tx.accept()?;
        counter!("bootstrap_accepted_txs").increment(1);
        trace!(tx_id = %id, "accepted transaction");
        Ok(())
    }
}

/// Rehydrates vertex and transaction jobs through the VM.
pub struct JobParser {
    vm: Arc<dyn DagVm>,
}

impl JobParser {
    pub fn new(vm: Arc<dyn DagVm>) -> Self {
        Self { vm }
    }
}

impl Parser for JobParser {
    fn parse(&self, bytes: &[u8]) -> Result<Box<dyn Job>> {
        match bytes.split_first() {
            Some((&VERTEX_TAG, rest)) => {
                let vertex = self.vm.parse_vertex(rest)?;
                Ok(Box::new(VertexJob::new(self.vm.clone(), vertex)))
            }
            Some((&TX_TAG, rest)) => Ok(Box::new(TxJob::new(self.vm.parse_tx(rest)?))),
            Some((tag, _)) => Err(ConsensusError::Parse(format!("unknown job tag {tag}"))),
            None => Err(ConsensusError::Parse("empty job bytes".into())),
        }
    }
}

fn tagged(tag: u8, body: Vec<u8>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(body.len() + 1);
    bytes.push(tag);
    bytes.extend(body);
    bytes
}
