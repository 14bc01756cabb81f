#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use avalanche_db::MemDb;
use avalanche_ids::{Id, NodeId};
use avalanche_snow::{
    BootstrapConfig, Bootstrapper, ChannelSender, ConsensusContext, ConsensusError, DagVm,
    OutboundMessage, Result, StartupTracker, Status, Tx, Validator, ValidatorSet, Vertex,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub fn node(i: u8) -> NodeId {
    NodeId::from_bytes([i; 20])
}

/// A validator set of `n` beacons with weight 1 each, named `node(1)..=node(n)`.
pub fn beacons(n: u8) -> Arc<ValidatorSet> {
    Arc::new(ValidatorSet::from_validators(
        (1..=n).map(|i| Validator::new(node(i), 1)),
    ))
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

#[derive(Debug)]
pub struct VertexDef {
    pub id: Id,
    pub bytes: Vec<u8>,
    pub parents: Vec<Id>,
    pub height: u64,
    pub txs: Vec<Id>,
}

#[derive(Debug)]
pub struct TxDef {
    pub id: Id,
    pub bytes: Vec<u8>,
    pub deps: Vec<Id>,
    pub valid: bool,
}

/// Registry of every vertex and transaction the tests can parse.
#[derive(Debug, Default)]
pub struct Dag {
    vertices: HashMap<Id, Arc<VertexDef>>,
    txs: HashMap<Id, Arc<TxDef>>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex(&mut self, name: &str, parents: &[Id], txs: &[Id]) -> Id {
        let bytes = format!("vtx:{name}").into_bytes();
        let id = Id::from_hash(&bytes);
        let height = parents
            .iter()
            .map(|parent| self.vertices[parent].height + 1)
            .max()
            .unwrap_or(0);
        self.vertices.insert(
            id,
            Arc::new(VertexDef {
                id,
                bytes,
                parents: parents.to_vec(),
                height,
                txs: txs.to_vec(),
            }),
        );
        id
    }

    pub fn tx(&mut self, name: &str, deps: &[Id]) -> Id {
        self.add_tx(name, deps, true)
    }

    /// A transaction that fails verification.
    pub fn invalid_tx(&mut self, name: &str) -> Id {
        self.add_tx(name, &[], false)
    }

    fn add_tx(&mut self, name: &str, deps: &[Id], valid: bool) -> Id {
        let bytes = format!("tx:{name}").into_bytes();
        let id = Id::from_hash(&bytes);
        self.txs.insert(
            id,
            Arc::new(TxDef {
                id,
                bytes,
                deps: deps.to_vec(),
                valid,
            }),
        );
        id
    }

    pub fn bytes(&self, id: &Id) -> Vec<u8> {
        self.vertices[id].bytes.clone()
    }

    /// Builds a linear chain of `len` vertices, returning their IDs from the
    /// genesis up.
    pub fn chain(&mut self, prefix: &str, len: usize) -> Vec<Id> {
        let mut ids: Vec<Id> = Vec::with_capacity(len);
        for i in 0..len {
            let parents: Vec<Id> = ids.last().copied().into_iter().collect();
            ids.push(self.vertex(&format!("{prefix}{i}"), &parents, &[]));
        }
        ids
    }
}

#[derive(Debug, Default)]
pub struct VmState {
    pub vertices: HashMap<Id, Status>,
    pub txs: HashMap<Id, Status>,
    /// Accepted vertices and transactions, in order.
    pub accepted: Vec<Id>,
    pub linearized: Option<Id>,
    pub fail_linearize: bool,
}

/// An in-memory DAG VM over a fixed [`Dag`].
///
/// Parsing stores a vertex as processing; accepting checks that every
/// parent, transaction and transaction dependency was accepted first.
#[derive(Clone)]
pub struct TestVm {
    dag: Arc<Dag>,
    pub state: Arc<Mutex<VmState>>,
}

impl TestVm {
    pub fn new(dag: Arc<Dag>) -> Self {
        Self {
            dag,
            state: Arc::new(Mutex::new(VmState::default())),
        }
    }

    /// A VM that has accepted the whole DAG.
    pub fn with_all_accepted(dag: Arc<Dag>) -> Self {
        let vm = Self::new(dag.clone());
        {
            let mut state = vm.state.lock();
            for id in dag.vertices.keys() {
                state.vertices.insert(*id, Status::Accepted);
            }
            for id in dag.txs.keys() {
                state.txs.insert(*id, Status::Accepted);
            }
        }
        vm
    }

    pub fn set_status(&self, id: Id, status: Status) {
        let mut state = self.state.lock();
        if self.dag.vertices.contains_key(&id) {
            state.vertices.insert(id, status);
        } else {
            state.txs.insert(id, status);
        }
    }

    pub fn status(&self, id: &Id) -> Status {
        let state = self.state.lock();
        state
            .vertices
            .get(id)
            .or_else(|| state.txs.get(id))
            .copied()
            .unwrap_or(Status::Unknown)
    }

    pub fn accepted(&self) -> Vec<Id> {
        self.state.lock().accepted.clone()
    }

    pub fn linearized(&self) -> Option<Id> {
        self.state.lock().linearized
    }

    fn vertex(&self, def: Arc<VertexDef>) -> Arc<dyn Vertex> {
        Arc::new(TestVertex { vm: self.clone(), def })
    }

    fn tx(&self, def: Arc<TxDef>) -> Arc<dyn Tx> {
        Arc::new(TestTx { vm: self.clone(), def })
    }
}

impl DagVm for TestVm {
    fn parse_vertex(&self, bytes: &[u8]) -> Result<Arc<dyn Vertex>> {
        let id = Id::from_hash(bytes);
        let def = self
            .dag
            .vertices
            .get(&id)
            .cloned()
            .ok_or_else(|| ConsensusError::Parse(format!("unknown vertex bytes {id}")))?;
        {
            let mut state = self.state.lock();
            state.vertices.entry(id).or_insert(Status::Processing);
            for tx_id in &def.txs {
                state.txs.entry(*tx_id).or_insert(Status::Processing);
            }
        }
        Ok(self.vertex(def))
    }

    fn parse_tx(&self, bytes: &[u8]) -> Result<Arc<dyn Tx>> {
        let id = Id::from_hash(bytes);
        let def = self
            .dag
            .txs
            .get(&id)
            .cloned()
            .ok_or_else(|| ConsensusError::Parse(format!("unknown tx bytes {id}")))?;
        self.state.lock().txs.entry(id).or_insert(Status::Processing);
        Ok(self.tx(def))
    }

    fn get_vertex(&self, id: &Id) -> Result<Option<Arc<dyn Vertex>>> {
        if !self.state.lock().vertices.contains_key(id) {
            return Ok(None);
        }
        Ok(self.dag.vertices.get(id).cloned().map(|def| self.vertex(def)))
    }

    fn edge(&self) -> Vec<Id> {
        let state = self.state.lock();
        let accepted: HashSet<Id> = state
            .vertices
            .iter()
            .filter(|(_, status)| **status == Status::Accepted)
            .map(|(id, _)| *id)
            .collect();
        let with_children: HashSet<Id> = accepted
            .iter()
            .flat_map(|id| self.dag.vertices[id].parents.iter().copied())
            .collect();
        let mut edge: Vec<Id> = accepted.difference(&with_children).copied().collect();
        edge.sort();
        edge
    }

    fn linearize(&self, stop_vertex_id: Id) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_linearize {
            return Err(ConsensusError::Vm("linearize interrupted".into()));
        }
        if state.linearized.is_some() {
            return Err(ConsensusError::Vm("already linearized".into()));
        }
        state.linearized = Some(stop_vertex_id);
        Ok(())
    }
}

struct TestVertex {
    vm: TestVm,
    def: Arc<VertexDef>,
}

impl Vertex for TestVertex {
    fn id(&self) -> Id {
        self.def.id
    }

    fn bytes(&self) -> Vec<u8> {
        self.def.bytes.clone()
    }

    fn parent_ids(&self) -> Vec<Id> {
        self.def.parents.clone()
    }

    fn height(&self) -> u64 {
        self.def.height
    }

    fn status(&self) -> Status {
        self.vm.status(&self.def.id)
    }

    fn txs(&self) -> Result<Vec<Arc<dyn Tx>>> {
        Ok(self
            .def
            .txs
            .iter()
            .map(|id| self.vm.tx(self.vm.dag.txs[id].clone()))
            .collect())
    }

    fn accept(&self) -> Result<()> {
        let mut state = self.vm.state.lock();
        let ready = self
            .def
            .parents
            .iter()
            .all(|id| state.vertices.get(id) == Some(&Status::Accepted))
            && self
                .def
                .txs
                .iter()
                .all(|id| state.txs.get(id) == Some(&Status::Accepted));
        if !ready {
            return Err(ConsensusError::Vm(format!(
                "vertex {} accepted before its dependencies",
                self.def.id
            )));
        }
        state.vertices.insert(self.def.id, Status::Accepted);
        state.accepted.push(self.def.id);
        Ok(())
    }
}

struct TestTx {
    vm: TestVm,
    def: Arc<TxDef>,
}

impl Tx for TestTx {
    fn id(&self) -> Id {
        self.def.id
    }

    fn bytes(&self) -> Vec<u8> {
        self.def.bytes.clone()
    }

    fn status(&self) -> Status {
        self.vm.status(&self.def.id)
    }

    fn missing_dependencies(&self) -> Result<HashSet<Id>> {
        let state = self.vm.state.lock();
        Ok(self
            .def
            .deps
            .iter()
            .filter(|id| state.txs.get(*id) != Some(&Status::Accepted))
            .copied()
            .collect())
    }

    fn verify(&self) -> Result<()> {
        if self.def.valid {
            Ok(())
        } else {
            Err(ConsensusError::Vm("invalid transaction".into()))
        }
    }

    fn accept(&self) -> Result<()> {
        if !self.missing_dependencies()?.is_empty() {
            return Err(ConsensusError::Vm(format!(
                "tx {} accepted before its dependencies",
                self.def.id
            )));
        }
        let mut state = self.vm.state.lock();
        state.txs.insert(self.def.id, Status::Accepted);
        state.accepted.push(self.def.id);
        Ok(())
    }
}

/// A bootstrapping node wired to an in-memory database and a channel sender.
pub struct Node {
    pub bootstrapper: Bootstrapper,
    pub vm: TestVm,
    pub ctx: ConsensusContext,
    pub db: Arc<MemDb>,
    pub outbound: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Node {
    pub fn new(dag: Arc<Dag>, config: BootstrapConfig, beacons: Arc<ValidatorSet>) -> Self {
        Self::with_db(TestVm::new(dag), config, beacons, Arc::new(MemDb::new()))
    }

    pub fn with_db(
        vm: TestVm,
        config: BootstrapConfig,
        beacons: Arc<ValidatorSet>,
        db: Arc<MemDb>,
    ) -> Self {
        let ctx = ConsensusContext::new(Id::from_hash(b"chain"));
        let (sender, outbound) = ChannelSender::new();
        let startup = StartupTracker::new(beacons.clone(), 0);
        let bootstrapper = Bootstrapper::new(
            config,
            ctx.clone(),
            db.clone(),
            Arc::new(vm.clone()),
            Arc::new(sender),
            beacons,
            startup,
        );
        Self {
            bootstrapper,
            vm,
            ctx,
            db,
            outbound,
        }
    }

    pub fn sent(&mut self) -> Vec<OutboundMessage> {
        drain(&mut self.outbound)
    }
}
