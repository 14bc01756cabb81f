//! DAG bootstrapper.
//!
//! Bootstrapping phases:
//! 1. Wait for enough connected stake
//! 2. Agree on a stop vertex with the beacons (skipped when configured)
//! 3. Fetch every missing ancestor of the stop vertex
//! 4. Drain the jobs queue, restarting the fetch if anything is left over
//! 5. Linearize the VM and switch the chain to normal operation

use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use avalanche_db::Database;
use avalanche_ids::{Id, NodeId};
use avalanche_utils::Bag;
use lru::LruCache;
use metrics::counter;
use rand::seq::{IteratorRandom, SliceRandom};
use tracing::{debug, info, warn};

use super::jobs::{JobParser, TxJob, VertexJob};
use super::requests::OutstandingRequests;
use super::startup::StartupTracker;
use super::{DagVm, Status, Vertex};
use crate::config::BootstrapConfig;
use crate::context::{ConsensusContext, EngineState};
use crate::queue::Jobs;
use crate::sender::Sender;
use crate::validators::ValidatorSet;
use crate::{ConsensusError, Result};

/// Bootstrap phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    /// Waiting for `start` and enough connected stake.
    Initializing,
    /// Asking beacons for their accepted frontier.
    FetchingFrontier,
    /// Fetching ancestors of the stop vertex.
    FetchingAncestors,
    /// Nothing left to fetch; checking the queue drained.
    Draining,
    /// Converting the DAG into a linear chain.
    Linearizing,
    /// Bootstrap complete.
    NormalOp,
}

/// An accepted-frontier query to a sample of beacons.
#[derive(Debug)]
struct FrontierQuery {
    request_id: u32,
    /// Beacons that have not answered yet.
    pending: HashSet<NodeId>,
    votes: Bag<Id>,
    /// Beacons that reported each vertex.
    reporters: HashMap<Id, Vec<NodeId>>,
}

/// Drives a chain from its local state to the network's accepted frontier.
///
/// Owned by the chain's handler task; every entry point takes `&mut self`.
pub struct Bootstrapper {
    config: BootstrapConfig,
    ctx: ConsensusContext,
    vm: Arc<dyn DagVm>,
    sender: Arc<dyn Sender>,
    beacons: Arc<ValidatorSet>,
    startup: StartupTracker,
    jobs: Jobs,

    phase: BootstrapPhase,
    start_requested: bool,
    /// Connected peers. Only beacons among them are asked for anything.
    peers: HashSet<NodeId>,
    request_id: u32,
    frontier: Option<FrontierQuery>,
    frontier_attempts: usize,
    stop_vertex_id: Option<Id>,
    outstanding: OutstandingRequests,
    /// Missing vertices not yet requested.
    need_to_fetch: BTreeSet<Id>,
    /// Peers believed to hold a missing vertex.
    holders: HashMap<Id, HashSet<NodeId>>,
    /// Vertices already pushed or found decided.
    processed: LruCache<Id, ()>,
    restarts: usize,
}

impl Bootstrapper {
    /// Creates a bootstrapper storing its jobs queue in `db`.
    pub fn new(
        config: BootstrapConfig,
        ctx: ConsensusContext,
        db: Arc<dyn Database>,
        vm: Arc<dyn DagVm>,
        sender: Arc<dyn Sender>,
        beacons: Arc<ValidatorSet>,
        startup: StartupTracker,
    ) -> Self {
        let jobs = Jobs::new(db, Arc::new(JobParser::new(vm.clone())));
        let cache_size =
            NonZeroUsize::new(config.processed_cache_size).unwrap_or(NonZeroUsize::MIN);
        let stop_vertex_id = config.stop_vertex_id;
        Self {
            config,
            ctx,
            vm,
            sender,
            beacons,
            startup,
            jobs,
            phase: BootstrapPhase::Initializing,
            start_requested: false,
            peers: HashSet::new(),
            request_id: 0,
            frontier: None,
            frontier_attempts: 0,
            stop_vertex_id,
            outstanding: OutstandingRequests::new(),
            need_to_fetch: BTreeSet::new(),
            holders: HashMap::new(),
            processed: LruCache::new(cache_size),
            restarts: 0,
        }
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    pub fn is_bootstrapping(&self) -> bool {
        !matches!(self.phase, BootstrapPhase::Initializing | BootstrapPhase::NormalOp)
    }

    pub fn stop_vertex_id(&self) -> Option<Id> {
        self.stop_vertex_id
    }

    pub fn outstanding_requests(&self) -> &OutstandingRequests {
        &self.outstanding
    }

    /// Vertices known to be missing but not requested yet.
    pub fn need_to_fetch(&self) -> impl Iterator<Item = &Id> {
        self.need_to_fetch.iter()
    }

    pub fn jobs(&self) -> &Jobs {
        &self.jobs
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// Requests the start of bootstrapping. Request IDs continue from
    /// `start_request_id`.
    ///
    /// Fetching begins as soon as enough stake is connected.
    pub fn start(&mut self, start_request_id: u32) -> Result<()> {
        if self.start_requested {
            return Ok(());
        }
        self.start_requested = true;
        self.request_id = start_request_id;
        self.ctx.set_state(EngineState::Bootstrapping);
        if !self.startup.should_start() {
            info!(
                connected_weight = self.startup.connected_weight(),
                start_weight = self.startup.start_weight(),
                "waiting for enough stake to be connected"
            );
            return Ok(());
        }
        self.begin()
    }

    pub fn connected(&mut self, node_id: NodeId) -> Result<()> {
        self.peers.insert(node_id);
        self.startup.connected(node_id);
        self.peers_changed()
    }

    pub fn disconnected(&mut self, node_id: &NodeId) -> Result<()> {
        self.peers.remove(node_id);
        self.startup.disconnected(node_id);
        Ok(())
    }

    /// Accounts for a validator weight change of a possibly connected peer.
    /// A weight of zero means the peer is not a validator.
    pub fn validator_weight_changed(
        &mut self,
        node_id: &NodeId,
        old_weight: u64,
        new_weight: u64,
    ) -> Result<()> {
        match (old_weight, new_weight) {
            (0, weight) => self.startup.on_validator_added(node_id, weight),
            (_, 0) => self.startup.on_validator_removed(node_id),
            (_, weight) => self.startup.on_validator_weight_changed(node_id, weight),
        }
        self.peers_changed()
    }

    /// Resumes whatever was waiting on connected stake or beacons.
    fn peers_changed(&mut self) -> Result<()> {
        match self.phase {
            BootstrapPhase::Initializing if self.start_requested && self.startup.should_start() => {
                self.begin()
            }
            BootstrapPhase::FetchingFrontier if self.frontier.is_none() => self.fetch_frontier(),
            BootstrapPhase::FetchingAncestors => {
                // Requests may have been waiting for a peer.
                self.fetch(None)?;
                self.check_finish()
            }
            _ => Ok(()),
        }
    }

    fn connected_beacons(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers
            .iter()
            .filter(|peer| self.beacons.contains(peer))
            .copied()
    }

    fn begin(&mut self) -> Result<()> {
        info!(chain_id = %self.ctx.chain_id, "starting bootstrap");
        self.jobs.restore()?;
        self.need_to_fetch.extend(self.jobs.missing_ids()?);

        if self.stop_vertex_id.is_some() {
            return self.fetch_stop_vertex();
        }
        if self.beacons.is_empty() {
            info!("no beacons, bootstrapping from local state");
            return self.finish(false);
        }
        self.fetch_frontier()
    }

    fn fetch_frontier(&mut self) -> Result<()> {
        self.phase = BootstrapPhase::FetchingFrontier;
        let mut rng = rand::thread_rng();
        let peers: Vec<NodeId> = self
            .connected_beacons()
            .choose_multiple(&mut rng, self.config.frontier_sample_size);
        if peers.is_empty() {
            debug!("no connected beacons, waiting to fetch the accepted frontier");
            self.frontier = None;
            return Ok(());
        }

        self.frontier_attempts += 1;
        let request_id = self.next_request_id();
        // A sample smaller than alpha still agrees by majority.
        let alpha = self.config.frontier_alpha.min(peers.len() / 2 + 1);
        let mut votes = Bag::new();
        votes.set_threshold(alpha);
        self.frontier = Some(FrontierQuery {
            request_id,
            pending: peers.iter().copied().collect(),
            votes,
            reporters: HashMap::new(),
        });

        debug!(
            request_id,
            peers = peers.len(),
            alpha,
            attempt = self.frontier_attempts,
            "fetching accepted frontier"
        );
        self.sender.send_get_accepted_frontier(&peers, request_id);
        self.check_frontier()
    }

    /// Handles a beacon's accepted frontier.
    pub fn accepted_frontier(
        &mut self,
        peer: NodeId,
        request_id: u32,
        container_ids: Vec<Id>,
    ) -> Result<()> {
        let Some(query) = self.frontier_query(&peer, request_id) else {
            debug!(%peer, request_id, "dropping unexpected AcceptedFrontier");
            return Ok(());
        };
        let reported: HashSet<Id> = container_ids.into_iter().collect();
        for vtx_id in reported {
            query.votes.add(vtx_id);
            query.reporters.entry(vtx_id).or_default().push(peer);
        }
        self.check_frontier()
    }

    /// Handles a beacon that failed to report its frontier.
    pub fn get_accepted_frontier_failed(&mut self, peer: NodeId, request_id: u32) -> Result<()> {
        if self.frontier_query(&peer, request_id).is_none() {
            debug!(%peer, request_id, "dropping unexpected GetAcceptedFrontierFailed");
            return Ok(());
        }
        self.check_frontier()
    }

    /// Marks `peer` as answered if it belongs to the current frontier query.
    fn frontier_query(&mut self, peer: &NodeId, request_id: u32) -> Option<&mut FrontierQuery> {
        if self.phase != BootstrapPhase::FetchingFrontier {
            return None;
        }
        let query = self.frontier.as_mut()?;
        if query.request_id != request_id || !query.pending.remove(peer) {
            return None;
        }
        Some(query)
    }

    fn check_frontier(&mut self) -> Result<()> {
        let Some(query) = self.frontier.as_ref() else {
            return Ok(());
        };
        let agreed = query
            .votes
            .threshold()
            .iter()
            .copied()
            .max_by_key(|id| (query.votes.count(id), *id));

        if let Some(stop_vertex_id) = agreed {
            let reporters = query
                .reporters
                .get(&stop_vertex_id)
                .cloned()
                .unwrap_or_default();
            let votes = query.votes.count(&stop_vertex_id);
            info!(%stop_vertex_id, votes, "agreed on stop vertex");
            self.holders.entry(stop_vertex_id).or_default().extend(reporters);
            self.frontier = None;
            self.stop_vertex_id = Some(stop_vertex_id);
            return self.fetch_stop_vertex();
        }
        if !query.pending.is_empty() {
            return Ok(());
        }

        if self.frontier_attempts > self.config.max_frontier_retries {
            warn!(attempts = self.frontier_attempts, "accepted frontier not agreed on");
            return Err(ConsensusError::FrontierUnresolved {
                retries: self.config.max_frontier_retries,
            });
        }
        debug!(attempts = self.frontier_attempts, "frontier quorum not reached, retrying");
        self.fetch_frontier()
    }

    fn fetch_stop_vertex(&mut self) -> Result<()> {
        let Some(stop_vertex_id) = self.stop_vertex_id else {
            return Ok(());
        };
        self.phase = BootstrapPhase::FetchingAncestors;

        match self.vm.get_vertex(&stop_vertex_id)? {
            Some(vertex) if vertex.status() == Status::Accepted && self.restarts == 0 => {
                // Queue state outlives a bootstrap only when it stopped before
                // linearizing.
                let interrupted = self.jobs.executed_count()? > 0;
                info!(%stop_vertex_id, interrupted, "stop vertex already accepted");
                return self.finish(interrupted);
            }
            Some(vertex) => self.process(vec![vertex])?,
            None => {
                self.need_to_fetch.insert(stop_vertex_id);
            }
        }
        self.fetch(None)?;
        self.check_finish()
    }

    /// Sends `GetAncestors` for missing vertices while below the request
    /// limit. Vertices that turn out to be stored locally are processed
    /// instead.
    fn fetch(&mut self, avoid: Option<NodeId>) -> Result<()> {
        loop {
            let mut local = Vec::new();
            while self.outstanding.len() < self.config.max_outstanding_requests {
                let Some(vtx_id) = self.need_to_fetch.pop_first() else {
                    break;
                };
                if self.outstanding.contains(&vtx_id) {
                    continue;
                }
                if let Some(vertex) = self.vm.get_vertex(&vtx_id)? {
                    local.push(vertex);
                    continue;
                }
                let Some(peer) = self.select_peer(&vtx_id, avoid.as_ref()) else {
                    debug!(%vtx_id, "no connected beacon to fetch from");
                    self.need_to_fetch.insert(vtx_id);
                    break;
                };
                let request_id = self.next_request_id();
                self.outstanding.add(peer, request_id, vtx_id);
                debug!(%peer, request_id, %vtx_id, "sending GetAncestors");
                self.sender.send_get_ancestors(peer, request_id, vtx_id);
            }
            if local.is_empty() {
                return Ok(());
            }
            self.process(local)?;
        }
    }

    /// Picks a connected peer for `vtx_id`, preferring peers known to hold it
    /// and avoiding `avoid` unless it is the only choice.
    fn select_peer(&self, vtx_id: &Id, avoid: Option<&NodeId>) -> Option<NodeId> {
        let mut rng = rand::thread_rng();
        let reachable = |peer: &NodeId| self.peers.contains(peer) && self.beacons.contains(peer);

        if let Some(holders) = self.holders.get(vtx_id) {
            let candidates: Vec<NodeId> = holders
                .iter()
                .filter(|peer| reachable(peer) && Some(*peer) != avoid)
                .copied()
                .collect();
            if let Some(peer) = candidates.choose(&mut rng) {
                return Some(*peer);
            }
        }
        let candidates: Vec<NodeId> = self
            .connected_beacons()
            .filter(|peer| Some(peer) != avoid)
            .collect();
        if let Some(peer) = candidates.choose(&mut rng) {
            return Some(*peer);
        }
        avoid.filter(|peer| reachable(peer)).copied()
    }

    /// Handles a peer's response to `GetAncestors`.
    ///
    /// The requested vertex must be among the containers or it is requested
    /// again from another peer. Unparseable containers are skipped, and
    /// containers that are not ancestors of the requested vertex are dropped.
    pub fn ancestors(
        &mut self,
        peer: NodeId,
        request_id: u32,
        containers: Vec<Vec<u8>>,
    ) -> Result<()> {
        let Some(requested) = self.outstanding.remove(&peer, request_id) else {
            debug!(%peer, request_id, "dropping unexpected Ancestors");
            return Ok(());
        };
        if containers.is_empty() {
            debug!(%peer, request_id, vtx_id = %requested, "empty Ancestors response");
            return self.refetch(requested, peer);
        }
        if containers.len() > self.config.ancestors_max_containers_received {
            debug!(
                %peer,
                request_id,
                received = containers.len(),
                limit = self.config.ancestors_max_containers_received,
                "ignoring containers beyond the limit"
            );
        }

        let mut parsed: HashMap<Id, Arc<dyn Vertex>> = HashMap::new();
        for bytes in containers
            .iter()
            .take(self.config.ancestors_max_containers_received)
        {
            match self.vm.parse_vertex(bytes) {
                Ok(vertex) => {
                    parsed.insert(vertex.id(), vertex);
                }
                Err(err) => {
                    debug!(%peer, request_id, error = %err, "skipping unparseable container")
                }
            }
        }
        if !parsed.contains_key(&requested) {
            debug!(
                %peer,
                request_id,
                vtx_id = %requested,
                "Ancestors is missing the requested vertex"
            );
            return self.refetch(requested, peer);
        }

        let received = parsed.len();
        let vertices = ancestry(&requested, &parsed);
        if vertices.len() < received {
            debug!(
                %peer,
                request_id,
                dropped = received - vertices.len(),
                "dropping containers unrelated to the requested vertex"
            );
        }
        for vertex in &vertices {
            for parent_id in vertex.parent_ids() {
                self.holders.entry(parent_id).or_default().insert(peer);
            }
        }

        self.process(vertices)?;
        self.fetch(None)?;
        self.check_finish()
    }

    /// Handles a `GetAncestors` request that timed out or failed.
    pub fn get_ancestors_failed(&mut self, peer: NodeId, request_id: u32) -> Result<()> {
        let Some(requested) = self.outstanding.remove(&peer, request_id) else {
            debug!(%peer, request_id, "dropping unexpected GetAncestorsFailed");
            return Ok(());
        };
        self.refetch(requested, peer)
    }

    fn refetch(&mut self, vtx_id: Id, failed_peer: NodeId) -> Result<()> {
        if let Some(holders) = self.holders.get_mut(&vtx_id) {
            holders.remove(&failed_peer);
        }
        self.need_to_fetch.insert(vtx_id);
        self.fetch(Some(failed_peer))?;
        self.check_finish()
    }

    /// Pushes `vertices` and their unaccepted ancestors that are stored
    /// locally into the jobs queue, highest first. Ancestors that are not
    /// stored are queued for fetching.
    fn process(&mut self, vertices: Vec<Arc<dyn Vertex>>) -> Result<()> {
        let mut heap = BinaryHeap::new();
        let mut by_id: HashMap<Id, Arc<dyn Vertex>> = HashMap::new();
        for vertex in vertices {
            let id = vertex.id();
            if by_id.insert(id, vertex.clone()).is_none() {
                heap.push((vertex.height(), id));
            }
        }

        while let Some((_, vtx_id)) = heap.pop() {
            let Some(vertex) = by_id.remove(&vtx_id) else {
                continue;
            };
            if self.processed.contains(&vtx_id) {
                continue;
            }
            self.need_to_fetch.remove(&vtx_id);
            self.holders.remove(&vtx_id);
            if vertex.status() != Status::Unknown {
                // Arrived in another response; a reply to the request is stale.
                self.outstanding.remove_vertex(&vtx_id);
            }

            match vertex.status() {
                Status::Unknown => {
                    if !self.outstanding.contains(&vtx_id) {
                        self.need_to_fetch.insert(vtx_id);
                    }
                    continue;
                }
                Status::Rejected => return Err(ConsensusError::RejectedVertex(vtx_id)),
                Status::Accepted => {
                    self.processed.put(vtx_id, ());
                    continue;
                }
                Status::Processing => {}
            }

            for tx in vertex.txs()? {
                let tx_id = tx.id();
                if tx.status() != Status::Accepted && self.jobs.push(Box::new(TxJob::new(tx)))? {
                    counter!("bootstrap_fetched_txs").increment(1);
                }
                self.need_to_fetch.remove(&tx_id);
                self.outstanding.remove_vertex(&tx_id);
            }
            if self
                .jobs
                .push(Box::new(VertexJob::new(self.vm.clone(), vertex.clone())))?
            {
                counter!("bootstrap_fetched_vertices").increment(1);
            }

            for parent_id in vertex.parent_ids() {
                if self.processed.contains(&parent_id) || by_id.contains_key(&parent_id) {
                    continue;
                }
                match self.vm.get_vertex(&parent_id)? {
                    Some(parent) => {
                        heap.push((parent.height(), parent_id));
                        by_id.insert(parent_id, parent);
                    }
                    None => {
                        if !self.outstanding.contains(&parent_id) {
                            self.need_to_fetch.insert(parent_id);
                        }
                    }
                }
            }
            self.processed.put(vtx_id, ());
        }
        Ok(())
    }

    fn check_finish(&mut self) -> Result<()> {
        if self.phase != BootstrapPhase::FetchingAncestors
            || !self.outstanding.is_empty()
            || !self.need_to_fetch.is_empty()
        {
            return Ok(());
        }
        let Some(stop_vertex_id) = self.stop_vertex_id else {
            return Ok(());
        };
        self.phase = BootstrapPhase::Draining;

        let pending = self.jobs.pending_len()?;
        let stop_accepted = self
            .vm
            .get_vertex(&stop_vertex_id)?
            .is_some_and(|vertex| vertex.status() == Status::Accepted);
        if pending == 0 && stop_accepted {
            return self.finish(true);
        }

        self.restarts += 1;
        if self.restarts > self.config.max_bootstrap_restarts {
            warn!(restarts = self.restarts, pending, "giving up on bootstrap");
            return Err(ConsensusError::TooManyRestarts(self.config.max_bootstrap_restarts));
        }
        info!(restarts = self.restarts, pending, %stop_vertex_id, "restarting ancestor fetch");
        self.processed.clear();
        self.need_to_fetch.extend(self.jobs.missing_ids()?);
        self.fetch_stop_vertex()
    }

    fn finish(&mut self, linearize: bool) -> Result<()> {
        if linearize {
            if let Some(stop_vertex_id) = self.stop_vertex_id {
                self.phase = BootstrapPhase::Linearizing;
                info!(%stop_vertex_id, executed = self.jobs.executed_count()?, "linearizing");
                self.vm.linearize(stop_vertex_id)?;
            }
        }
        self.jobs.clear()?;
        self.need_to_fetch.clear();
        self.holders.clear();
        self.processed.clear();
        self.phase = BootstrapPhase::NormalOp;
        self.ctx.set_state(EngineState::NormalOp);
        info!(chain_id = %self.ctx.chain_id, "bootstrap finished");
        Ok(())
    }

    fn next_request_id(&mut self) -> u32 {
        let id = self.request_id;
        self.request_id = self.request_id.wrapping_add(1);
        id
    }
}

/// The vertices of `parsed` reachable from `root` through parent links,
/// `root` included.
fn ancestry(root: &Id, parsed: &HashMap<Id, Arc<dyn Vertex>>) -> Vec<Arc<dyn Vertex>> {
    let mut reachable = Vec::new();
    let mut seen = HashSet::from([*root]);
    let mut stack = vec![*root];
    while let Some(id) = stack.pop() {
        let Some(vertex) = parsed.get(&id) else {
            continue;
        };
        for parent_id in vertex.parent_ids() {
            if seen.insert(parent_id) {
                stack.push(parent_id);
            }
        }
        reachable.push(vertex.clone());
    }
    reachable
}
