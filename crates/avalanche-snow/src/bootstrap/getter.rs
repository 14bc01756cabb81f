//! Serves bootstrap requests from peers.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use avalanche_ids::{Id, NodeId};
use tracing::debug;

use super::DagVm;
use crate::config::BootstrapConfig;
use crate::sender::Sender;
use crate::Result;

/// Answers `GetAcceptedFrontier` and `GetAncestors` from local state.
pub struct Getter {
    vm: Arc<dyn DagVm>,
    sender: Arc<dyn Sender>,
    max_containers_sent: usize,
    max_container_bytes: usize,
}

impl Getter {
    pub fn new(vm: Arc<dyn DagVm>, sender: Arc<dyn Sender>, config: &BootstrapConfig) -> Self {
        Self {
            vm,
            sender,
            max_containers_sent: config.ancestors_max_containers_sent,
            max_container_bytes: config.max_container_bytes,
        }
    }

    pub fn get_accepted_frontier(&self, peer: NodeId, request_id: u32) {
        self.sender
            .send_accepted_frontier(peer, request_id, self.vm.edge());
    }

    /// Replies with `vertex_id` followed by its ancestors in breadth-first
    /// order, within the configured count and byte limits.
    ///
    /// Unknown vertices are not answered; the requester's timeout handles
    /// them.
    pub fn get_ancestors(&self, peer: NodeId, request_id: u32, vertex_id: Id) -> Result<()> {
        let Some(vertex) = self.vm.get_vertex(&vertex_id)? else {
            debug!(%peer, request_id, %vertex_id, "dropping GetAncestors for unknown vertex");
            return Ok(());
        };

        let mut containers = Vec::new();
        let mut total_bytes = 0;
        let mut visited = HashSet::from([vertex_id]);
        let mut queue = VecDeque::from([vertex]);
        while let Some(vertex) = queue.pop_front() {
            if containers.len() >= self.max_containers_sent {
                break;
            }
            let bytes = vertex.bytes();
            if total_bytes + bytes.len() > self.max_container_bytes {
                break;
            }
            total_bytes += bytes.len();
            containers.push(bytes);

            for parent_id in vertex.parent_ids() {
                if !visited.insert(parent_id) {
                    continue;
                }
                match self.vm.get_vertex(&parent_id)? {
                    Some(parent) => queue.push_back(parent),
                    None => {
                        debug!(
                            vtx_id = %vertex.id(),
                            %parent_id,
                            "dropping GetAncestors, parent is missing"
                        );
                        return Ok(());
                    }
                }
            }
        }

        debug!(%peer, request_id, %vertex_id, count = containers.len(), "sending ancestors");
        self.sender.send_ancestors(peer, request_id, containers);
        Ok(())
    }
}
