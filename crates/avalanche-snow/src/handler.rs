//! Per-chain message handler.
//!
//! The handler task owns the bootstrapper, the getter and the poll set, and
//! applies inbound messages to them one at a time.

use std::sync::Arc;

use avalanche_ids::{Id, NodeId};
use avalanche_utils::Bag;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bootstrap::{Bootstrapper, Getter};
use crate::config::PollConfig;
use crate::context::{ConsensusContext, EngineState};
use crate::poll::Set;
use crate::sender::Sender;
use crate::validators::{Validator, ValidatorSet};
use crate::{ConsensusError, Result};

/// An inbound message for a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Connected(NodeId),
    Disconnected(NodeId),
    ValidatorAdded(Validator),
    ValidatorRemoved(NodeId),
    ValidatorWeightChanged {
        node_id: NodeId,
        weight: u64,
    },
    /// Begins bootstrapping with request IDs starting at `request_id`.
    Start {
        request_id: u32,
    },
    GetAcceptedFrontier {
        peer: NodeId,
        request_id: u32,
    },
    AcceptedFrontier {
        peer: NodeId,
        request_id: u32,
        container_ids: Vec<Id>,
    },
    GetAcceptedFrontierFailed {
        peer: NodeId,
        request_id: u32,
    },
    GetAncestors {
        peer: NodeId,
        request_id: u32,
        vertex_id: Id,
    },
    Ancestors {
        peer: NodeId,
        request_id: u32,
        containers: Vec<Vec<u8>>,
    },
    GetAncestorsFailed {
        peer: NodeId,
        request_id: u32,
    },
    /// Polls a sample of validators about `container_id`.
    PushQuery {
        container_id: Id,
    },
    Chits {
        peer: NodeId,
        request_id: u32,
        vote: Id,
    },
    QueryFailed {
        peer: NodeId,
        request_id: u32,
    },
    Shutdown,
}

/// Drives one chain from its inbox.
pub struct Handler {
    ctx: ConsensusContext,
    bootstrapper: Bootstrapper,
    getter: Getter,
    polls: Set,
    validators: Arc<ValidatorSet>,
    sender: Arc<dyn Sender>,
    sample_size: usize,
    inbox: mpsc::Receiver<Message>,
    results: mpsc::UnboundedSender<Bag<Id>>,
}

impl Handler {
    /// Creates a handler together with its inbox sender and the receiver of
    /// finished poll results.
    pub fn new(
        ctx: ConsensusContext,
        bootstrapper: Bootstrapper,
        getter: Getter,
        validators: Arc<ValidatorSet>,
        sender: Arc<dyn Sender>,
        config: &PollConfig,
    ) -> (Self, mpsc::Sender<Message>, mpsc::UnboundedReceiver<Bag<Id>>) {
        let (inbox_tx, inbox) = mpsc::channel(config.inbox_capacity);
        let (results, results_rx) = mpsc::unbounded_channel();
        let handler = Self {
            ctx,
            bootstrapper,
            getter,
            polls: Set::new(),
            validators,
            sender,
            sample_size: config.sample_size,
            inbox,
            results,
        };
        (handler, inbox_tx, results_rx)
    }

    pub fn bootstrapper(&self) -> &Bootstrapper {
        &self.bootstrapper
    }

    pub fn polls(&self) -> &Set {
        &self.polls
    }

    /// Processes messages until `Shutdown`, a closed inbox, or a fatal error.
    pub async fn run(mut self) -> Result<()> {
        info!(chain_id = %self.ctx.chain_id, "chain handler started");
        while let Some(msg) = self.inbox.recv().await {
            if msg == Message::Shutdown {
                break;
            }
            if let Err(err) = self.handle(msg) {
                error!(chain_id = %self.ctx.chain_id, error = %err, "chain handler failed");
                return Err(err);
            }
        }
        info!(chain_id = %self.ctx.chain_id, "chain handler stopped");
        Ok(())
    }

    /// Applies one message.
    pub fn handle(&mut self, msg: Message) -> Result<()> {
        match msg {
            Message::Connected(node_id) => self.bootstrapper.connected(node_id),
            Message::Disconnected(node_id) => self.bootstrapper.disconnected(&node_id),
            Message::ValidatorAdded(validator) => {
                if let Err(err) = self.validators.add(validator) {
                    warn!(error = %err, "ignoring validator addition");
                    return Ok(());
                }
                self.bootstrapper
                    .validator_weight_changed(&validator.node_id, 0, validator.weight)
            }
            Message::ValidatorRemoved(node_id) => match self.validators.remove(&node_id) {
                Ok(old) => self.bootstrapper.validator_weight_changed(&node_id, old, 0),
                Err(err) => {
                    warn!(error = %err, "ignoring validator removal");
                    Ok(())
                }
            },
            Message::ValidatorWeightChanged { node_id, weight } => {
                match self.validators.set_weight(&node_id, weight) {
                    Ok(old) => self.bootstrapper.validator_weight_changed(&node_id, old, weight),
                    Err(err) => {
                        warn!(error = %err, "ignoring validator weight change");
                        Ok(())
                    }
                }
            }
            Message::Start { request_id } => self.bootstrapper.start(request_id),
            Message::GetAcceptedFrontier { peer, request_id } => {
                self.getter.get_accepted_frontier(peer, request_id);
                Ok(())
            }
            Message::AcceptedFrontier {
                peer,
                request_id,
                container_ids,
            } => self
                .bootstrapper
                .accepted_frontier(peer, request_id, container_ids),
            Message::GetAcceptedFrontierFailed { peer, request_id } => self
                .bootstrapper
                .get_accepted_frontier_failed(peer, request_id),
            Message::GetAncestors {
                peer,
                request_id,
                vertex_id,
            } => self.getter.get_ancestors(peer, request_id, vertex_id),
            Message::Ancestors {
                peer,
                request_id,
                containers,
            } => self.bootstrapper.ancestors(peer, request_id, containers),
            Message::GetAncestorsFailed { peer, request_id } => {
                self.bootstrapper.get_ancestors_failed(peer, request_id)
            }
            Message::PushQuery { container_id } => {
                self.push_query(container_id);
                Ok(())
            }
            Message::Chits {
                peer,
                request_id,
                vote,
            } => {
                let results = self.polls.vote(request_id, peer, vote);
                self.publish(results)
            }
            Message::QueryFailed { peer, request_id } => {
                let results = self.polls.drop(request_id, peer);
                self.publish(results)
            }
            Message::Shutdown => Ok(()),
        }
    }

    fn push_query(&mut self, container_id: Id) {
        if self.ctx.state() != EngineState::NormalOp {
            debug!(
                %container_id,
                state = %self.ctx.state(),
                "dropping query before bootstrap finished"
            );
            return;
        }
        let voters = match self.validators.sample(self.sample_size) {
            Ok(voters) => voters,
            Err(err) => {
                warn!(%container_id, error = %err, "unable to sample validators");
                return;
            }
        };
        let request_id = self.polls.next_request_id();
        let peers = voters.list();
        if self.polls.add(request_id, voters) {
            self.sender.send_push_query(&peers, request_id, container_id);
        }
    }

    fn publish(&self, results: Vec<Bag<Id>>) -> Result<()> {
        for result in results {
            debug!(votes = result.len(), "poll finished");
            if self.results.send(result).is_err() {
                return Err(ConsensusError::ChannelClosed("poll results"));
            }
        }
        Ok(())
    }
}
