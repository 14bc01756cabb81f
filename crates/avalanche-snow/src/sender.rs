//! Outbound message dispatch.

use avalanche_ids::{Id, NodeId};
use tokio::sync::mpsc;
use tracing::debug;

/// Fire-and-forget network sends issued by the engine.
///
/// Implementations must not block; delivery failures surface later as
/// `*Failed` messages from the timeout layer.
pub trait Sender: Send + Sync {
    fn send_get_accepted_frontier(&self, peers: &[NodeId], request_id: u32);

    fn send_accepted_frontier(&self, peer: NodeId, request_id: u32, container_ids: Vec<Id>);

    fn send_get_ancestors(&self, peer: NodeId, request_id: u32, vertex_id: Id);

    fn send_ancestors(&self, peer: NodeId, request_id: u32, containers: Vec<Vec<u8>>);

    fn send_push_query(&self, peers: &[NodeId], request_id: u32, container_id: Id);
}

/// A message handed to the network layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    GetAcceptedFrontier {
        peers: Vec<NodeId>,
        request_id: u32,
    },
    AcceptedFrontier {
        peer: NodeId,
        request_id: u32,
        container_ids: Vec<Id>,
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
    PushQuery {
        peers: Vec<NodeId>,
        request_id: u32,
        container_id: Id,
    },
}

/// A [`Sender`] that forwards every send onto an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelSender {
    /// Creates a sender and the receiver the network layer drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, msg: OutboundMessage) {
        if let Err(err) = self.tx.send(msg) {
            debug!(msg = ?err.0, "outbound channel closed, dropping message");
        }
    }
}

impl Sender for ChannelSender {
    fn send_get_accepted_frontier(&self, peers: &[NodeId], request_id: u32) {
        self.send(OutboundMessage::GetAcceptedFrontier {
            peers: peers.to_vec(),
            request_id,
        });
    }

    fn send_accepted_frontier(&self, peer: NodeId, request_id: u32, container_ids: Vec<Id>) {
        self.send(OutboundMessage::AcceptedFrontier {
            peer,
            request_id,
            container_ids,
        });
    }

    fn send_get_ancestors(&self, peer: NodeId, request_id: u32, vertex_id: Id) {
        self.send(OutboundMessage::GetAncestors {
            peer,
            request_id,
            vertex_id,
        });
    }

    fn send_ancestors(&self, peer: NodeId, request_id: u32, containers: Vec<Vec<u8>>) {
        self.send(OutboundMessage::Ancestors {
            peer,
            request_id,
            containers,
        });
    }

    fn send_push_query(&self, peers: &[NodeId], request_id: u32, container_id: Id) {
        self.send(OutboundMessage::PushQuery {
            peers: peers.to_vec(),
            request_id,
            container_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sender_forwards() {
        let (sender, mut rx) = ChannelSender::new();
        let peer = NodeId::from_bytes([1; 20]);
        let vtx = Id::from_hash(b"vtx");

        sender.send_get_ancestors(peer, 3, vtx);
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundMessage::GetAncestors {
                peer,
                request_id: 3,
                vertex_id: vtx
            }
        );
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (sender, rx) = ChannelSender::new();
        drop(rx);
        sender.send_push_query(&[NodeId::from_bytes([1; 20])], 1, Id::from_hash(b"x"));
    }
}
