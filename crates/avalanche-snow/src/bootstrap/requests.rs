//! Outstanding ancestor requests.

use std::collections::HashMap;

use avalanche_ids::{Id, NodeId};

/// In-flight `GetAncestors` requests, indexed both ways.
///
/// At most one request is outstanding per vertex: adding a request for a
/// vertex that already has one supersedes the old request ID.
#[derive(Debug, Default)]
pub struct OutstandingRequests {
    by_request: HashMap<u32, (NodeId, Id)>,
    by_vertex: HashMap<Id, u32>,
}

impl OutstandingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `vertex_id` was requested from `peer` under `request_id`.
    pub fn add(&mut self, peer: NodeId, request_id: u32, vertex_id: Id) {
        if let Some(old) = self.by_vertex.insert(vertex_id, request_id) {
            self.by_request.remove(&old);
        }
        if let Some((_, previous)) = self.by_request.insert(request_id, (peer, vertex_id)) {
            if previous != vertex_id {
                self.by_vertex.remove(&previous);
            }
        }
    }

    /// Removes the request if it was sent to `peer`, returning the vertex it
    /// asked for.
    pub fn remove(&mut self, peer: &NodeId, request_id: u32) -> Option<Id> {
        match self.by_request.get(&request_id) {
            Some((requested_from, _)) if requested_from == peer => {}
            _ => return None,
        }
        let (_, vertex_id) = self.by_request.remove(&request_id)?;
        self.by_vertex.remove(&vertex_id);
        Some(vertex_id)
    }

    /// Removes whatever request is outstanding for `vertex_id`.
    pub fn remove_vertex(&mut self, vertex_id: &Id) -> Option<u32> {
        let request_id = self.by_vertex.remove(vertex_id)?;
        self.by_request.remove(&request_id);
        Some(request_id)
    }

    pub fn contains(&self, vertex_id: &Id) -> bool {
        self.by_vertex.contains_key(vertex_id)
    }

    /// Returns the request ID outstanding for `vertex_id`.
    pub fn request_id(&self, vertex_id: &Id) -> Option<u32> {
        self.by_vertex.get(vertex_id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_request.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(byte: u8) -> NodeId {
        NodeId::from_bytes([byte; 20])
    }

    #[test]
    fn test_remove_requires_matching_peer() {
        let vtx = Id::from_hash(b"vtx");
        let mut requests = OutstandingRequests::new();
        requests.add(node(1), 5, vtx);

        assert_eq!(requests.remove(&node(2), 5), None);
        assert_eq!(requests.remove(&node(1), 6), None);
        assert_eq!(requests.remove(&node(1), 5), Some(vtx));
        assert!(requests.is_empty());
        assert!(!requests.contains(&vtx));
    }

    #[test]
    fn test_new_request_supersedes_old() {
        let vtx = Id::from_hash(b"vtx");
        let mut requests = OutstandingRequests::new();
        requests.add(node(1), 1, vtx);
        requests.add(node(2), 2, vtx);

        assert_eq!(requests.len(), 1);
        assert_eq!(requests.request_id(&vtx), Some(2));
        assert_eq!(requests.remove(&node(1), 1), None);
        assert_eq!(requests.remove(&node(2), 2), Some(vtx));
    }

    #[test]
    fn test_remove_vertex() {
        let (a, b) = (Id::from_hash(b"a"), Id::from_hash(b"b"));
        let mut requests = OutstandingRequests::new();
        requests.add(node(1), 1, a);
        requests.add(node(1), 2, b);

        assert_eq!(requests.remove_vertex(&a), Some(1));
        assert_eq!(requests.remove_vertex(&a), None);
        assert_eq!(requests.len(), 1);
        assert!(requests.contains(&b));
    }
}
