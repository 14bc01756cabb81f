//! Set of outstanding polls.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use avalanche_ids::{Id, NodeId};
use avalanche_utils::Bag;
use metrics::{gauge, histogram};
use tracing::debug;

use super::Poll;

/// Outstanding polls keyed by request ID.
///
/// Results are returned oldest first: a finished poll stays in the set until
/// every poll opened before it has finished as well.
#[derive(Debug, Default)]
pub struct Set {
    polls: HashMap<u32, Poll>,
    /// Request IDs in creation order.
    order: VecDeque<u32>,
    next_request_id: u32,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a request ID for a new poll.
    pub fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    /// Opens a poll for `request_id` expecting answers from `voters`.
    ///
    /// Returns false, leaving the existing poll untouched, if `request_id`
    /// is already in the set.
    pub fn add(&mut self, request_id: u32, voters: Bag<NodeId>) -> bool {
        if self.polls.contains_key(&request_id) {
            debug!(request_id, "dropping poll due to duplicated request ID");
            return false;
        }
        debug!(request_id, voters = voters.len(), "creating poll");
        self.polls.insert(request_id, Poll::new(voters));
        self.order.push_back(request_id);
        gauge!("polls").set(self.polls.len() as f64);
        true
    }

    /// Registers `voter`'s vote and returns the results of every poll that
    /// can now be reported.
    pub fn vote(&mut self, request_id: u32, voter: NodeId, vote: Id) -> Vec<Bag<Id>> {
        let Some(poll) = self.polls.get_mut(&request_id) else {
            debug!(request_id, %voter, "dropping vote from unknown poll");
            return Vec::new();
        };
        debug!(request_id, %voter, %vote, "processing vote");
        poll.vote(&voter, vote);
        if !poll.finished() {
            return Vec::new();
        }
        self.drain_finished()
    }

    /// Registers that `voter` will not answer `request_id` and returns the
    /// results of every poll that can now be reported.
    pub fn drop(&mut self, request_id: u32, voter: NodeId) -> Vec<Bag<Id>> {
        let Some(poll) = self.polls.get_mut(&request_id) else {
            debug!(request_id, %voter, "dropping abstention from unknown poll");
            return Vec::new();
        };
        debug!(request_id, %voter, "processing abstention");
        poll.drop(&voter);
        if !poll.finished() {
            return Vec::new();
        }
        self.drain_finished()
    }

    /// Number of polls in the set, including finished polls waiting on an
    /// older one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.polls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    fn drain_finished(&mut self) -> Vec<Bag<Id>> {
        let mut results = Vec::new();
        while let Some(&request_id) = self.order.front() {
            match self.polls.get(&request_id) {
                Some(poll) if poll.finished() => {}
                Some(_) => break,
                None => {
                    self.order.pop_front();
                    continue;
                }
            }
            self.order.pop_front();
            if let Some(poll) = self.polls.remove(&request_id) {
                histogram!("poll_duration_seconds").record(poll.started().elapsed().as_secs_f64());
                debug!(request_id, result = ?poll.result(), "poll finished");
                results.push(poll.into_result());
            }
        }
        gauge!("polls").set(self.polls.len() as f64);
        results
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "current polls: (size = {})", self.polls.len())?;
        for request_id in &self.order {
            if let Some(poll) = self.polls.get(request_id) {
                write!(f, "\n    request {request_id}: {poll}")?;
            }
        }
        Ok(())
    }
}
