//! Vote aggregation for sampled queries.
//!
//! A [`Poll`] tracks one round of votes from a stake-weighted sample of
//! validators. The [`Set`] holds every round that is still waiting on
//! voters and hands back results in the order the rounds were opened.

mod set;

use std::fmt;
use std::time::Instant;

use avalanche_ids::{Id, NodeId};
use avalanche_utils::Bag;

pub use set::Set;

/// A single round of voting.
#[derive(Debug, Clone)]
pub struct Poll {
    /// Voters that have not answered yet, with their sample multiplicity.
    polled: Bag<NodeId>,
    votes: Bag<Id>,
    started: Instant,
}

impl Poll {
    /// Creates a poll expecting an answer from every member of `polled`.
    pub fn new(polled: Bag<NodeId>) -> Self {
        Self {
            polled,
            votes: Bag::new(),
            started: Instant::now(),
        }
    }

    /// Records `voter`'s vote for `vote`, weighted by the number of times
    /// the voter was sampled.
    ///
    /// Votes from voters outside the sample, or from voters that already
    /// answered, are ignored.
    pub fn vote(&mut self, voter: &NodeId, vote: Id) {
        let weight = self.polled.remove(voter);
        self.votes.add_count(vote, weight);
    }

    /// Records that `voter` will not answer.
    pub fn drop(&mut self, voter: &NodeId) {
        self.polled.remove(voter);
    }

    /// Returns true once every sampled voter voted or was dropped.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.polled.is_empty()
    }

    /// Votes received so far.
    #[must_use]
    pub fn result(&self) -> &Bag<Id> {
        &self.votes
    }

    pub(crate) fn started(&self) -> Instant {
        self.started
    }

    pub(crate) fn into_result(self) -> Bag<Id> {
        self.votes
    }
}

impl fmt::Display for Poll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "waiting on {} voters, received {} votes",
            self.polled.len(),
            self.votes.len()
        )
    }
}
