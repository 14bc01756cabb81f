//! Validator set management.

use std::collections::HashMap;

use avalanche_ids::NodeId;
use avalanche_utils::Bag;
use parking_lot::RwLock;
use rand::distributions::{Distribution, WeightedIndex};

use crate::{ConsensusError, Result};

/// A validator in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    /// Node ID
    pub node_id: NodeId,
    /// Stake weight
    pub weight: u64,
}

impl Validator {
    pub fn new(node_id: NodeId, weight: u64) -> Self {
        Self { node_id, weight }
    }
}

/// A set of validators with weights.
///
/// Shared between a chain's bootstrapper, its startup tracker and its poll
/// sampling, so membership changes take effect everywhere at once.
#[derive(Debug, Default)]
pub struct ValidatorSet {
    validators: RwLock<HashMap<NodeId, u64>>,
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding `validators`; later duplicates are ignored.
    pub fn from_validators<I: IntoIterator<Item = Validator>>(validators: I) -> Self {
        let set = Self::new();
        {
            let mut map = set.validators.write();
            for v in validators {
                map.entry(v.node_id).or_insert(v.weight);
            }
        }
        set
    }

    /// Adds a validator to the set.
    pub fn add(&self, validator: Validator) -> Result<()> {
        let mut validators = self.validators.write();
        if validators.contains_key(&validator.node_id) {
            return Err(ConsensusError::ValidatorExists(validator.node_id));
        }
        validators.insert(validator.node_id, validator.weight);
        Ok(())
    }

    /// Removes a validator, returning its weight.
    pub fn remove(&self, node_id: &NodeId) -> Result<u64> {
        self.validators
            .write()
            .remove(node_id)
            .ok_or(ConsensusError::ValidatorNotFound(*node_id))
    }

    /// Changes a validator's weight, returning the previous weight.
    pub fn set_weight(&self, node_id: &NodeId, weight: u64) -> Result<u64> {
        let mut validators = self.validators.write();
        let current = validators
            .get_mut(node_id)
            .ok_or(ConsensusError::ValidatorNotFound(*node_id))?;
        Ok(std::mem::replace(current, weight))
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Validator> {
        self.validators
            .read()
            .get(node_id)
            .map(|&weight| Validator::new(*node_id, weight))
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.validators.read().contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }

    /// Returns the total stake weight.
    pub fn total_weight(&self) -> u64 {
        self.validators
            .read()
            .values()
            .fold(0u64, |acc, w| acc.saturating_add(*w))
    }

    /// Weight of `node_id`, or 0 for non-validators.
    pub fn weight(&self, node_id: &NodeId) -> u64 {
        self.validators.read().get(node_id).copied().unwrap_or(0)
    }

    /// Returns all node IDs, sorted.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.validators.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Samples `k` validators with probability proportional to stake.
    ///
    /// A validator may be drawn more than once; the returned bag counts each
    /// draw, so a heavy validator's vote carries its multiplicity.
    pub fn sample(&self, k: usize) -> Result<Bag<NodeId>> {
        let validators = self.validators.read();
        let mut entries: Vec<(NodeId, u64)> = validators
            .iter()
            .filter(|(_, w)| **w > 0)
            .map(|(id, w)| (*id, *w))
            .collect();
        let total = entries
            .iter()
            .try_fold(0u64, |acc, (_, w)| acc.checked_add(*w))
            .ok_or(ConsensusError::WeightOverflow)?;
        if (k as u64) > total {
            return Err(ConsensusError::InsufficientValidators {
                needed: k as u64,
                have: total,
            });
        }
        if k == 0 {
            return Ok(Bag::new());
        }

        entries.sort_by_key(|(id, _)| *id);
        let dist = WeightedIndex::new(entries.iter().map(|(_, w)| *w)).map_err(|_| {
            ConsensusError::InsufficientValidators {
                needed: k as u64,
                have: total,
            }
        })?;
        let mut rng = rand::thread_rng();
        let mut sample = Bag::new();
        for _ in 0..k {
            sample.add(entries[dist.sample(&mut rng)].0);
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_node_id(byte: u8) -> NodeId {
        NodeId::from_slice(&[byte; 20]).unwrap()
    }

    #[test]
    fn test_validator_set_basic() {
        let set = ValidatorSet::new();
        set.add(Validator::new(make_node_id(1), 100)).unwrap();
        set.add(Validator::new(make_node_id(2), 200)).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.total_weight(), 300);
        assert_eq!(set.weight(&make_node_id(2)), 200);
        assert_eq!(set.weight(&make_node_id(3)), 0);
        assert!(set.contains(&make_node_id(1)));
        assert!(matches!(
            set.add(Validator::new(make_node_id(1), 5)),
            Err(ConsensusError::ValidatorExists(_))
        ));
    }

    #[test]
    fn test_remove_and_reweight() {
        let set = ValidatorSet::from_validators([Validator::new(make_node_id(1), 100)]);
        assert_eq!(set.set_weight(&make_node_id(1), 40).unwrap(), 100);
        assert_eq!(set.total_weight(), 40);
        assert_eq!(set.remove(&make_node_id(1)).unwrap(), 40);
        assert!(set.is_empty());
        assert!(set.remove(&make_node_id(1)).is_err());
        assert!(set.set_weight(&make_node_id(1), 1).is_err());
    }

    #[test]
    fn test_sample_counts_draws() {
        let set =
            ValidatorSet::from_validators((0..10).map(|i| Validator::new(make_node_id(i), 100)));
        let sample = set.sample(20).unwrap();
        assert_eq!(sample.len(), 20);
        for (node, _) in sample.iter() {
            assert!(set.contains(node));
        }
        assert!(set.sample(0).unwrap().is_empty());
    }

    #[test]
    fn test_sample_skips_zero_weight() {
        let set = ValidatorSet::from_validators([
            Validator::new(make_node_id(1), 0),
            Validator::new(make_node_id(2), 3),
        ]);
        let sample = set.sample(3).unwrap();
        assert_eq!(sample.count(&make_node_id(2)), 3);
        assert!(matches!(
            set.sample(4),
            Err(ConsensusError::InsufficientValidators { needed: 4, have: 3 })
        ));
    }

    #[test]
    fn test_sample_rejects_overflowing_weights() {
        let set = ValidatorSet::from_validators([
            Validator::new(make_node_id(1), u64::MAX),
            Validator::new(make_node_id(2), 1),
        ]);
        assert_eq!(set.total_weight(), u64::MAX);
        assert!(matches!(set.sample(1), Err(ConsensusError::WeightOverflow)));
    }
}
