//! Gate that holds bootstrapping back until enough stake is connected.

use std::collections::HashMap;
use std::sync::Arc;

use avalanche_ids::NodeId;
use tracing::{debug, info};

use crate::config::StartupConfig;
use crate::validators::ValidatorSet;

/// Tracks the stake of connected validators.
///
/// Once the connected stake reaches the start weight, [`should_start`]
/// stays true for the lifetime of the tracker.
///
/// [`should_start`]: StartupTracker::should_start
pub struct StartupTracker {
    validators: Arc<ValidatorSet>,
    start_weight: u64,
    /// Connected peers and the weight counted for each.
    connected: HashMap<NodeId, u64>,
    connected_weight: u64,
    started: bool,
}

impl StartupTracker {
    /// Creates a tracker that opens once `start_weight` stake is connected.
    pub fn new(validators: Arc<ValidatorSet>, start_weight: u64) -> Self {
        Self {
            validators,
            start_weight,
            connected: HashMap::new(),
            connected_weight: 0,
            started: start_weight == 0,
        }
    }

    /// Creates a tracker that opens once `percent` of the current total
    /// stake is connected, rounded up.
    pub fn with_percent(validators: Arc<ValidatorSet>, percent: u8) -> Self {
        let total = u128::from(validators.total_weight());
        let weight = (total * u128::from(percent.min(100)) + 99) / 100;
        let weight = u64::try_from(weight).unwrap_or(u64::MAX);
        Self::new(validators, weight)
    }

    pub fn from_config(validators: Arc<ValidatorSet>, config: &StartupConfig) -> Self {
        match config.weight {
            Some(weight) => Self::new(validators, weight),
            None => Self::with_percent(validators, config.weight_percent),
        }
    }

    pub fn connected(&mut self, node_id: NodeId) {
        if self.connected.contains_key(&node_id) {
            return;
        }
        let weight = self.validators.weight(&node_id);
        self.connected.insert(node_id, weight);
        self.connected_weight = self.connected_weight.saturating_add(weight);
        debug!(%node_id, weight, connected_weight = self.connected_weight, "peer connected");
        self.check();
    }

    pub fn disconnected(&mut self, node_id: &NodeId) {
        if let Some(weight) = self.connected.remove(node_id) {
            self.connected_weight = self.connected_weight.saturating_sub(weight);
            debug!(%node_id, connected_weight = self.connected_weight, "peer disconnected");
        }
    }

    /// Accounts for a connected peer that became a validator.
    pub fn on_validator_added(&mut self, node_id: &NodeId, weight: u64) {
        self.reweigh(node_id, weight);
    }

    pub fn on_validator_removed(&mut self, node_id: &NodeId) {
        self.reweigh(node_id, 0);
    }

    pub fn on_validator_weight_changed(&mut self, node_id: &NodeId, new_weight: u64) {
        self.reweigh(node_id, new_weight);
    }

    /// True once enough stake has been connected at some point.
    #[must_use]
    pub fn should_start(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn connected_weight(&self) -> u64 {
        self.connected_weight
    }

    #[must_use]
    pub fn start_weight(&self) -> u64 {
        self.start_weight
    }

    fn reweigh(&mut self, node_id: &NodeId, weight: u64) {
        let Some(counted) = self.connected.get_mut(node_id) else {
            return;
        };
        self.connected_weight = self
            .connected_weight
            .saturating_sub(*counted)
            .saturating_add(weight);
        *counted = weight;
        self.check();
    }

    fn check(&mut self) {
        if !self.started && self.connected_weight >= self.start_weight {
            self.started = true;
            info!(
                connected_weight = self.connected_weight,
                start_weight = self.start_weight,
                "enough stake connected to start"
            );
        }
    }
}
