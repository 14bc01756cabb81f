//! Chain engine configuration.
//!
//! Loaded from a TOML file. Every section and field has a default, so a
//! file only needs the values it overrides:
//!
//! ```toml
//! [bootstrap]
//! frontier_alpha = 3
//! frontier_sample_size = 5
//!
//! [startup]
//! weight_percent = 75
//!
//! [logging]
//! level = "debug"
//! ```

use std::path::Path;

use avalanche_ids::Id;
use avalanche_utils::LogConfig;
use serde::{Deserialize, Serialize};

use crate::{ConsensusError, Result};

/// Top-level configuration of a chain's engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bootstrap: BootstrapConfig,
    pub startup: StartupConfig,
    pub poll: PollConfig,
    pub logging: LogConfig,
}

impl Config {
    /// Reads, parses and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bootstrap.validate()?;
        self.startup.validate()?;
        self.poll.validate()
    }
}

/// Bootstrapper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of beacons asked for their accepted frontier.
    pub frontier_sample_size: usize,
    /// Number of beacons that must report a vertex for it to become the
    /// stop vertex. Capped at a majority of the beacons actually sampled.
    pub frontier_alpha: usize,
    /// Frontier queries retried before giving up.
    pub max_frontier_retries: usize,
    /// Maximum `GetAncestors` requests in flight.
    pub max_outstanding_requests: usize,
    /// Containers considered from one `Ancestors` response.
    pub ancestors_max_containers_received: usize,
    /// Containers put in one `Ancestors` reply.
    pub ancestors_max_containers_sent: usize,
    /// Byte budget of one `Ancestors` reply.
    pub max_container_bytes: usize,
    /// Times the fetch phase restarts before bootstrap fails.
    pub max_bootstrap_restarts: usize,
    /// Vertices remembered as processed.
    pub processed_cache_size: usize,
    /// Fixed stop vertex. When unset it is agreed on with the beacons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_vertex_id: Option<Id>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            frontier_sample_size: 20,
            frontier_alpha: 14,
            max_frontier_retries: 3,
            max_outstanding_requests: 10,
            ancestors_max_containers_received: 2000,
            ancestors_max_containers_sent: 2000,
            max_container_bytes: 2 * 1024 * 1024 * 4 / 5,
            max_bootstrap_restarts: 50,
            processed_cache_size: 100_000,
            stop_vertex_id: None,
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frontier_sample_size == 0 {
            return Err(invalid("bootstrap.frontier_sample_size must be positive"));
        }
        if self.frontier_alpha == 0 || self.frontier_alpha > self.frontier_sample_size {
            return Err(invalid(
                "bootstrap.frontier_alpha must be in 1..=frontier_sample_size",
            ));
        }
        if self.max_outstanding_requests == 0 {
            return Err(invalid("bootstrap.max_outstanding_requests must be positive"));
        }
        if self.ancestors_max_containers_received == 0 || self.ancestors_max_containers_sent == 0
        {
            return Err(invalid("bootstrap ancestors container limits must be positive"));
        }
        if self.max_container_bytes == 0 {
            return Err(invalid("bootstrap.max_container_bytes must be positive"));
        }
        if self.processed_cache_size == 0 {
            return Err(invalid("bootstrap.processed_cache_size must be positive"));
        }
        Ok(())
    }
}

/// Startup gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Absolute stake to wait for. Overrides `weight_percent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u64>,
    /// Share of total stake to wait for, in percent, rounded up.
    pub weight_percent: u8,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            weight: None,
            weight_percent: 51,
        }
    }
}

impl StartupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.weight_percent > 100 {
            return Err(invalid("startup.weight_percent must be at most 100"));
        }
        Ok(())
    }
}

/// Polling configuration for normal operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Validators sampled per query.
    pub sample_size: usize,
    /// Capacity of the handler's inbound channel.
    pub inbox_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            sample_size: 20,
            inbox_capacity: 1024,
        }
    }
}

impl PollConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_size == 0 {
            return Err(invalid("poll.sample_size must be positive"));
        }
        if self.inbox_capacity == 0 {
            return Err(invalid("poll.inbox_capacity must be positive"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> ConsensusError {
    ConsensusError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use avalanche_utils::LogLevel;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [bootstrap]
            frontier_sample_size = 5
            frontier_alpha = 3

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.bootstrap.frontier_alpha, 3);
        assert_eq!(config.bootstrap.max_outstanding_requests, 10);
        assert_eq!(config.startup, StartupConfig::default());
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.json);
    }

    #[test]
    fn test_load_from_file() {
        let stop = Id::from_hash(b"stop");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[bootstrap]\nstop_vertex_id = \"{stop}\"\n\n[startup]\nweight = 1000\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.bootstrap.stop_vertex_id, Some(stop));
        assert_eq!(config.startup.weight, Some(1000));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = Config::default();
        config.bootstrap.stop_vertex_id = Some(Id::from_hash(b"stop"));
        let rendered = toml::to_string(&config).unwrap();
        assert_eq!(Config::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn test_validation_errors() {
        let result = Config::from_toml("[bootstrap]\nfrontier_alpha = 21\n");
        assert!(matches!(result, Err(ConsensusError::InvalidConfig(_))));

        let result = Config::from_toml("[startup]\nweight_percent = 101\n");
        assert!(matches!(result, Err(ConsensusError::InvalidConfig(_))));

        let result = Config::from_toml("[poll]\nsample_size = 0\n");
        assert!(matches!(result, Err(ConsensusError::InvalidConfig(_))));

        assert!(matches!(
            Config::from_toml("[bootstrap]\nfrontier_alpha = \"many\"\n"),
            Err(ConsensusError::Toml(_))
        ));
        assert!(matches!(
            Config::load("/nonexistent/avalanche-snow.toml"),
            Err(ConsensusError::Io(_))
        ));
    }
}
