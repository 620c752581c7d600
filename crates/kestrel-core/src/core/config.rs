//! Configuration for the Kestrel engine.
//!
//! Everything is sized and decided at startup; the engine reads nothing
//! from here after construction. Loaded from TOML with full defaults, so an
//! empty file (or none at all) yields a runnable two-worker engine.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONTEXT_CAPACITY, DEFAULT_KEEP_ALIVE_INTERVAL_US, DEFAULT_PREEMPTION_DELAY_NS,
    DEFAULT_REASSEMBLY_CELLS, DEFAULT_REQUEST_CAPACITY, MAX_WORKERS,
};
use crate::types::error::ConfigError;

/// Dequeue policy selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PolicyConfig {
    /// Each worker dequeues only from its own queue (default).
    CoreGranular,
    /// Dequeue from the queue furthest over its latency objective.
    ObjectiveAware {
        /// Per-queue latency objective, nanoseconds. Must match the worker
        /// roster in length.
        objectives_ns: Vec<u64>,
    },
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::CoreGranular
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Pool and arena capacities
    #[serde(default)]
    pub capacity: CapacityConfig,

    /// Ingress-side configuration
    #[serde(default)]
    pub ingress: IngressConfig,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker roster: 1-based wire identifiers, one per worker core, in
    /// physical-index order.
    #[serde(default = "default_workers")]
    pub workers: Vec<u16>,

    /// Physical core to pin the dispatcher thread to, if any.
    #[serde(default)]
    pub dispatcher_core: Option<usize>,

    /// Physical cores to pin worker threads to, one per roster entry.
    /// Unset leaves workers unpinned.
    #[serde(default)]
    pub worker_cores: Option<Vec<usize>>,

    /// How long a dispatched task may run before its worker is signaled,
    /// nanoseconds.
    #[serde(default = "default_preemption_delay_ns")]
    pub preemption_delay_ns: u64,

    /// Dequeue policy.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Per-queue preference for reinserting preempted tasks at the head
    /// (true) or tail (false). Missing entries default to head.
    #[serde(default)]
    pub head_reinsertion: Vec<bool>,

    /// Cluster identity carried in outbound messages.
    #[serde(default)]
    pub cluster_id: u16,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            dispatcher_core: None,
            worker_cores: None,
            preemption_delay_ns: default_preemption_delay_ns(),
            policy: PolicyConfig::default(),
            head_reinsertion: Vec::new(),
            cluster_id: 0,
        }
    }
}

/// Pool and arena capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityConfig {
    /// Live request objects.
    #[serde(default = "default_requests")]
    pub requests: usize,

    /// Live execution contexts.
    #[serde(default = "default_contexts")]
    pub contexts: usize,

    /// In-flight multi-packet reassemblies.
    #[serde(default = "default_reassembly_cells")]
    pub reassembly_cells: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            contexts: default_contexts(),
            reassembly_cells: default_reassembly_cells(),
        }
    }
}

/// Ingress-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    /// Interval between keep-alive heartbeats, microseconds. Zero disables
    /// the heartbeat.
    #[serde(default = "default_keep_alive_interval_us")]
    pub keep_alive_interval_us: u64,

    /// Wire identity of the upstream scheduler the heartbeat addresses.
    #[serde(default)]
    pub parent_id: u16,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_us: default_keep_alive_interval_us(),
            parent_id: 0,
        }
    }
}

fn default_workers() -> Vec<u16> {
    vec![1, 2]
}

fn default_preemption_delay_ns() -> u64 {
    DEFAULT_PREEMPTION_DELAY_NS
}

fn default_requests() -> usize {
    DEFAULT_REQUEST_CAPACITY
}

fn default_contexts() -> usize {
    DEFAULT_CONTEXT_CAPACITY
}

fn default_reassembly_cells() -> usize {
    DEFAULT_REASSEMBLY_CELLS
}

fn default_keep_alive_interval_us() -> u64 {
    DEFAULT_KEEP_ALIVE_INTERVAL_US
}

impl Config {
    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let workers = self.scheduler.workers.len();
        if workers == 0 {
            return Err(ConfigError::Invalid("worker roster is empty".into()));
        }
        if workers > MAX_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "worker roster exceeds {MAX_WORKERS} entries"
            )));
        }
        if let Some(cores) = &self.scheduler.worker_cores {
            if cores.len() != workers {
                return Err(ConfigError::Invalid(
                    "worker_cores length does not match the roster".into(),
                ));
            }
        }
        if let PolicyConfig::ObjectiveAware { objectives_ns } = &self.scheduler.policy {
            if objectives_ns.len() != workers {
                return Err(ConfigError::Invalid(
                    "objectives_ns length does not match the roster".into(),
                ));
            }
            if objectives_ns.iter().any(|&o| o == 0) {
                return Err(ConfigError::Invalid(
                    "latency objectives must be non-zero".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a TOML file, falling back to defaults when no
/// path is given or the file cannot be used.
pub fn load_config_or_default(path: Option<&str>) -> Config {
    match path {
        Some(path) => match load_config(path) {
            Ok(config) => {
                tracing::info!(path, "loaded configuration");
                config
            }
            Err(err) => {
                tracing::warn!(path, %err, "falling back to default configuration");
                Config::default()
            }
        },
        None => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.workers, vec![1, 2]);
        assert_eq!(config.scheduler.policy, PolicyConfig::CoreGranular);
    }

    #[test]
    fn toml_round_trip_with_partial_file() {
        // Goal: absent sections and fields fill from defaults.
        let raw = r#"
            [scheduler]
            workers = [1, 2, 3]
            preemption_delay_ns = 7000

            [capacity]
            requests = 64
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.scheduler.workers.len(), 3);
        assert_eq!(config.scheduler.preemption_delay_ns, 7_000);
        assert_eq!(config.capacity.requests, 64);
        assert_eq!(config.capacity.contexts, super::default_contexts());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn mismatched_objectives_are_rejected() {
        let mut config = Config::default();
        config.scheduler.policy = PolicyConfig::ObjectiveAware {
            objectives_ns: vec![100],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_roster_is_rejected() {
        let mut config = Config::default();
        config.scheduler.workers.clear();
        assert!(config.validate().is_err());
    }
}
