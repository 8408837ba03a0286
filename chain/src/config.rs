//! Top-level configuration for an agent node.
//!
//! This module aggregates configuration for:
//!
//! - the agent itself (addresses, scheduling, experiment duration),
//! - storage (RocksDB path and creation flags),
//! - the metrics exporter (enable flag + listen address).
//!
//! The goal is to have a single `NodeConfig` struct that the node binary
//! can construct from defaults and environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::storage::RocksDbConfig;

/// Configuration of the agent's behavior and scheduling.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Address the agent's message listener binds to; also its reply
    /// address on the wire.
    pub listen_addr: SocketAddr,
    /// Address of the directory service.
    pub directory_addr: String,
    /// Behavior label published to the directory.
    pub agent_type: String,
    /// Delay before the agent asks the directory for peers.
    pub startup_delay: Duration,
    /// Additional delay after `startup_delay` before stepping begins.
    pub step_start_delay: Duration,
    /// Interval between scheduler ticks.
    pub step_interval: Duration,
    /// Time after which an open exchange slot is dropped.
    pub request_ttl: Duration,
    /// Total experiment duration; the agent unregisters and stops after
    /// this much time.
    pub duration: Duration,
    /// Directory for the shutdown data dump.
    pub data_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let step_interval = Duration::from_secs(1);
        Self {
            // Safe to unwrap: this is a fixed, valid address literal.
            listen_addr: "127.0.0.1:9100"
                .parse()
                .expect("hard-coded agent listen address should parse"),
            directory_addr: "127.0.0.1:9000".to_string(),
            agent_type: "protect".to_string(),
            startup_delay: Duration::from_secs(2),
            step_start_delay: Duration::from_secs(5),
            step_interval,
            request_ttl: step_interval * 10,
            duration: Duration::from_secs(60),
            data_dir: "data".to_string(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for an agent node.
#[derive(Clone, Debug, Default)]
pub struct NodeConfig {
    pub agent: AgentConfig,
    pub storage: RocksDbConfig,
    pub metrics: MetricsConfig,
}

impl NodeConfig {
    /// Builds a configuration from defaults plus `TRUSTCHAIN_*`
    /// environment overrides.
    ///
    /// Recognized variables: `TRUSTCHAIN_LISTEN`, `TRUSTCHAIN_DIRECTORY`,
    /// `TRUSTCHAIN_AGENT_TYPE`, `TRUSTCHAIN_DURATION_SECS`,
    /// `TRUSTCHAIN_DB_PATH`, `TRUSTCHAIN_DATA_DIR`,
    /// `TRUSTCHAIN_METRICS_ADDR`, `TRUSTCHAIN_METRICS_ENABLED`.
    /// Unparsable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(value) = std::env::var("TRUSTCHAIN_LISTEN") {
            match value.parse() {
                Ok(addr) => cfg.agent.listen_addr = addr,
                Err(e) => tracing::warn!("ignoring TRUSTCHAIN_LISTEN={value}: {e}"),
            }
        }
        if let Ok(value) = std::env::var("TRUSTCHAIN_DIRECTORY") {
            cfg.agent.directory_addr = value;
        }
        if let Ok(value) = std::env::var("TRUSTCHAIN_AGENT_TYPE") {
            cfg.agent.agent_type = value;
        }
        if let Ok(value) = std::env::var("TRUSTCHAIN_DURATION_SECS") {
            match value.parse::<u64>() {
                Ok(secs) => cfg.agent.duration = Duration::from_secs(secs),
                Err(e) => tracing::warn!("ignoring TRUSTCHAIN_DURATION_SECS={value}: {e}"),
            }
        }
        if let Ok(value) = std::env::var("TRUSTCHAIN_DB_PATH") {
            cfg.storage.path = value;
        }
        if let Ok(value) = std::env::var("TRUSTCHAIN_DATA_DIR") {
            cfg.agent.data_dir = value;
        }
        if let Ok(value) = std::env::var("TRUSTCHAIN_METRICS_ADDR") {
            match value.parse() {
                Ok(addr) => cfg.metrics.listen_addr = addr,
                Err(e) => tracing::warn!("ignoring TRUSTCHAIN_METRICS_ADDR={value}: {e}"),
            }
        }
        if let Ok(value) = std::env::var("TRUSTCHAIN_METRICS_ENABLED") {
            cfg.metrics.enabled = value != "0" && !value.eq_ignore_ascii_case("false");
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.agent.step_interval, Duration::from_secs(1));
        assert_eq!(cfg.agent.request_ttl, cfg.agent.step_interval * 10);
        assert!(cfg.metrics.enabled);
    }
}
