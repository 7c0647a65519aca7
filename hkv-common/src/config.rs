//! # Node Configuration
//!
//! Schema for the per-node TOML config file (spec.md §6). Defaults are
//! expressed through field *absence*, never through a sentinel value — the
//! spec's flagged Open Question is that conflating "unset" with "false" (or
//! zero) silently re-enables a feature the caller explicitly disabled. Every
//! `Option<T>` here distinguishes "not written" from "written as the zero
//! value", and every `serde(default = ...)` only fires when the key is
//! missing from the file entirely.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HkvError, HkvResult};

fn default_cache_size() -> usize {
    1000
}

fn default_virtual_nodes() -> u32 {
    150
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_migration_timeout_ms() -> u64 {
    10_000
}

fn default_health_check_timeout_ms() -> u64 {
    3_000
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Per-node configuration, loaded from a TOML file at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's stable identifier.
    pub node_id: String,
    /// "host:port" for this node's HTTP listener.
    pub address: String,
    /// nodeID -> address for every node in the cluster, including this one.
    pub cluster_nodes: BTreeMap<String, String>,
    /// Maximum resident entries in the local cache.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Optional byte budget for the local cache. Absent means unlimited.
    #[serde(default)]
    pub byte_budget: Option<usize>,
    /// Virtual nodes contributed per physical node to the hash ring.
    #[serde(default = "default_virtual_nodes")]
    pub virtual_nodes: u32,
    /// How often the background TTL sweeper runs.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Timeout for migration PUTs issued during a topology change.
    #[serde(default = "default_migration_timeout_ms")]
    pub migration_timeout_ms: u64,
    /// Timeout for client-side and coordinator health probes.
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,
    /// `"json"` for machine-readable logs, `"pretty"` for human-readable.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl NodeConfig {
    /// Loads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> HkvResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            HkvError::ConfigInvalid(format!("cannot read {}: {err}", path.as_ref().display()))
        })?;
        let config: NodeConfig = toml::from_str(&raw)
            .map_err(|err| HkvError::ConfigInvalid(format!("invalid config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> HkvResult<()> {
        if self.node_id.is_empty() {
            return Err(HkvError::ConfigInvalid("node_id must be non-empty".into()));
        }
        if self.address.is_empty() {
            return Err(HkvError::ConfigInvalid("address must be non-empty".into()));
        }
        if !self.cluster_nodes.contains_key(&self.node_id) {
            return Err(HkvError::ConfigInvalid(
                "cluster_nodes must include this node's own id".into(),
            ));
        }
        if self.cache_size == 0 {
            return Err(HkvError::ConfigInvalid("cache_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
        node_id = "N1"
        address = "127.0.0.1:8001"

        [cluster_nodes]
        N1 = "127.0.0.1:8001"
        N2 = "127.0.0.1:8002"
        "#
    }

    #[test]
    fn defaults_apply_only_when_key_absent() {
        let config: NodeConfig = toml::from_str(sample_toml()).unwrap();
        assert_eq!(config.cache_size, 1000);
        assert_eq!(config.virtual_nodes, 150);
        assert_eq!(config.byte_budget, None);
        assert_eq!(config.log_format, "pretty");
    }

    #[test]
    fn explicit_value_is_preserved() {
        let toml_str = format!("{}\ncache_size = 42\n", sample_toml());
        let config: NodeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.cache_size, 42);
    }

    #[test]
    fn rejects_missing_self_in_cluster_nodes() {
        let toml_str = r#"
        node_id = "N3"
        address = "127.0.0.1:8003"

        [cluster_nodes]
        N1 = "127.0.0.1:8001"
        "#;
        let config: NodeConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}
