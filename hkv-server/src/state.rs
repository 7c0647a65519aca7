//! # Shared Node State
//!
//! The process-wide state every HTTP handler closes over: the local cache
//! engine (C1), the consistent hash ring (C2), and the cluster map, plus the
//! ambient pieces (metrics, the forwarding HTTP client, config). Grounded on
//! `jizhuozhi-hermes`'s `server::state::GatewayState` — a plain `Arc`-cloned
//! struct passed into every `service_fn`, rather than a global.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use hkv_common::{HkvError, NodeConfig, NodeId};
use hkv_engine::{ExpirationHandle, MemoryEngine};
use hkv_ring::Ring;

use crate::metrics::Metrics;

/// Cluster Map (spec.md §3): nodeID -> address, held under the Node Core's
/// own lock, separate from the ring's internal lock (spec.md §4.3 "two lock
/// domains").
pub type ClusterMap = RwLock<BTreeMap<NodeId, String>>;

pub struct NodeState {
    pub node_id: NodeId,
    pub address: String,
    pub engine: Arc<MemoryEngine>,
    pub ring: Arc<Ring>,
    pub cluster_map: ClusterMap,
    /// Serialises topology operations on this node (spec.md §4.4 "coordinator
    /// lock"). A `tokio::sync::Mutex` because the critical section spans
    /// `.await` points (migration PUTs, broadcasts).
    pub coordinator_lock: tokio::sync::Mutex<()>,
    pub http: reqwest::Client,
    pub metrics: Metrics,
    pub migration_timeout: Duration,
    pub health_check_timeout: Duration,
    pub expiration: ExpirationHandle,
    /// Virtual nodes contributed per physical node, echoed by `GET
    /// /admin/cluster` (spec.md §6).
    pub virtual_nodes: u32,
}

impl NodeState {
    pub fn new(config: &NodeConfig) -> Result<Arc<Self>, HkvError> {
        let node_id = NodeId::new(config.node_id.clone());
        let engine = Arc::new(MemoryEngine::with_byte_budget(config.cache_size, config.byte_budget));
        let expiration = engine.start_expirer(Duration::from_millis(config.sweep_interval_ms));

        let ring = Arc::new(Ring::new(config.virtual_nodes));
        let mut cluster_map = BTreeMap::new();
        for (id, addr) in &config.cluster_nodes {
            let id = NodeId::new(id.clone());
            ring.add_node(id.clone());
            cluster_map.insert(id, addr.clone());
        }

        let forward_timeout = Duration::from_millis(config.health_check_timeout_ms);
        let http = reqwest::Client::builder()
            .timeout(forward_timeout)
            .build()
            .map_err(|err| HkvError::ConfigInvalid(format!("failed to build http client: {err}")))?;

        Ok(Arc::new(NodeState {
            node_id,
            address: config.address.clone(),
            engine,
            ring,
            cluster_map: RwLock::new(cluster_map),
            coordinator_lock: tokio::sync::Mutex::new(()),
            http,
            metrics: Metrics::new(),
            migration_timeout: Duration::from_millis(config.migration_timeout_ms),
            health_check_timeout: Duration::from_millis(config.health_check_timeout_ms),
            expiration,
            virtual_nodes: config.virtual_nodes,
        }))
    }

    /// Copies out the address for a node under the cluster map's read lock,
    /// releasing the lock before the caller makes any network call (spec.md
    /// §4.3 locking discipline / §9 "copy-out under lock").
    pub fn peer_address(&self, node: &NodeId) -> Option<String> {
        self.cluster_map.read().get(node).cloned()
    }

    pub fn cluster_snapshot(&self) -> BTreeMap<NodeId, String> {
        self.cluster_map.read().clone()
    }
}
