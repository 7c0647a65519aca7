//! # Cluster Coordinator (C4)
//!
//! Topology-change protocol (spec.md §4.4): update the local ring and
//! cluster map, migrate the keys whose ownership changed, then (for the
//! triggering node) broadcast the change to every other known peer so each
//! applies the identical update. Grounded on `jizhuozhi-hermes`'s
//! cluster/upstream split for "snapshot under lock, then do I/O without
//! holding it", generalized from its load-balancer bookkeeping to this
//! crate's migrate-then-broadcast flow.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use hkv_common::dto::{SetRequest, SyncAddRequest, SyncRemoveRequest};
use hkv_common::{HkvError, HkvResult, NodeId};
use hkv_engine::KVEngine;

use crate::state::NodeState;

/// Outcome of one migration round, folded into the process-lifetime
/// migration counters on return.
#[derive(Debug, Default, Clone, Copy)]
pub struct MigrationOutcome {
    pub keys_migrated: u64,
}

fn now_unix_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Walks every key resident in this node's local C1 and, for each whose
/// owner under the *current* ring is no longer this node, pushes it to the
/// new owner and deletes it locally on success (spec.md §4.4 steps 3-4,
/// generalized to cover both add and remove — the predicate "new owner !=
/// self" is symmetric for both directions, so one function serves both).
async fn migrate_local_entries(state: &Arc<NodeState>) -> MigrationOutcome {
    let entries = state.engine.all_entries();
    let mut migrated = 0u64;

    for (key, value, remaining_ttl) in entries {
        let new_owner = match state.ring.lookup(&key) {
            Some(owner) => owner,
            None => continue,
        };
        if new_owner == state.node_id {
            continue;
        }

        let address = match state.peer_address(&new_owner) {
            Some(address) => address,
            None => {
                warn!(node = %new_owner, "migration: no address for new owner, key left in place");
                continue;
            }
        };

        let key_str = String::from_utf8_lossy(&key).into_owned();
        let value_str = String::from_utf8_lossy(&value).into_owned();
        let url = format!("http://{address}/internal/cache/{key_str}");
        let body = SetRequest { value: value_str, ttl_secs: remaining_ttl.map(|ttl| ttl.as_secs()) };

        let result = state
            .http
            .put(&url)
            .timeout(state.migration_timeout)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                state.engine.delete(&key);
                migrated += 1;
            }
            Ok(resp) => {
                warn!(key = %key_str, status = %resp.status(), "migration: peer rejected key, left in place");
            }
            Err(err) => {
                warn!(key = %key_str, peer = %address, error = %err, "migration: peer unreachable, key left in place");
            }
        }
    }

    MigrationOutcome { keys_migrated: migrated }
}

async fn broadcast_sync_add(state: &Arc<NodeState>, node_id: &NodeId, address: &str) {
    let targets = state.cluster_snapshot();
    let body = SyncAddRequest {
        node_id: node_id.to_string(),
        address: address.to_string(),
        operation: "add".to_string(),
    };

    for (peer_id, peer_address) in targets {
        if peer_id == state.node_id {
            continue;
        }
        let url = format!("http://{peer_address}/internal/cluster/sync-add");
        match state.http.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(peer = %peer_id, "sync-add delivered");
            }
            Ok(resp) => warn!(peer = %peer_id, status = %resp.status(), "sync-add: peer returned error, proceeding"),
            Err(err) => warn!(peer = %peer_id, error = %err, "sync-add: peer unreachable, proceeding"),
        }
    }
}

async fn broadcast_sync_remove(state: &Arc<NodeState>, node_id: &NodeId) {
    let targets = state.cluster_snapshot();
    let body = SyncRemoveRequest { node_id: node_id.to_string(), operation: "remove".to_string() };

    for (peer_id, peer_address) in targets {
        if peer_id == state.node_id {
            continue;
        }
        let url = format!("http://{peer_address}/internal/cluster/sync-remove");
        match state.http.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(peer = %peer_id, "sync-remove delivered");
            }
            Ok(resp) => warn!(peer = %peer_id, status = %resp.status(), "sync-remove: peer returned error, proceeding"),
            Err(err) => warn!(peer = %peer_id, error = %err, "sync-remove: peer unreachable, proceeding"),
        }
    }
}

fn record_migration(state: &Arc<NodeState>, outcome: MigrationOutcome, started: Instant) {
    state.metrics.record_migration(outcome.keys_migrated, started.elapsed(), now_unix_secs());
}

/// Triggers an add, broadcasting to every other known peer. This is the path
/// driven by an operator action on this node (spec.md §4.4 steps 1-5).
pub async fn add_node(state: &Arc<NodeState>, node_id: NodeId, address: String) -> HkvResult<MigrationOutcome> {
    let _guard = state.coordinator_lock.lock().await;
    let started = Instant::now();

    state.ring.add_node(node_id.clone());
    state.cluster_map.write().insert(node_id.clone(), address.clone());

    let outcome = migrate_local_entries(state).await;
    record_migration(state, outcome, started);

    broadcast_sync_add(state, &node_id, &address).await;

    info!(node = %node_id, migrated = outcome.keys_migrated, "add_node complete");
    Ok(outcome)
}

/// Applies an add received via `POST /internal/cluster/sync-add` (spec.md
/// §4.4 step 6). No further broadcast — the initiating node already fanned
/// out to every peer, including this one.
pub async fn apply_sync_add(state: &Arc<NodeState>, node_id: NodeId, address: String) -> HkvResult<MigrationOutcome> {
    let _guard = state.coordinator_lock.lock().await;
    let started = Instant::now();

    state.ring.add_node(node_id.clone());
    state.cluster_map.write().insert(node_id, address);

    let outcome = migrate_local_entries(state).await;
    record_migration(state, outcome, started);
    Ok(outcome)
}

pub async fn remove_node(state: &Arc<NodeState>, node_id: NodeId) -> HkvResult<MigrationOutcome> {
    let _guard = state.coordinator_lock.lock().await;
    let started = Instant::now();

    if node_id == state.node_id {
        return Err(HkvError::Validation("cannot remove the local node from itself".into()));
    }

    state.ring.remove_node(&node_id);
    state.cluster_map.write().remove(&node_id);

    let outcome = migrate_local_entries(state).await;
    record_migration(state, outcome, started);

    broadcast_sync_remove(state, &node_id).await;

    info!(node = %node_id, migrated = outcome.keys_migrated, "remove_node complete");
    Ok(outcome)
}

pub async fn apply_sync_remove(state: &Arc<NodeState>, node_id: NodeId) -> HkvResult<MigrationOutcome> {
    let _guard = state.coordinator_lock.lock().await;
    let started = Instant::now();

    state.ring.remove_node(&node_id);
    state.cluster_map.write().remove(&node_id);

    let outcome = migrate_local_entries(state).await;
    record_migration(state, outcome, started);
    Ok(outcome)
}

/// Rebalance is a documented stub per spec.md §4.4's admin endpoint table —
/// weighted rebalancing is an explicit Non-goal (spec.md §1).
pub fn rebalance_stub() -> &'static str {
    "rebalance is not implemented: weighted rebalancing is out of scope"
}
