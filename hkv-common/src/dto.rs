//! # Wire DTOs
//!
//! Typed request/response bodies for the HTTP surface (spec.md §6). Kept as
//! small, schema-fixed structs rather than generic JSON maps, except for the
//! stats payloads which are genuinely open-ended per-node/per-cluster blobs.

use serde::{Deserialize, Serialize};

/// `PUT /api/v1/cache/{key}` and `PUT /internal/cache/{key}` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRequest {
    pub value: String,
    /// Optional TTL in seconds. Absent means no expiry.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

/// Response body shared by `PUT`/`GET` cache endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheResponse {
    pub key: String,
    pub value: Option<String>,
    pub found: bool,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `DELETE /api/v1/cache/{key}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
    pub node_id: String,
}

/// `GET /api/v1/stats` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub node_id: String,
    pub cache_stats: CacheStats,
    pub cluster_stats: serde_json::Value,
    pub timestamp: String,
}

/// Cache-level counters, shared by the stats endpoint and internal metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

/// `GET /api/v1/health` and `GET /internal/cluster/health` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub timestamp: String,
}

/// `POST /internal/cluster/sync-add` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAddRequest {
    pub node_id: String,
    pub address: String,
    pub operation: String,
}

/// `POST /internal/cluster/sync-remove` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRemoveRequest {
    pub node_id: String,
    pub operation: String,
}

/// Response shared by both sync-add and sync-remove.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub message: String,
    pub node_id: String,
}

/// `GET /admin/cluster` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfoResponse {
    pub node_id: String,
    pub nodes: std::collections::BTreeMap<String, String>,
    pub virtual_nodes: u32,
    pub ring_size: usize,
}

/// `GET /admin/metrics` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub node_id: String,
    pub requests_total: u64,
    pub errors_total: u64,
    pub inflight: u64,
    pub migration: MigrationStats,
}

/// Migration accounting counters (spec.md §3), monotonic for the process
/// lifetime.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MigrationStats {
    pub keys_migrated_total: u64,
    pub duration_ms_total: u64,
    pub last_migration_at: Option<u64>,
}
