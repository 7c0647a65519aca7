//! # HTTP Surface (C4)
//!
//! Routes the three documented endpoint groups (spec.md §6): the Client API
//! (`/api/v1/...`, routed through Node Core), the Internal API
//! (`/internal/...`, local-only plus topology sync), and the Admin API
//! (`/admin/...`). Grounded on `jizhuozhi-hermes/gateway/src/server/mod.rs`'s
//! raw hyper + `service_fn` dispatch (no axum in the teacher's stack) and its
//! `admin.rs`'s manual path-match handler shape.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use hkv_common::dto::{
    CacheResponse, ClusterInfoResponse, DeleteResponse, HealthResponse, MetricsResponse, StatsResponse,
    SyncAddRequest, SyncRemoveRequest,
};
use hkv_common::{ErrorEnvelope, HkvError, NodeId};
use hkv_engine::KVEngine;

use crate::coordinator;
use crate::routing;
use crate::state::NodeState;

type Body = BoxBody<Bytes, hyper::Error>;

fn full_body(data: impl Into<Bytes>) -> Body {
    Full::new(data.into()).map_err(|never| match never {}).boxed()
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    let bytes = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(bytes))
        .expect("response builder never fails for a fixed-shape response")
}

fn error_response(status: StatusCode, err: &HkvError) -> Response<Body> {
    json_response(status, &ErrorEnvelope::from(err))
}

fn status_for(err: &HkvError) -> StatusCode {
    match err {
        HkvError::Validation(_) => StatusCode::BAD_REQUEST,
        HkvError::ConfigInvalid(_) => StatusCode::BAD_REQUEST,
        HkvError::PeerUnreachable(_) | HkvError::PeerReturnedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        HkvError::RingInconsistent(_) => StatusCode::SERVICE_UNAVAILABLE,
        HkvError::CapacityInvalid | HkvError::EntryTooLarge => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, HkvError> {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|err| HkvError::Validation(format!("failed to read body: {err}")))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|err| HkvError::Validation(format!("invalid JSON body: {err}")))
}

/// Top-level request dispatch, the single `service_fn` closure installed for
/// every accepted connection (spec.md §4.4 "Three HTTP endpoint groups").
pub async fn route(req: Request<Incoming>, state: Arc<NodeState>) -> Result<Response<Body>, Infallible> {
    let start = Instant::now();
    state.metrics.record_request_start();

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let response = dispatch(method, &segments, req, &state).await;

    let (response, is_error) = match response {
        Ok(resp) => {
            let is_error = resp.status().is_client_error() || resp.status().is_server_error();
            (resp, is_error)
        }
        Err(err) => (error_response(status_for(&err), &err), true),
    };

    if is_error {
        state.metrics.record_error();
    }
    state.metrics.record_request_end(start.elapsed());

    Ok(response)
}

async fn dispatch(
    method: Method,
    segments: &[&str],
    req: Request<Incoming>,
    state: &Arc<NodeState>,
) -> Result<Response<Body>, HkvError> {
    match segments {
        ["api", "v1", "cache", key] => client_cache(method, key, req, state).await,
        ["api", "v1", "stats"] => client_stats(state).await,
        ["api", "v1", "health"] => Ok(client_health(state)),
        ["internal", "cache", key] => internal_cache(method, key, req, state).await,
        ["internal", "cluster", "sync-add"] => internal_sync_add(req, state).await,
        ["internal", "cluster", "sync-remove"] => internal_sync_remove(req, state).await,
        ["internal", "cluster", "health"] => Ok(client_health(state)),
        ["admin", "cluster"] => Ok(admin_cluster(state)),
        ["admin", "nodes"] => Ok(admin_nodes(state)),
        ["admin", "metrics"] => Ok(admin_metrics(state)),
        ["admin", "cluster", "rebalance"] => Ok(admin_rebalance()),
        _ => Ok(json_response(
            StatusCode::NOT_FOUND,
            &ErrorEnvelope::new("not_found", "no such route"),
        )),
    }
}

async fn client_cache(
    method: Method,
    key: &str,
    req: Request<Incoming>,
    state: &Arc<NodeState>,
) -> Result<Response<Body>, HkvError> {
    let key_bytes = key.as_bytes();

    match method {
        Method::PUT => {
            let body: hkv_common::dto::SetRequest = read_json(req).await?;
            let ttl = body.ttl_secs.map(Duration::from_secs);
            let routed = routing::set(state, key_bytes, body.value.clone(), ttl).await?;
            Ok(json_response(
                StatusCode::OK,
                &CacheResponse {
                    key: key.to_string(),
                    value: Some(body.value),
                    found: true,
                    node_id: routed.owner.to_string(),
                    message: Some("success".to_string()),
                },
            ))
        }
        Method::GET => {
            let routed = routing::get(state, key_bytes).await?;
            let found = routed.outcome.is_some();
            Ok(json_response(
                StatusCode::OK,
                &CacheResponse {
                    key: key.to_string(),
                    value: routed.outcome,
                    found,
                    node_id: routed.owner.to_string(),
                    message: None,
                },
            ))
        }
        Method::DELETE => {
            let routed = routing::delete(state, key_bytes).await?;
            Ok(json_response(
                StatusCode::OK,
                &DeleteResponse {
                    message: "deleted".to_string(),
                    key: key.to_string(),
                    node_id: routed.owner.to_string(),
                },
            ))
        }
        _ => Ok(json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorEnvelope::new("invalid_request", "method not allowed"),
        )),
    }
}

async fn internal_cache(
    method: Method,
    key: &str,
    req: Request<Incoming>,
    state: &Arc<NodeState>,
) -> Result<Response<Body>, HkvError> {
    let key_bytes = key.as_bytes();

    match method {
        Method::PUT => {
            let body: hkv_common::dto::SetRequest = read_json(req).await?;
            let ttl = body.ttl_secs.map(Duration::from_secs);
            routing::set_local(state, key_bytes, body.value.clone(), ttl);
            Ok(json_response(
                StatusCode::OK,
                &CacheResponse {
                    key: key.to_string(),
                    value: Some(body.value),
                    found: true,
                    node_id: state.node_id.to_string(),
                    message: Some("success".to_string()),
                },
            ))
        }
        Method::GET => {
            let value = routing::get_local(state, key_bytes);
            let found = value.is_some();
            Ok(json_response(
                StatusCode::OK,
                &CacheResponse {
                    key: key.to_string(),
                    value,
                    found,
                    node_id: state.node_id.to_string(),
                    message: None,
                },
            ))
        }
        Method::DELETE => {
            routing::delete_local(state, key_bytes);
            Ok(json_response(
                StatusCode::OK,
                &DeleteResponse {
                    message: "deleted".to_string(),
                    key: key.to_string(),
                    node_id: state.node_id.to_string(),
                },
            ))
        }
        _ => Ok(json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorEnvelope::new("invalid_request", "method not allowed"),
        )),
    }
}

async fn internal_sync_add(req: Request<Incoming>, state: &Arc<NodeState>) -> Result<Response<Body>, HkvError> {
    let body: SyncAddRequest = read_json(req).await?;
    let node_id = NodeId::new(body.node_id.clone());

    match coordinator::apply_sync_add(state, node_id.clone(), body.address).await {
        Ok(_) => Ok(json_response(
            StatusCode::OK,
            &hkv_common::dto::SyncResponse {
                message: "synced".to_string(),
                node_id: node_id.to_string(),
            },
        )),
        Err(err) => {
            error!(error = %err, "sync-add failed");
            Err(err)
        }
    }
}

async fn internal_sync_remove(req: Request<Incoming>, state: &Arc<NodeState>) -> Result<Response<Body>, HkvError> {
    let body: SyncRemoveRequest = read_json(req).await?;
    let node_id = NodeId::new(body.node_id.clone());

    match coordinator::apply_sync_remove(state, node_id.clone()).await {
        Ok(_) => Ok(json_response(
            StatusCode::OK,
            &hkv_common::dto::SyncResponse {
                message: "synced".to_string(),
                node_id: node_id.to_string(),
            },
        )),
        Err(err) => {
            error!(error = %err, "sync-remove failed");
            Err(err)
        }
    }
}

async fn client_stats(state: &Arc<NodeState>) -> Result<Response<Body>, HkvError> {
    let cache_stats = state.engine.stats();
    let cluster_stats = serde_json::json!({
        "node_count": state.ring.nodes().len(),
        "vnode_count": state.ring.vnode_count(),
    });

    Ok(json_response(
        StatusCode::OK,
        &StatsResponse {
            node_id: state.node_id.to_string(),
            cache_stats: hkv_common::dto::CacheStats {
                hits: cache_stats.hits,
                misses: cache_stats.misses,
                size: cache_stats.size,
            },
            cluster_stats,
            timestamp: hkv_common::rfc3339_now(),
        },
    ))
}

fn client_health(state: &Arc<NodeState>) -> Response<Body> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "healthy".to_string(),
            node_id: state.node_id.to_string(),
            timestamp: hkv_common::rfc3339_now(),
        },
    )
}

fn admin_cluster(state: &Arc<NodeState>) -> Response<Body> {
    let nodes: std::collections::BTreeMap<String, String> =
        state.cluster_snapshot().into_iter().map(|(id, addr)| (id.to_string(), addr)).collect();

    json_response(
        StatusCode::OK,
        &ClusterInfoResponse {
            node_id: state.node_id.to_string(),
            ring_size: state.ring.vnode_count(),
            virtual_nodes: state.virtual_nodes,
            nodes,
        },
    )
}

fn admin_nodes(state: &Arc<NodeState>) -> Response<Body> {
    let nodes: Vec<String> = state.ring.nodes().into_iter().map(|n| n.to_string()).collect();
    json_response(StatusCode::OK, &serde_json::json!({ "nodes": nodes }))
}

fn admin_metrics(state: &Arc<NodeState>) -> Response<Body> {
    let snapshot = state.metrics.snapshot();
    json_response(
        StatusCode::OK,
        &MetricsResponse {
            node_id: state.node_id.to_string(),
            requests_total: snapshot.requests_total,
            errors_total: snapshot.errors_total,
            inflight: snapshot.inflight,
            migration: state.metrics.migration_snapshot(),
        },
    )
}

fn admin_rebalance() -> Response<Body> {
    warn!("admin: rebalance requested, but rebalancing is out of scope");
    json_response(
        StatusCode::NOT_IMPLEMENTED,
        &ErrorEnvelope::new("not_implemented", coordinator::rebalance_stub()),
    )
}
