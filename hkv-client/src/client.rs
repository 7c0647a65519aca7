//! # KV Client Facade
//!
//! Generalizes the teacher's single-address facade-over-pool shape
//! (`KVClient` wrapping a `ConnectionPool`) to a multi-peer HTTP pool with
//! retry-and-failover (spec.md §4.5). Every call picks a peer from the
//! [`PeerPool`], issues the HTTP request, and on a network-level failure
//! rotates to the next peer, up to `retry_count` attempts total.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use hkv_common::dto::{CacheResponse, ClusterInfoResponse, DeleteResponse, HealthResponse, StatsResponse};

use crate::health::HealthChecker;
use crate::pool::PeerPool;

/// Background health-check tuning, mirroring spec.md §4.5's "optional
/// health-check parameters".
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        HealthCheckConfig {
            interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Client construction parameters (spec.md §4.5 "Constructed with a list of
/// seed peer addresses and a configuration").
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub seeds: Vec<String>,
    pub timeout: Duration,
    pub retry_count: usize,
    pub failure_threshold: usize,
    pub health_check: Option<HealthCheckConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            seeds: Vec::new(),
            timeout: Duration::from_secs(3),
            retry_count: 3,
            failure_threshold: 2,
            health_check: Some(HealthCheckConfig::default()),
        }
    }
}

/// Errors surfaced to the application. An operation that exhausts every
/// peer returns [`ClientError::NoHealthyPeers`] or [`ClientError::AllPeersFailed`]
/// as the single aggregated error spec.md §4.5 documents.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no peers configured")]
    NoPeers,
    #[error("request to {peer} timed out")]
    Timeout { peer: String },
    #[error("peer {peer} unreachable: {source}")]
    Network { peer: String, source: reqwest::Error },
    #[error("peer {peer} returned status {status}")]
    ServerError { peer: String, status: u16 },
    #[error("malformed response from {peer}: {source}")]
    InvalidResponse { peer: String, source: reqwest::Error },
    #[error("exhausted all {attempts} attempt(s) against available peers")]
    AllPeersFailed { attempts: usize },
}

/// Async client library over the Client API (spec.md §4.5).
pub struct KVClient {
    pool: Arc<PeerPool>,
    http: reqwest::Client,
    retry_count: usize,
    checker: Option<HealthChecker>,
}

impl KVClient {
    pub fn new(config: ClientConfig) -> Self {
        let pool = Arc::new(PeerPool::new(config.seeds, config.failure_threshold));
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build http client");

        let checker = config
            .health_check
            .map(|hc| HealthChecker::spawn(Arc::clone(&pool), hc.interval, hc.probe_timeout));

        KVClient {
            pool,
            http,
            retry_count: config.retry_count.max(1),
            checker,
        }
    }

    /// Stops the background health-check task, per spec.md §4.5's documented
    /// `close` method.
    pub fn close(mut self) {
        if let Some(checker) = self.checker.take() {
            checker.stop();
        }
    }

    /// Per-peer health snapshot, keyed by peer address, for operator
    /// visibility (spec.md §8 scenario 6's `get_node_status`).
    pub fn get_node_status(&self) -> BTreeMap<String, bool> {
        self.pool.all().iter().map(|p| (p.addr.clone(), p.is_healthy())).collect()
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<CacheResponse, ClientError> {
        let body = hkv_common::dto::SetRequest { value: value.to_string(), ttl_secs: None };
        self.execute(|http, base| {
            let body = body.clone();
            let url = format!("{base}/api/v1/cache/{key}");
            async move { http.put(&url).json(&body).send().await }
        })
        .await
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<CacheResponse, ClientError> {
        let body = hkv_common::dto::SetRequest {
            value: value.to_string(),
            ttl_secs: Some(ttl.as_secs()),
        };
        self.execute(|http, base| {
            let body = body.clone();
            let url = format!("{base}/api/v1/cache/{key}");
            async move { http.put(&url).json(&body).send().await }
        })
        .await
    }

    pub async fn get(&self, key: &str) -> Result<CacheResponse, ClientError> {
        self.execute(|http, base| {
            let url = format!("{base}/api/v1/cache/{key}");
            async move { http.get(&url).send().await }
        })
        .await
    }

    pub async fn delete(&self, key: &str) -> Result<DeleteResponse, ClientError> {
        self.execute(|http, base| {
            let url = format!("{base}/api/v1/cache/{key}");
            async move { http.delete(&url).send().await }
        })
        .await
    }

    pub async fn stats(&self) -> Result<StatsResponse, ClientError> {
        self.execute(|http, base| {
            let url = format!("{base}/api/v1/stats");
            async move { http.get(&url).send().await }
        })
        .await
    }

    pub async fn cluster_info(&self) -> Result<ClusterInfoResponse, ClientError> {
        self.execute(|http, base| {
            let url = format!("{base}/admin/cluster");
            async move { http.get(&url).send().await }
        })
        .await
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.execute(|http, base| {
            let url = format!("{base}/api/v1/health");
            async move { http.get(&url).send().await }
        })
        .await
    }

    /// Batch variants iterate single operations, per spec.md §4.5.
    pub async fn set_many(&self, entries: &[(String, String)]) -> Vec<Result<CacheResponse, ClientError>> {
        let mut out = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            out.push(self.set(key, value).await);
        }
        out
    }

    pub async fn get_many(&self, keys: &[String]) -> Vec<Result<CacheResponse, ClientError>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await);
        }
        out
    }

    pub async fn delete_many(&self, keys: &[String]) -> Vec<Result<DeleteResponse, ClientError>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.delete(key).await);
        }
        out
    }

    /// Picks a peer, issues the request, and on network failure rotates to
    /// the next peer, up to `retry_count` attempts.
    async fn execute<T, F, Fut>(&self, build_request: F) -> Result<T, ClientError>
    where
        T: for<'de> Deserialize<'de>,
        F: Fn(reqwest::Client, String) -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut last_err = None;

        for _ in 0..self.retry_count {
            let peer = self.pool.next_peer().ok_or(ClientError::NoPeers)?;
            let base = format!("http://{}", peer.addr);

            let outcome = build_request(self.http.clone(), base).await;

            match outcome {
                Ok(resp) if resp.status().is_success() => {
                    self.pool.record_result(&peer, true);
                    return resp
                        .json::<T>()
                        .await
                        .map_err(|source| ClientError::InvalidResponse { peer: peer.addr.clone(), source });
                }
                Ok(resp) => {
                    self.pool.record_result(&peer, false);
                    last_err = Some(ClientError::ServerError {
                        peer: peer.addr.clone(),
                        status: resp.status().as_u16(),
                    });
                }
                Err(source) if source.is_timeout() => {
                    self.pool.record_result(&peer, false);
                    last_err = Some(ClientError::Timeout { peer: peer.addr.clone() });
                }
                Err(source) => {
                    self.pool.record_result(&peer, false);
                    last_err = Some(ClientError::Network { peer: peer.addr.clone(), source });
                }
            }
        }

        Err(last_err.unwrap_or(ClientError::AllPeersFailed { attempts: self.retry_count }))
    }
}
