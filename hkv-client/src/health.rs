//! # Background Health Checker
//!
//! Periodically probes `GET /api/v1/health` on every configured peer and
//! feeds the result into the same [`PeerState`](crate::peer::PeerState)
//! machine the data path updates, so a peer that is merely idle (no recent
//! calls) still gets marked unhealthy promptly. Grounded on
//! `jizhuozhi-hermes`'s `upstream::health::run_health_checks` /
//! `build_health_check_client` shape, collapsed to this crate's single pool
//! instead of a per-cluster node list.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::pool::PeerPool;

/// Builds a dedicated short-timeout client for health probes, kept separate
/// from the client used for data-path calls.
pub fn build_health_check_client(probe_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(probe_timeout)
        .build()
        .expect("failed to build health check client")
}

/// Runs one round of health probes across every configured peer, regardless
/// of current health, so peers can recover without receiving data traffic.
pub async fn run_health_checks(pool: &PeerPool, client: &reqwest::Client) {
    let mut tasks = Vec::with_capacity(pool.all().len());
    for peer in pool.all() {
        let peer = Arc::clone(peer);
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let url = format!("http://{}/api/v1/health", peer.addr);
            let healthy = matches!(client.get(&url).send().await, Ok(resp) if resp.status().is_success());
            (peer, healthy)
        }));
    }

    let results = futures_join_all(tasks).await;
    for joined in results {
        match joined {
            Ok((peer, healthy)) => {
                debug!(peer = %peer.addr, healthy, "health probe result");
                pool.record_result(&peer, healthy);
            }
            Err(err) => debug!(error = %err, "health probe task panicked"),
        }
    }
}

/// Minimal stand-in for `futures::future::join_all` so the crate doesn't
/// need to pull in the `futures` family for one call site. Each input future
/// is already a spawned [`tokio::task::JoinHandle`], so awaiting them in
/// sequence still runs the underlying probes concurrently.
async fn futures_join_all<F: std::future::Future>(futures: Vec<F>) -> Vec<F::Output> {
    let mut out = Vec::with_capacity(futures.len());
    for fut in futures {
        out.push(fut.await);
    }
    out
}

/// Spawns the periodic health-check loop. Returns a handle whose drop does
/// not stop the task; callers must call [`HealthChecker::stop`] explicitly,
/// mirroring the explicit-shutdown style of the teacher's connection pool.
pub struct HealthChecker {
    handle: tokio::task::JoinHandle<()>,
}

impl HealthChecker {
    pub fn spawn(pool: Arc<PeerPool>, interval: Duration, probe_timeout: Duration) -> Self {
        let client = build_health_check_client(probe_timeout);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                run_health_checks(&pool, &client).await;
            }
        });
        HealthChecker { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}
