//! # Peer Health State
//!
//! Per-peer health bookkeeping (spec.md §3 "Client Peer Health"), grounded
//! on `Only1MCP`'s `HealthState`: plain atomics updated from both the data
//! path and the background health checker, with no locking on the hot path.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Health state for a single configured peer address.
///
/// Initial state is healthy with zero consecutive failures, per spec.md
/// §3's documented initial state.
#[derive(Debug)]
pub struct PeerState {
    pub addr: String,
    healthy: AtomicBool,
    consecutive_failures: AtomicUsize,
    last_check: AtomicU64,
    last_success: AtomicU64,
    last_failure: AtomicU64,
}

impl PeerState {
    pub fn new(addr: String) -> Self {
        PeerState {
            addr,
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicUsize::new(0),
            last_check: AtomicU64::new(0),
            last_success: AtomicU64::new(0),
            last_failure: AtomicU64::new(0),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Records a success: resets the failure streak, marks healthy, and
    /// updates last-success/last-check.
    pub fn record_success(&self) {
        let now = now_unix_secs();
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.healthy.store(true, Ordering::Relaxed);
        self.last_success.store(now, Ordering::Relaxed);
        self.last_check.store(now, Ordering::Relaxed);
    }

    /// Records a failure. Returns `true` if this call just crossed the
    /// failure threshold and transitioned the peer to unhealthy.
    pub fn record_failure(&self, failure_threshold: usize) -> bool {
        let now = now_unix_secs();
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_failure.store(now, Ordering::Relaxed);
        self.last_check.store(now, Ordering::Relaxed);

        if failures >= failure_threshold && self.healthy.swap(false, Ordering::Relaxed) {
            return true;
        }
        false
    }
}
