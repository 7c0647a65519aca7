//! # Cache Engine Contract
//!
//! The `KVEngine` trait is the local cache contract (spec.md §4.1): it has
//! no failure modes that propagate to callers, because it is purely an
//! in-memory data structure. The one exception is construction with a
//! non-positive capacity, which panics — a programmer error that must fail
//! fast rather than surface as a runtime `Result`.

use std::sync::Arc;
use std::time::Duration;

/// Point-in-time counters for a cache instance.
///
/// `hit_rate` is derived (`hits / (hits + misses)`, `0.0` when both are
/// zero) rather than stored, so it can never drift from the raw counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub bytes_used: usize,
    pub hit_rate: f64,
}

/// Background sweeper counters (spec.md §4.1 Statistics).
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub cleaned_total: u64,
    pub runs_total: u64,
}

/// Local, single-node cache contract.
///
/// All operations are thread-safe. Keys and values are opaque byte strings;
/// callers own the encoding.
pub trait KVEngine: Send + Sync {
    /// Looks up `key`. A live, unexpired hit moves the entry to
    /// most-recently-used and increments the hit counter; anything else
    /// (absent or expired) increments the miss counter and returns `None`.
    fn get(&self, key: &[u8]) -> Option<Arc<[u8]>>;

    /// Inserts or replaces `key` with no expiry, evicting from the tail as
    /// needed to stay within capacity and (if configured) the byte budget.
    fn set(&self, key: Vec<u8>, value: Vec<u8>);

    /// Same as `set`, but the entry expires after `ttl`.
    fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration);

    /// Removes `key` if present and live. Returns whether a live entry was
    /// actually removed (an already-expired entry is treated as absent).
    fn delete(&self, key: &[u8]) -> bool;

    /// Current resident entry count. An entry that has expired but not yet
    /// been touched by `get` or the background sweeper is still counted
    /// here; it is removed lazily on next access or sweep.
    fn size(&self) -> usize;

    /// All live (key, value, remaining TTL) triples, skipping anything
    /// expired. Used for the bulk transfer during ring topology changes
    /// (§4.4); the remaining TTL travels with the entry so a migrated key
    /// doesn't become permanent at its new owner.
    fn all_entries(&self) -> Vec<(Arc<[u8]>, Arc<[u8]>, Option<Duration>)>;

    /// Point-in-time counters snapshot.
    fn stats(&self) -> CacheStats;

    /// Batch form of `get`.
    fn get_many(&self, keys: &[Vec<u8>]) -> Vec<Option<Arc<[u8]>>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    /// Batch form of `set`.
    fn set_many(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) {
        for (k, v) in entries {
            self.set(k, v);
        }
    }

    /// Batch form of `delete`.
    fn delete_many(&self, keys: &[Vec<u8>]) -> Vec<bool> {
        keys.iter().map(|k| self.delete(k)).collect()
    }
}
