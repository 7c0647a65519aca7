//! # In-Memory Engine
//!
//! Provide the in-memory backend with LRU eviction, TTL expiry, and a
//! byte-budget ceiling for predictable memory usage.
//!
//! ## Design Principles
//!
//! 1. **One Lock, Strict Recency**: spec.md's LRU-correctness property
//!    requires a single global recency order, which per-shard locking
//!    cannot provide — so unlike an earlier sharded draft, this engine
//!    guards all state behind one `parking_lot::RwLock`.
//! 2. **Byte-Based and Count-Based Eviction**: evict on the tail while at
//!    or above entry-count capacity, and (if a byte budget is configured)
//!    while the incoming entry would push total bytes over budget.
//! 3. **Arc-backed Buffers**: values are `Arc<[u8]>` to avoid extra copies
//!    on promotion and on `all_entries()` snapshots.
//! 4. **TTL Fast Path**: expiration is checked on access; a background
//!    sweeper also removes expired entries between accesses.
//! 5. **Strategy Pattern**: implements `KVEngine` to keep callers decoupled
//!    from the storage representation.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryEngine
//!   ├── capacity, byte_budget
//!   └── inner: RwLock<Inner>
//!         ├── map: HashMap<Arc<[u8]>, usize>
//!         ├── nodes: Vec<Option<Node>>
//!         ├── free: Vec<usize>
//!         ├── head/tail: LRU indices
//!         ├── used_bytes
//!         ├── hits/misses
//!         └── cleaned_total/runs_total
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::engine::{CacheStats, KVEngine, SweepStats};

/// Fixed per-entry bookkeeping overhead added to `key.len() + value.len()`
/// for byte accounting (spec.md §4.1: "implementation-chosen, uniform").
const OVERHEAD_BYTES: usize = 64;

/// Internal node representing a single key/value entry.
///
/// Uses an index-based intrusive list for O(1) LRU updates without heap
/// pointers or `Rc<RefCell<_>>`, keeping the layout cache-friendly and safe.
#[derive(Debug)]
struct Node {
    key: Arc<[u8]>,
    value: Arc<[u8]>,
    expires_at: Option<Instant>,
    size: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Node {
    fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

/// All mutable engine state, guarded by a single lock.
struct Inner {
    map: HashMap<Arc<[u8]>, usize, RandomState>,
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    used_bytes: usize,
    hits: u64,
    misses: u64,
    cleaned_total: u64,
    runs_total: u64,
}

impl Inner {
    fn new() -> Self {
        Inner {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            used_bytes: 0,
            hits: 0,
            misses: 0,
            cleaned_total: 0,
            runs_total: 0,
        }
    }

    fn lru_remove(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().expect("node exists");
            (node.prev, node.next)
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = self.nodes[prev_idx].as_mut() {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = self.nodes[next_idx].as_mut() {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn lru_push_front(&mut self, idx: usize) {
        let head = self.head;
        if let Some(node) = self.nodes[idx].as_mut() {
            node.next = head;
            node.prev = None;
        }

        match head {
            Some(head_idx) => {
                if let Some(head_node) = self.nodes[head_idx].as_mut() {
                    head_node.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }

        self.head = Some(idx);
    }

    /// Moves `idx` to most-recently-used (the head).
    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.lru_remove(idx);
        self.lru_push_front(idx);
    }

    fn insert_new(&mut self, key: Arc<[u8]>, value: Arc<[u8]>, size: usize, expires_at: Option<Instant>) -> usize {
        let idx = self.free.pop().unwrap_or_else(|| {
            self.nodes.push(None);
            self.nodes.len() - 1
        });

        self.nodes[idx] = Some(Node {
            key: Arc::clone(&key),
            value,
            expires_at,
            size,
            prev: None,
            next: None,
        });
        self.lru_push_front(idx);
        self.map.insert(key, idx);
        self.used_bytes += size;
        idx
    }

    fn remove_idx(&mut self, idx: usize) -> Option<usize> {
        let node = self.nodes[idx].as_ref()?;
        let key = Arc::clone(&node.key);
        let size = node.size;

        self.lru_remove(idx);
        self.nodes[idx] = None;
        self.map.remove(key.as_ref());
        self.free.push(idx);
        self.used_bytes -= size;
        Some(size)
    }

    fn pop_lru(&mut self) -> Option<usize> {
        let idx = self.tail?;
        self.remove_idx(idx)
    }

    fn remove_if_expired(&mut self, idx: usize, now: Instant) -> bool {
        let expired = match self.nodes[idx].as_ref() {
            Some(node) => node.is_expired(now),
            None => return false,
        };
        if expired {
            self.remove_idx(idx);
        }
        expired
    }
}

/// Single-lock in-memory implementation of `KVEngine`.
pub struct MemoryEngine {
    inner: RwLock<Inner>,
    capacity: usize,
    byte_budget: Option<usize>,
}

/// Handle for the background expiration sweeper.
///
/// Call `stop` to signal shutdown and join the thread.
pub struct ExpirationHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ExpirationHandle {
    /// Stops the sweeper and waits for the thread to finish.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl MemoryEngine {
    /// Creates an engine with `capacity` max entries and no byte budget.
    ///
    /// Panics if `capacity` is zero: a non-positive capacity is a
    /// programmer error and must fail fast at construction (spec.md §4.1).
    pub fn new(capacity: usize) -> Self {
        Self::with_byte_budget(capacity, None)
    }

    /// Creates an engine with both an entry-count capacity and an optional
    /// byte budget.
    pub fn with_byte_budget(capacity: usize, byte_budget: Option<usize>) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        MemoryEngine {
            inner: RwLock::new(Inner::new()),
            capacity,
            byte_budget,
        }
    }

    fn entry_size(key_len: usize, value_len: usize) -> usize {
        key_len + value_len + OVERHEAD_BYTES
    }

    /// Whether `incoming_size` alone would exceed the byte budget.
    fn exceeds_budget_alone(&self, incoming_size: usize) -> bool {
        matches!(self.byte_budget, Some(budget) if incoming_size > budget)
    }

    /// Evicts from the tail until under capacity and, if a byte budget is
    /// configured, until `used_bytes + pending` would fit. Callers always
    /// evict as if inserting a brand-new entry (any prior version of the
    /// same key has already been removed).
    fn evict_for_incoming(&self, inner: &mut Inner, pending: usize) {
        loop {
            let over_capacity = inner.map.len() + 1 > self.capacity;
            let over_budget = match self.byte_budget {
                Some(budget) => inner.used_bytes + pending > budget,
                None => false,
            };
            if !over_capacity && !over_budget {
                break;
            }
            if inner.pop_lru().is_none() {
                break;
            }
        }
    }

    /// Removes all entries whose expiry is in the past. Returns the number
    /// of entries removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut inner = self.inner.write();
        let expired: Vec<usize> = inner
            .map
            .values()
            .copied()
            .filter(|&idx| inner.nodes[idx].as_ref().is_some_and(|n| n.is_expired(now)))
            .collect();

        for idx in &expired {
            inner.remove_idx(*idx);
        }

        inner.cleaned_total += expired.len() as u64;
        inner.runs_total += 1;
        expired.len()
    }

    /// Starts a background thread that periodically removes expired
    /// entries every `interval`.
    pub fn start_expirer(self: &Arc<Self>, interval: Duration) -> ExpirationHandle {
        let interval = if interval.is_zero() {
            Duration::from_millis(1)
        } else {
            interval
        };

        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        let engine = Arc::clone(self);

        let join = std::thread::spawn(move || {
            while !stop_thread.load(Ordering::Acquire) {
                std::thread::sleep(interval);
                engine.purge_expired(Instant::now());
            }
        });

        ExpirationHandle {
            stop,
            join: Some(join),
        }
    }

    /// Sweep run/cleaned counters, separate from hit/miss statistics.
    pub fn sweep_stats(&self) -> SweepStats {
        let inner = self.inner.read();
        SweepStats {
            cleaned_total: inner.cleaned_total,
            runs_total: inner.runs_total,
        }
    }

    fn set_inner(&self, key: Vec<u8>, value: Vec<u8>, expires_at: Option<Instant>) {
        let key_arc: Arc<[u8]> = Arc::from(key);
        let value_arc: Arc<[u8]> = Arc::from(value);
        let new_size = Self::entry_size(key_arc.len(), value_arc.len());

        if self.exceeds_budget_alone(new_size) {
            return;
        }

        let mut inner = self.inner.write();

        // Remove any existing (live or expired) entry first so the
        // eviction loop below reasons about a single, uniform "inserting
        // a fresh entry" case rather than tracking a pending byte delta.
        if let Some(&idx) = inner.map.get(key_arc.as_ref()) {
            inner.remove_idx(idx);
        }

        self.evict_for_incoming(&mut inner, new_size);
        inner.insert_new(key_arc, value_arc, new_size, expires_at);
    }
}

impl KVEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> Option<Arc<[u8]>> {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let idx = match inner.map.get(key) {
            Some(&idx) => idx,
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if inner.remove_if_expired(idx, now) {
            inner.misses += 1;
            return None;
        }

        let value = inner.nodes[idx].as_ref().map(|node| Arc::clone(&node.value));
        inner.touch(idx);
        inner.hits += 1;
        value
    }

    fn set(&self, key: Vec<u8>, value: Vec<u8>) {
        self.set_inner(key, value, None);
    }

    fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) {
        self.set_inner(key, value, Some(Instant::now() + ttl));
    }

    fn delete(&self, key: &[u8]) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let idx = match inner.map.get(key) {
            Some(&idx) => idx,
            None => return false,
        };

        let expired = inner.nodes[idx].as_ref().is_some_and(|n| n.is_expired(now));
        inner.remove_idx(idx);
        !expired
    }

    fn size(&self) -> usize {
        self.inner.read().map.len()
    }

    fn all_entries(&self) -> Vec<(Arc<[u8]>, Arc<[u8]>, Option<Duration>)> {
        let now = Instant::now();
        let inner = self.inner.read();
        inner
            .nodes
            .iter()
            .filter_map(|slot| slot.as_ref())
            .filter(|node| !node.is_expired(now))
            .map(|node| {
                let remaining_ttl = node.expires_at.map(|deadline| deadline.saturating_duration_since(now));
                (Arc::clone(&node.key), Arc::clone(&node.value), remaining_ttl)
            })
            .collect()
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        let total = inner.hits + inner.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            inner.hits as f64 / total as f64
        };
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.map.len(),
            bytes_used: inner.used_bytes,
            hit_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn zero_capacity_fails_fast() {
        MemoryEngine::new(0);
    }

    #[test]
    fn set_get_roundtrip() {
        let engine = MemoryEngine::new(4);
        engine.set(b"alpha".to_vec(), b"value".to_vec());
        assert_eq!(&*engine.get(b"alpha").unwrap(), b"value");
    }

    #[test]
    fn miss_increments_misses_and_hit_increments_hits() {
        let engine = MemoryEngine::new(4);
        assert!(engine.get(b"missing").is_none());
        engine.set(b"alpha".to_vec(), b"value".to_vec());
        engine.get(b"alpha").unwrap();

        let stats = engine.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn delete_removes_key() {
        let engine = MemoryEngine::new(4);
        engine.set(b"alpha".to_vec(), b"value".to_vec());
        assert!(engine.delete(b"alpha"));
        assert!(engine.get(b"alpha").is_none());
        assert!(!engine.delete(b"alpha"));
    }

    #[test]
    fn ttl_expires_entry() {
        let engine = MemoryEngine::new(4);
        engine.set_with_ttl(b"alpha".to_vec(), b"value".to_vec(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(engine.get(b"alpha").is_none());
    }

    #[test]
    fn purge_expired_removes_entries() {
        let engine = MemoryEngine::new(4);
        engine.set_with_ttl(b"alpha".to_vec(), b"value".to_vec(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(engine.purge_expired(Instant::now()), 1);
        assert_eq!(engine.sweep_stats().cleaned_total, 1);
        assert_eq!(engine.sweep_stats().runs_total, 1);
    }

    #[test]
    fn expirer_thread_clears_expired() {
        let engine = Arc::new(MemoryEngine::new(4));
        engine.set_with_ttl(b"alpha".to_vec(), b"value".to_vec(), Duration::from_millis(1));

        let handle = engine.start_expirer(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(15));
        handle.stop();

        assert!(engine.get(b"alpha").is_none());
    }

    #[test]
    fn evicts_lru_by_capacity() {
        let engine = MemoryEngine::new(2);
        engine.set(b"a".to_vec(), b"1".to_vec());
        engine.set(b"b".to_vec(), b"2".to_vec());
        engine.get(b"a").unwrap(); // promote a, leave b as LRU
        engine.set(b"c".to_vec(), b"3".to_vec());

        assert!(engine.get(b"b").is_none());
        assert!(engine.get(b"a").is_some());
        assert!(engine.get(b"c").is_some());
    }

    #[test]
    fn evicts_lru_by_byte_budget() {
        let engine = MemoryEngine::with_byte_budget(100, Some(OVERHEAD_BYTES * 2 + 10));
        engine.set(b"a".to_vec(), b"1234".to_vec());
        engine.set(b"b".to_vec(), b"1234".to_vec());
        engine.get(b"a").unwrap();
        engine.set(b"c".to_vec(), b"1234".to_vec());

        assert!(engine.get(b"b").is_none());
        assert!(engine.get(b"a").is_some());
        assert!(engine.get(b"c").is_some());
    }

    #[test]
    fn entry_alone_over_budget_is_silent_noop() {
        let engine = MemoryEngine::with_byte_budget(100, Some(10));
        engine.set(b"huge".to_vec(), vec![0u8; 200]);
        assert!(engine.get(b"huge").is_none());
        assert_eq!(engine.size(), 0);
    }

    #[test]
    fn all_entries_skips_expired() {
        let engine = MemoryEngine::new(4);
        engine.set(b"live".to_vec(), b"1".to_vec());
        engine.set_with_ttl(b"dead".to_vec(), b"2".to_vec(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));

        let entries = engine.all_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(&*entries[0].0, b"live");
        assert_eq!(entries[0].2, None);
    }

    #[test]
    fn all_entries_reports_remaining_ttl() {
        let engine = MemoryEngine::new(4);
        engine.set_with_ttl(b"temp".to_vec(), b"x".to_vec(), Duration::from_secs(60));

        let entries = engine.all_entries();
        assert_eq!(entries.len(), 1);
        let remaining = entries[0].2.expect("ttl entry should report a remaining duration");
        assert!(remaining <= Duration::from_secs(60) && remaining > Duration::from_secs(50));
    }
}
