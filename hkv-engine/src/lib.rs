//! # hkv-engine
//!
//! The local cache engine (C1): LRU + TTL + byte-budget eviction behind a
//! single read/write lock, plus the background expiry sweeper.

pub mod engine;
pub mod memory;

pub use engine::{CacheStats, KVEngine, SweepStats};
pub use memory::{ExpirationHandle, MemoryEngine};
