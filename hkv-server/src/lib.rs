//! # hkv-server
//!
//! Node Core (C3), Cluster Coordinator (C4), and the HTTP surface that binds
//! them to the local cache engine and consistent hash ring.

pub mod coordinator;
pub mod http;
pub mod metrics;
pub mod routing;
pub mod server;
pub mod state;

pub use state::NodeState;
