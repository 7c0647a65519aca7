//! # hkv-common
//!
//! Shared error taxonomy, wire DTOs, node identity, and the per-node config
//! schema used by every other crate in the workspace.

pub mod config;
pub mod dto;
pub mod error;
pub mod node;

pub use config::NodeConfig;
pub use error::{ErrorEnvelope, HkvError, HkvResult};
pub use node::NodeId;

/// Current time formatted as RFC3339, used for response timestamps.
pub fn rfc3339_now() -> String {
    humantime::format_rfc3339(std::time::SystemTime::now()).to_string()
}
