//! # Error Taxonomy
//!
//! Shared error kinds for the cache engine, ring, node core, coordinator,
//! and client. Mirrors the cluster's documented error kinds so every layer
//! can translate a failure into the right HTTP status and JSON envelope
//! without re-deriving the mapping.

use std::fmt;

/// Result alias used throughout the workspace.
pub type HkvResult<T> = Result<T, HkvError>;

/// Cluster-wide error kinds.
///
/// `not-found` from spec.md's taxonomy is deliberately absent here: a missing
/// key is expressed as `found: false` in a 200 response, never as an error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HkvError {
    /// Cache constructed with non-positive capacity; a programmer error that
    /// must fail fast at construction.
    #[error("cache capacity must be positive")]
    CapacityInvalid,
    /// A single incoming entry alone exceeds the configured byte budget.
    #[error("entry exceeds byte budget")]
    EntryTooLarge,
    /// Request body failed validation (missing field, bad shape).
    #[error("invalid request: {0}")]
    Validation(String),
    /// Forwarding to the owning peer failed at the network layer.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),
    /// The owning peer responded, but with a non-success status.
    #[error("peer returned error: {0}")]
    PeerReturnedError(String),
    /// The ring named an owner with no address in the cluster map.
    #[error("ring inconsistent: no address for node {0}")]
    RingInconsistent(String),
    /// Startup configuration failed validation.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

/// Stable machine-readable error kind, used as the `"error"` field of the
/// JSON error envelope (spec.md §6/§7).
impl HkvError {
    pub fn kind(&self) -> &'static str {
        match self {
            HkvError::CapacityInvalid => "capacity_invalid",
            HkvError::EntryTooLarge => "entry_too_large",
            HkvError::Validation(_) => "invalid_request",
            HkvError::PeerUnreachable(_) => "forward_failed",
            HkvError::PeerReturnedError(_) => "forward_failed",
            HkvError::RingInconsistent(_) => "node_not_found",
            HkvError::ConfigInvalid(_) => "config_invalid",
        }
    }
}

/// The wire-level error envelope: `{"error","message","timestamp"}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorEnvelope {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorEnvelope {
            error: kind.into(),
            message: message.into(),
            timestamp: crate::rfc3339_now(),
        }
    }
}

impl From<&HkvError> for ErrorEnvelope {
    fn from(err: &HkvError) -> Self {
        ErrorEnvelope::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}
