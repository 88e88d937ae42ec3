//! Error types for the SkyTrust simulator.
//!
//! Only conditions that abort a run are errors. Dropped packets, failed
//! consensus rounds and leaderless clusters are ordinary outcomes.

use crate::types::NodeId;
use thiserror::Error;

/// A configuration that cannot be simulated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration needs at least one node")]
    NoNodes,

    #[error("{name} must be positive (got {value})")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{name} must be finite and not negative (got {value})")]
    Negative { name: &'static str, value: f64 },

    #[error("{name} must lie in [0, 1] (got {value})")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal conditions that abort a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    /// The run was started with an unusable configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Kernel state is corrupt (programming defect, never recovered)
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// An event referenced a node the arena never issued
    #[error("Event references unknown {0}")]
    UnknownNode(NodeId),

    /// A node or consensus task panicked
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// The async runtime could not be started
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl SimError {
    /// Creates an invariant violation.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}
