//! SkyTrust environment layer
//!
//! The data model and runtime primitives shared by the engines and the
//! simulation kernel:
//!
//! - **Entities**: [`Point`], [`Packet`], [`Block`], [`InteractionOutcome`]
//! - **Nodes**: per-node records, each behind its own lock, owned by a [`NodeArena`]
//! - **Configuration**: [`SimConfig`] with closed strategy enums and [`Protocol`] presets
//! - **Time and randomness**: the shared [`SimClock`] and seeded [`SimRng`] streams
//!
//! # Locking rule
//!
//! A caller holds at most one node lock at a time. Anything that needs the
//! state of several nodes works on [`NodeSnapshot`]s taken one by one.

mod clock;
mod config;
mod error;
mod node;
mod rng;
mod types;

pub use clock::SimClock;
pub use config::{ChSelection, ConsensusKind, Protocol, SimConfig, TrustModel};
pub use error::{ConfigError, SimError};
pub use node::{Node, NodeArena, NodeSnapshot, NodeState};
pub use rng::{derive_rng, SimRng, KERNEL_STREAM};
pub use types::{clamp, Block, ClusterId, InteractionOutcome, NodeId, Packet, Point, MAX_HOPS};
