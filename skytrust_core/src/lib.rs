//! SkyTrust Core - the engines of the swarm simulator
//!
//! Each engine owns its shared state behind its own lock and is driven by the
//! simulation kernel:
//!
//! - **Trust**: pairwise trust matrix under one of three update models
//! - **Cluster**: connectivity clustering and cluster-head election
//! - **Consensus**: threshold, lottery and reputation protocols per cluster
//! - **Routing**: greedy trust-gated next-hop selection
//! - **Metrics**: run counters and the final summary
//!
//! # Architecture
//!
//! ```text
//!           ┌─────────────┐
//!           │   Router    │──── reads ────┐
//!           └──────┬──────┘               │
//!                  │ records              ▼
//!           ┌──────▼──────┐        ┌─────────────┐
//!           │ TrustEngine │◀─reads─│ClusterEngine│
//!           └──────▲──────┘        └──────▲──────┘
//!                  │ reads                │ members
//!           ┌──────┴──────────────────────┴──┐
//!           │        Consensus engines        │
//!           └─────────────────────────────────┘
//! ```

pub mod cluster;
pub mod consensus;
pub mod metrics;
pub mod routing;
pub mod scoring;
pub mod trust;

pub use cluster::{form_clusters, ClusterEngine, Partition};
pub use consensus::{
    engine_for, run_round, ConsensusEngine, LotteryEngine, ReputationEngine, RoundContext,
    RoundFailure, RoundOutcome, RoundResult, ThresholdEngine,
};
pub use metrics::{CollectorSnapshot, FinalMetrics, MetricsCollector};
pub use routing::{DropReason, HopTransport, RouteOutcome, Router};
pub use trust::{TrustEngine, TrustMatrix, TrustParams};
