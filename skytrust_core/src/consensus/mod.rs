//! Pluggable consensus protocols run per cluster.
//!
//! An engine only decides *who* proposes and *how long* the round takes.
//! The round driver ([`run_round`]) collects the members, calls the engine and
//! applies the common post-round effects:
//!
//! - every member pays `energy_consensus` and counts one more round
//! - the proposer counts one more valid block
//!
//! A round that cannot produce a block is a soft failure: it is logged and
//! nothing else changes.

mod lottery;
mod reputation;
mod threshold;

pub use lottery::LotteryEngine;
pub use reputation::ReputationEngine;
pub use threshold::ThresholdEngine;

use crate::cluster::ClusterEngine;
use crate::metrics::MetricsCollector;
use crate::trust::TrustEngine;
use skytrust_env::{
    Block, ClusterId, ConsensusKind, NodeArena, NodeId, NodeSnapshot, SimConfig, SimRng,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// What an engine returns for one round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    /// Simulated duration of the round (seconds)
    pub latency: f64,

    /// The agreed block, if a proposer could be chosen
    pub block: Option<Block>,
}

/// Shared collaborators handed to every round.
#[derive(Debug, Clone, Copy)]
pub struct RoundContext<'a> {
    pub config: &'a SimConfig,
    pub trust: &'a TrustEngine,
    pub metrics: &'a MetricsCollector,

    /// Run-wide block id counter
    pub block_ids: &'a AtomicU64,
}

impl RoundContext<'_> {
    /// Mints the next block final at `time`; ids start at 1.
    pub fn mint_block(&self, proposer: NodeId, time: f64) -> Block {
        Block {
            id: self.block_ids.fetch_add(1, Ordering::Relaxed) + 1,
            proposer,
            timestamp: time,
        }
    }
}

/// One consensus protocol.
pub trait ConsensusEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs one round over `members` (cluster head first).
    fn run(
        &self,
        time: f64,
        members: &[NodeSnapshot],
        ctx: &RoundContext<'_>,
        rng: &mut SimRng,
    ) -> RoundResult;
}

static THRESHOLD: ThresholdEngine = ThresholdEngine;
static LOTTERY: LotteryEngine = LotteryEngine;
static REPUTATION: ReputationEngine = ReputationEngine;

/// Engine bound to a consensus kind; `None` for configurations without consensus.
pub fn engine_for(kind: ConsensusKind) -> Option<&'static dyn ConsensusEngine> {
    match kind {
        ConsensusKind::None => None,
        ConsensusKind::Threshold => Some(&THRESHOLD),
        ConsensusKind::Lottery => Some(&LOTTERY),
        ConsensusKind::Reputation => Some(&REPUTATION),
    }
}

/// Why a round produced no block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundFailure {
    /// The cluster elected no head this period
    NoClusterHead,

    /// A single node cannot agree with anyone
    TooFewMembers(usize),

    /// The engine could not select a proposer
    NoProposer,
}

impl fmt::Display for RoundFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundFailure::NoClusterHead => write!(f, "no cluster head"),
            RoundFailure::TooFewMembers(n) => write!(f, "too few members ({n})"),
            RoundFailure::NoProposer => write!(f, "no proposer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    Committed { block: Block, latency: f64 },
    Failed(RoundFailure),
}

/// Runs one consensus round for `cluster` and applies its effects.
pub fn run_round(
    engine: &dyn ConsensusEngine,
    cluster: ClusterId,
    time: f64,
    nodes: &NodeArena,
    clusters: &ClusterEngine,
    ctx: &RoundContext<'_>,
    rng: &mut SimRng,
) -> RoundOutcome {
    let outcome = match round_members(cluster, nodes, clusters) {
        Err(failure) => RoundOutcome::Failed(failure),
        Ok(members) => {
            let result = engine.run(time, &members, ctx, rng);
            match result.block {
                None => RoundOutcome::Failed(RoundFailure::NoProposer),
                Some(block) => {
                    apply_round_effects(&members, &block, nodes, ctx);
                    RoundOutcome::Committed {
                        block,
                        latency: result.latency,
                    }
                }
            }
        }
    };

    match &outcome {
        RoundOutcome::Committed { block, latency } => debug!(
            "t={:.2} {} {} committed block {} by {} in {:.3}s",
            time,
            engine.name(),
            cluster,
            block.id,
            block.proposer,
            latency
        ),
        RoundOutcome::Failed(failure) => {
            debug!("t={:.2} {} {} failed: {}", time, engine.name(), cluster, failure)
        }
    }
    ctx.metrics
        .record_consensus_round(matches!(outcome, RoundOutcome::Committed { .. }));
    outcome
}

/// Snapshots of the cluster's members with the head moved to the front.
fn round_members(
    cluster: ClusterId,
    nodes: &NodeArena,
    clusters: &ClusterEngine,
) -> Result<Vec<NodeSnapshot>, RoundFailure> {
    let head = clusters
        .cluster_head(cluster)
        .ok_or(RoundFailure::NoClusterHead)?;
    let ids = clusters.members(cluster);
    if ids.len() <= 1 {
        return Err(RoundFailure::TooFewMembers(ids.len()));
    }

    let mut members = Vec::with_capacity(ids.len());
    members.push(nodes.node(head).snapshot());
    members.extend(
        ids.iter()
            .filter(|&&id| id != head)
            .map(|&id| nodes.node(id).snapshot()),
    );
    Ok(members)
}

fn apply_round_effects(
    members: &[NodeSnapshot],
    block: &Block,
    nodes: &NodeArena,
    ctx: &RoundContext<'_>,
) {
    let cost = ctx.config.energy_consensus;
    for member in members {
        let mut state = nodes.node(member.id).lock();
        state.energy -= cost;
        state.consensus_rounds += 1;
        if member.id == block.proposer {
            state.valid_blocks_proposed += 1;
        }
    }
    ctx.metrics.record_energy(cost * members.len() as f64);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use skytrust_env::{derive_rng, Node, Point};
    use tracing_test::traced_test;

    pub(crate) fn members(specs: &[(f64, f64)]) -> Vec<NodeSnapshot> {
        specs
            .iter()
            .enumerate()
            .map(|(i, &(capacity, energy))| {
                Node::new(NodeId(i), false, capacity, Point::default(), energy).snapshot()
            })
            .collect()
    }

    pub(crate) struct Fixture {
        pub config: SimConfig,
        pub trust: TrustEngine,
        pub metrics: MetricsCollector,
        pub block_ids: AtomicU64,
    }

    impl Fixture {
        pub fn new(n: usize) -> Self {
            let config = SimConfig {
                num_nodes: n,
                energy_consensus: 2.0,
                ..Default::default()
            };
            Self {
                trust: TrustEngine::from_config(&config),
                config,
                metrics: MetricsCollector::new(),
                block_ids: AtomicU64::new(0),
            }
        }

        pub fn ctx(&self) -> RoundContext<'_> {
            RoundContext {
                config: &self.config,
                trust: &self.trust,
                metrics: &self.metrics,
                block_ids: &self.block_ids,
            }
        }
    }

    fn clustered_arena(n: usize) -> NodeArena {
        NodeArena::from_nodes(
            (0..n)
                .map(|i| Node::new(NodeId(i), false, 1.0, Point::new(i as f64, 0.0), 5000.0))
                .collect(),
        )
    }

    #[test]
    fn test_engine_dispatch() {
        assert!(engine_for(ConsensusKind::None).is_none());
        assert_eq!(engine_for(ConsensusKind::Threshold).map(|e| e.name()), Some("PBFT"));
        assert_eq!(engine_for(ConsensusKind::Lottery).map(|e| e.name()), Some("PoW"));
        assert_eq!(
            engine_for(ConsensusKind::Reputation).map(|e| e.name()),
            Some("PoRS-Consensus")
        );
    }

    #[test]
    fn test_round_applies_effects() {
        let fixture = Fixture::new(4);
        let nodes = clustered_arena(4);
        let clusters = ClusterEngine::new();
        clusters.reelect(0.0, &nodes, &fixture.trust, &fixture.config, &fixture.metrics);
        let head = clusters.cluster_head(ClusterId(1)).unwrap();

        let mut rng = derive_rng(1, 1);
        let outcome = run_round(
            &ThresholdEngine,
            ClusterId(1),
            10.0,
            &nodes,
            &clusters,
            &fixture.ctx(),
            &mut rng,
        );

        let RoundOutcome::Committed { block, .. } = outcome else {
            panic!("expected a committed block, got {outcome:?}");
        };
        assert_eq!(block.id, 1);
        assert_eq!(block.proposer, head);

        for node in nodes.iter() {
            let state = node.lock();
            assert_eq!(state.consensus_rounds, 1);
            assert_eq!(state.energy, 4998.0);
            assert_eq!(state.valid_blocks_proposed, u64::from(node.id == head));
        }
        let snap = fixture.metrics.snapshot();
        assert_eq!(snap.consensus_rounds, 1);
        assert_eq!(snap.energy_consumed, 8.0);
    }

    #[test]
    fn test_failed_round_mutates_nothing() {
        let fixture = Fixture::new(3);
        let nodes = clustered_arena(3);
        let clusters = ClusterEngine::new();
        clusters.reelect(0.0, &nodes, &fixture.trust, &fixture.config, &fixture.metrics);

        let mut rng = derive_rng(1, 1);
        let outcome = run_round(
            &ThresholdEngine,
            ClusterId(1),
            10.0,
            &nodes,
            &clusters,
            &fixture.ctx(),
            &mut rng,
        );

        assert_eq!(outcome, RoundOutcome::Failed(RoundFailure::NoProposer));
        for node in nodes.iter() {
            assert_eq!(node.lock().consensus_rounds, 0);
            assert_eq!(node.energy(), 5000.0);
        }
        assert_eq!(fixture.metrics.snapshot().consensus_failures, 1);
    }

    #[test]
    fn test_leaderless_and_singleton_clusters_fail() {
        let fixture = Fixture::new(2);
        let mut rng = derive_rng(1, 1);

        // Too far apart: two singleton clusters, each with a head
        let nodes = NodeArena::from_nodes(vec![
            Node::new(NodeId(0), false, 1.0, Point::new(0.0, 0.0), 5000.0),
            Node::new(NodeId(1), false, 1.0, Point::new(390.0, 390.0), 5000.0),
        ]);
        let clusters = ClusterEngine::new();
        clusters.reelect(0.0, &nodes, &fixture.trust, &fixture.config, &fixture.metrics);
        let outcome = run_round(
            &LotteryEngine,
            ClusterId(1),
            1.0,
            &nodes,
            &clusters,
            &fixture.ctx(),
            &mut rng,
        );
        assert_eq!(outcome, RoundOutcome::Failed(RoundFailure::TooFewMembers(1)));

        // Before any election nobody leads
        let empty = ClusterEngine::new();
        let outcome = run_round(
            &LotteryEngine,
            ClusterId(1),
            1.0,
            &nodes,
            &empty,
            &fixture.ctx(),
            &mut rng,
        );
        assert_eq!(outcome, RoundOutcome::Failed(RoundFailure::NoClusterHead));
    }

    #[traced_test]
    #[test]
    fn test_soft_failure_logged_at_debug() {
        let fixture = Fixture::new(1);
        let nodes = clustered_arena(1);
        let clusters = ClusterEngine::new();
        clusters.reelect(0.0, &nodes, &fixture.trust, &fixture.config, &fixture.metrics);

        let mut rng = derive_rng(1, 1);
        let outcome = run_round(
            &ReputationEngine,
            ClusterId(1),
            1.0,
            &nodes,
            &clusters,
            &fixture.ctx(),
            &mut rng,
        );

        assert_eq!(outcome, RoundOutcome::Failed(RoundFailure::TooFewMembers(1)));
        assert!(logs_contain("too few members (1)"));
        assert!(!logs_contain("WARN"));
    }
}
