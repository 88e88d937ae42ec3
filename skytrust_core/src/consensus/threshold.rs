//! PBFT-style threshold agreement.

use super::{ConsensusEngine, RoundContext, RoundResult};
use skytrust_env::{NodeSnapshot, SimRng};

/// Smallest cluster that tolerates one Byzantine member (3f + 1, f = 1).
pub const MIN_QUORUM: usize = 4;

/// Extra latency per participant, for the all-to-all message phases.
const PER_MEMBER_LATENCY: f64 = 0.05;

/// Deterministic: the first member (the cluster head) proposes once a quorum exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdEngine;

impl ConsensusEngine for ThresholdEngine {
    fn name(&self) -> &'static str {
        "PBFT"
    }

    fn run(
        &self,
        time: f64,
        members: &[NodeSnapshot],
        ctx: &RoundContext<'_>,
        _rng: &mut SimRng,
    ) -> RoundResult {
        let latency =
            ctx.config.threshold_base_latency + PER_MEMBER_LATENCY * members.len() as f64;
        let block = match members.first() {
            Some(proposer) if members.len() >= MIN_QUORUM => {
                Some(ctx.mint_block(proposer.id, time + latency))
            }
            _ => None,
        };
        RoundResult { latency, block }
    }
}
