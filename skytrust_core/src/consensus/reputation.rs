//! PoRS-Consensus: the most reputable energy-eligible member proposes.

use super::{ConsensusEngine, RoundContext, RoundResult};
use crate::scoring::consensus_leader_score;
use skytrust_env::{NodeSnapshot, SimRng};

/// Fixed round latency (seconds).
const ROUND_LATENCY: f64 = 0.2;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReputationEngine;

impl ConsensusEngine for ReputationEngine {
    fn name(&self) -> &'static str {
        "PoRS-Consensus"
    }

    fn run(
        &self,
        time: f64,
        members: &[NodeSnapshot],
        ctx: &RoundContext<'_>,
        _rng: &mut SimRng,
    ) -> RoundResult {
        let config = ctx.config;
        let mut best: Option<(&NodeSnapshot, f64)> = None;
        for member in members.iter().filter(|m| m.state.energy >= config.energy_min) {
            let score = consensus_leader_score(ctx.trust, member, config.initial_energy);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((member, score));
            }
        }

        RoundResult {
            latency: ROUND_LATENCY,
            block: best.map(|(proposer, _)| ctx.mint_block(proposer.id, time + ROUND_LATENCY)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::tests::{members, Fixture};
    use proptest::prelude::*;
    use skytrust_env::{derive_rng, InteractionOutcome, NodeId};

    #[test]
    fn test_picks_most_reputable() {
        let fixture = Fixture::new(3);
        fixture
            .trust
            .record_interaction(NodeId(0), NodeId(2), InteractionOutcome::Success, 1.0);
        let mut rng = derive_rng(5, 1);

        let result = ReputationEngine.run(2.0, &members(&[(1.0, 5000.0); 3]), &fixture.ctx(), &mut rng);
        assert_eq!(result.block.map(|b| b.proposer), Some(NodeId(2)));
        assert_eq!(result.latency, ROUND_LATENCY);
    }

    #[test]
    fn test_all_depleted_yields_no_block() {
        let fixture = Fixture::new(2);
        let mut rng = derive_rng(5, 1);
        let result = ReputationEngine.run(2.0, &members(&[(1.0, 10.0); 2]), &fixture.ctx(), &mut rng);
        assert!(result.block.is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn never_elects_below_energy_floor(
            energies in prop::collection::vec(0.0f64..5000.0, 2..8),
            boosted in 0usize..8,
        ) {
            let fixture = Fixture::new(energies.len());
            let boosted = boosted % energies.len();
            // Make one member everyone's favourite regardless of its energy
            for observer in 0..energies.len() {
                for _ in 0..10 {
                    fixture.trust.record_interaction(
                        NodeId(observer),
                        NodeId(boosted),
                        InteractionOutcome::Success,
                        1.0,
                    );
                }
            }

            let specs: Vec<(f64, f64)> = energies.iter().map(|&e| (1.0, e)).collect();
            let group = members(&specs);
            let mut rng = derive_rng(5, 1);
            let result = ReputationEngine.run(2.0, &group, &fixture.ctx(), &mut rng);

            let floor = fixture.config.energy_min;
            match result.block {
                Some(block) => prop_assert!(energies[block.proposer.index()] >= floor),
                None => prop_assert!(energies.iter().all(|&e| e < floor)),
            }
        }
    }
}
