//! PoW-style lottery: the winner is drawn proportionally to computational capacity.

use super::{ConsensusEngine, RoundContext, RoundResult};
use rand::Rng;
use skytrust_env::{NodeSnapshot, SimRng};

/// Mining time varies uniformly within ±10% of the configured mean.
const MINING_JITTER: f64 = 0.2;

#[derive(Debug, Clone, Copy, Default)]
pub struct LotteryEngine;

impl LotteryEngine {
    /// Cumulative-sum roulette over capacities.
    pub fn draw<'m>(members: &'m [NodeSnapshot], rng: &mut SimRng) -> Option<&'m NodeSnapshot> {
        let total: f64 = members.iter().map(|m| m.capacity).sum();
        if total <= 0.0 {
            return None;
        }
        Self::holder(members, rng.gen::<f64>() * total)
    }

    /// Member whose capacity bucket `[cumulative, cumulative + capacity)` holds `ticket`.
    fn holder(members: &[NodeSnapshot], ticket: f64) -> Option<&NodeSnapshot> {
        let mut cumulative = 0.0;
        for member in members {
            cumulative += member.capacity;
            if ticket < cumulative {
                return Some(member);
            }
        }
        // Rounding left the ticket past the last bucket
        members.iter().rev().find(|m| m.capacity > 0.0)
    }
}

impl ConsensusEngine for LotteryEngine {
    fn name(&self) -> &'static str {
        "PoW"
    }

    fn run(
        &self,
        time: f64,
        members: &[NodeSnapshot],
        ctx: &RoundContext<'_>,
        rng: &mut SimRng,
    ) -> RoundResult {
        let winner = Self::draw(members, rng).map(|m| m.id);
        let mining = ctx.config.lottery_mining_time;
        let latency = mining + (rng.gen::<f64>() - 0.5) * mining * MINING_JITTER;
        RoundResult {
            latency,
            block: winner.map(|proposer| ctx.mint_block(proposer, time + latency)),
        }
    }
}
