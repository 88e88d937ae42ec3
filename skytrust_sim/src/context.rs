//! Per-run simulation context: seed, simulated clock and randomness streams.

use skytrust_env::{derive_rng, NodeId, SimClock, SimRng, KERNEL_STREAM};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// First stream id of the node tasks (one stream per node).
const NODE_STREAM_BASE: u64 = 1;

/// First stream id of consensus rounds (one stream per round).
const ROUND_STREAM_BASE: u64 = 1 << 32;

/// Simulation context shared by the kernel and its tasks.
///
/// Every source of randomness is derived from the one run seed:
/// - the kernel loop draws from [`KERNEL_STREAM`]
/// - node `i` draws from its own stream
/// - each consensus round draws from a fresh stream
#[derive(Debug, Clone)]
pub struct SimContext {
    /// Master seed for this run
    seed: u64,

    /// Simulated time, advanced only by the kernel loop
    clock: SimClock,

    /// Next consensus-round stream (shared between clones)
    next_round: Arc<AtomicU64>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clock: SimClock::new(),
            next_round: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Current simulated time in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn kernel_rng(&self) -> SimRng {
        derive_rng(self.seed, KERNEL_STREAM)
    }

    pub fn node_rng(&self, node: NodeId) -> SimRng {
        derive_rng(self.seed, NODE_STREAM_BASE + node.index() as u64)
    }

    /// Generator for the next consensus round.
    pub fn round_rng(&self) -> SimRng {
        let round = self.next_round.fetch_add(1, Ordering::Relaxed);
        derive_rng(self.seed, ROUND_STREAM_BASE + round)
    }
}
