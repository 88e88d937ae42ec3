//! Protocol runner - executes one configuration over one or more seeds.

use crate::kernel::Simulator;
use crate::report::RunReport;
use skytrust_core::FinalMetrics;
use skytrust_env::{SimConfig, SimError};
use tokio::runtime::Runtime;
use tracing::info;

/// Results of running one configuration over consecutive seeds.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub runs: Vec<RunReport>,

    /// Field-wise mean over the runs (only for more than one run)
    pub mean: Option<FinalMetrics>,
}

/// Runs simulations on a dedicated single-threaded runtime.
///
/// Node tasks and consensus rounds still interleave with the kernel loop, but
/// only at await points, so a seed always replays the same run.
pub struct ProtocolRunner {
    /// First seed of a batch
    seed: u64,

    /// Number of consecutive seeds per batch
    seeds: usize,

    runtime: Runtime,
}

impl ProtocolRunner {
    pub fn new(seed: u64) -> Result<Self, SimError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            seed,
            seeds: 1,
            runtime,
        })
    }

    /// Sets the number of seeds per batch.
    pub fn with_seeds(mut self, seeds: usize) -> Self {
        self.seeds = seeds.max(1);
        self
    }

    /// Runs `config` once with its own seed.
    pub fn run(&self, config: SimConfig) -> Result<RunReport, SimError> {
        let simulator = Simulator::new(config)?;
        self.runtime.block_on(simulator.run())
    }

    /// Runs `config` with seeds `seed, seed + 1, ...`.
    pub fn run_batch(&self, config: &SimConfig) -> Result<BatchResult, SimError> {
        let mut runs = Vec::with_capacity(self.seeds);
        for offset in 0..self.seeds {
            let seed = self.seed.wrapping_add(offset as u64);
            info!("Running {} (seed={})", config.algorithm_name, seed);
            runs.push(self.run(SimConfig {
                seed,
                ..config.clone()
            })?);
        }

        let mean = if runs.len() > 1 {
            let metrics: Vec<FinalMetrics> = runs.iter().map(|r| r.metrics.clone()).collect();
            FinalMetrics::average(&metrics)
        } else {
            None
        };
        Ok(BatchResult { runs, mean })
    }
}
