//! SkyTrust simulator CLI
//!
//! Runs one or all protocol presets over one or more seeds.

use clap::Parser;
use skytrust_env::{Protocol, SimConfig, SimError};
use skytrust_sim::{BatchResult, ProtocolRunner, RunExport};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// SkyTrust trust-aware drone swarm simulator
#[derive(Parser, Debug)]
#[command(name = "skytrust-sim")]
#[command(about = "Simulate trust, clustering and consensus in a drone swarm", long_about = None)]
struct Args {
    /// Protocol preset (btmsd, pors, pbft, pow, reputation, barc, all)
    #[arg(short, long, default_value = "all")]
    protocol: String,

    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds to run per protocol
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Number of drones
    #[arg(short, long)]
    nodes: Option<usize>,

    /// Fraction of malicious drones
    #[arg(short, long)]
    malicious: Option<f64>,

    /// Side of the square arena in meters (radius follows as side / 4)
    #[arg(short, long)]
    area: Option<f64>,

    /// Simulation horizon in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// JSON configuration file (replaces the protocol presets)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for scripting
    #[arg(long)]
    json: bool,

    /// Export run reports to a JSON file
    #[arg(long)]
    export: Option<String>,
}

impl Args {
    /// Base configurations to run, before CLI overrides.
    fn base_configs(&self) -> Result<Vec<SimConfig>, String> {
        if let Some(path) = &self.config {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
            let config: SimConfig = serde_json::from_str(&text)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(vec![config]);
        }

        if self.protocol == "all" {
            return Ok(Protocol::all().iter().map(Protocol::config).collect());
        }
        let protocol: Protocol = self.protocol.parse().map_err(|e| format!("{}", e))?;
        Ok(vec![protocol.config()])
    }

    fn apply_overrides(&self, mut config: SimConfig) -> SimConfig {
        if let Some(nodes) = self.nodes {
            config.num_nodes = nodes;
        }
        if let Some(ratio) = self.malicious {
            config.malicious_ratio = ratio;
        }
        if let Some(side) = self.area {
            config = config.with_area(side);
        }
        if let Some(duration) = self.duration {
            config.simulation_time = duration;
        }
        config
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("SkyTrust Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let configs = match args.base_configs() {
        Ok(configs) => configs,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Available protocols: btmsd, pors, pbft, pow, reputation, barc, all");
            std::process::exit(1);
        }
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let runner = match ProtocolRunner::new(base_seed) {
        Ok(runner) => runner.with_seeds(args.seeds),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let mut batches: Vec<BatchResult> = Vec::new();
    let mut failures: Vec<(String, SimError)> = Vec::new();

    for config in configs {
        let config = args.apply_overrides(config);
        match runner.run_batch(&config) {
            Ok(batch) => {
                if !args.json {
                    log_batch(&batch);
                }
                batches.push(batch);
            }
            Err(e) => {
                error!("✗ {} FAILED: {}", config.algorithm_name, e);
                failures.push((config.algorithm_name.clone(), e));
            }
        }
    }

    if let Some(path) = &args.export {
        let mut export = RunExport::new();
        for batch in &batches {
            for run in &batch.runs {
                export.add_run(run.clone());
            }
            if let Some(mean) = &batch.mean {
                export.add_mean(mean.clone());
            }
        }
        match export.write_to_file(path) {
            Ok(()) => info!("Exported {} runs to {}", export.runs.len(), path),
            Err(e) => error!("Failed to write export: {:?}", e),
        }
    }

    if args.json {
        let summary = serde_json::json!({
            "total": batches.iter().map(|b| b.runs.len()).sum::<usize>() + failures.len(),
            "failed": failures.len(),
            "results": batches.iter().flat_map(|b| b.runs.iter()).map(|r| {
                serde_json::json!({
                    "algorithm": r.algorithm,
                    "seed": r.seed,
                    "pdr": r.metrics.pdr,
                    "mean_delay": r.metrics.mean_delay,
                    "energy_efficiency": r.metrics.energy_efficiency,
                    "ch_churn_rate": r.metrics.ch_churn_rate,
                    "false_positives": r.metrics.false_positives,
                    "false_negatives": r.metrics.false_negatives,
                })
            }).collect::<Vec<_>>(),
            "means": batches.iter().filter_map(|b| b.mean.as_ref()).collect::<Vec<_>>(),
            "errors": failures.iter().map(|(name, e)| {
                serde_json::json!({ "algorithm": name, "error": e.to_string() })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failures.is_empty() {
            info!("✅ All {} protocol batches completed", batches.len());
        } else {
            error!("❌ {} protocol batches failed", failures.len());
        }
    }

    // Exit with proper code for scripts
    if !failures.is_empty() {
        std::process::exit(1);
    }
}

fn log_batch(batch: &BatchResult) {
    for run in &batch.runs {
        let m = &run.metrics;
        info!(
            "✓ {} (seed={}) PDR={:.3} delay={:.4}s eff={:.4}/J churn={:.2}/min FP={} FN={}",
            m.algorithm,
            run.seed,
            m.pdr,
            m.mean_delay,
            m.energy_efficiency,
            m.ch_churn_rate,
            m.false_positives,
            m.false_negatives
        );
    }
    if let Some(m) = &batch.mean {
        info!(
            "  mean over {} seeds: PDR={:.3} delay={:.4}s eff={:.4}/J churn={:.2}/min FP={} FN={}",
            batch.runs.len(),
            m.pdr,
            m.mean_delay,
            m.energy_efficiency,
            m.ch_churn_rate,
            m.false_positives,
            m.false_negatives
        );
    }
}
