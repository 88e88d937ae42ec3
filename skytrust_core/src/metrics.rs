//! Run metrics: raw counters collected during a run and the final summary.

use crate::trust::TrustEngine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use skytrust_env::{ClusterId, NodeArena, NodeId, SimConfig};
use std::collections::BTreeMap;

/// Raw counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorSnapshot {
    pub packets_sent: u64,
    pub packets_delivered: u64,

    /// Sum of end-to-end delays of delivered packets (seconds)
    pub total_delay: f64,

    /// Joules spent on transmission, reception and consensus
    pub energy_consumed: f64,

    /// Leader changes across re-elections
    pub leadership_changes: u64,

    pub consensus_rounds: u64,
    pub consensus_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    totals: CollectorSnapshot,
    last_leaders: BTreeMap<ClusterId, NodeId>,
}

/// Thread-safe collector fed by the kernel, node tasks and engines.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    inner: Mutex<Counters>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet_sent(&self) {
        self.inner.lock().totals.packets_sent += 1;
    }

    pub fn record_packet_delivered(&self, delay: f64) {
        let mut inner = self.inner.lock();
        inner.totals.packets_delivered += 1;
        inner.totals.total_delay += delay;
    }

    pub fn record_energy(&self, joules: f64) {
        self.inner.lock().totals.energy_consumed += joules;
    }

    pub fn record_consensus_round(&self, succeeded: bool) {
        let mut inner = self.inner.lock();
        inner.totals.consensus_rounds += 1;
        if !succeeded {
            inner.totals.consensus_failures += 1;
        }
    }

    /// Compares the freshly elected leaders with the previous election.
    ///
    /// The first non-empty report only sets the baseline. Afterwards every
    /// cluster whose leader differs, or that did not exist before, counts as
    /// one change. Returns the number of changes counted.
    pub fn record_leadership(&self, leaders: BTreeMap<ClusterId, NodeId>) -> u64 {
        let mut inner = self.inner.lock();
        if inner.last_leaders.is_empty() {
            inner.last_leaders = leaders;
            return 0;
        }
        let changes = leaders
            .iter()
            .filter(|(cluster, leader)| inner.last_leaders.get(cluster) != Some(leader))
            .count() as u64;
        inner.totals.leadership_changes += changes;
        inner.last_leaders = leaders;
        changes
    }

    pub fn snapshot(&self) -> CollectorSnapshot {
        self.inner.lock().totals.clone()
    }
}

/// Summary of one run, as handed to reporters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalMetrics {
    pub algorithm: String,

    /// Packet delivery ratio
    pub pdr: f64,

    /// Mean end-to-end delay of delivered packets (seconds)
    pub mean_delay: f64,

    /// Delivered packets per joule consumed
    pub energy_efficiency: f64,

    /// Cluster-head changes per simulated minute
    pub ch_churn_rate: f64,

    /// Honest nodes trusted below the threshold (pairwise)
    pub false_positives: u64,

    /// Malicious nodes trusted at or above the threshold (pairwise)
    pub false_negatives: u64,
}

impl FinalMetrics {
    /// Derives the summary from the collector and the final swarm state.
    pub fn compute(
        collector: &CollectorSnapshot,
        nodes: &NodeArena,
        trust: &TrustEngine,
        config: &SimConfig,
        final_time: f64,
    ) -> Self {
        let mut metrics = FinalMetrics {
            algorithm: config.algorithm_name.clone(),
            ..Default::default()
        };

        if collector.packets_sent > 0 {
            metrics.pdr = collector.packets_delivered as f64 / collector.packets_sent as f64;
        }
        if collector.packets_delivered > 0 {
            metrics.mean_delay = collector.total_delay / collector.packets_delivered as f64;
        }

        let consumed: f64 = nodes.iter().map(|n| config.initial_energy - n.energy()).sum();
        if consumed > 0.0 {
            metrics.energy_efficiency = collector.packets_delivered as f64 / consumed;
        }

        let minutes = final_time / 60.0;
        if minutes > 0.0 {
            metrics.ch_churn_rate = collector.leadership_changes as f64 / minutes;
        }

        for observer in nodes.ids() {
            for target in nodes.iter() {
                if observer == target.id {
                    continue;
                }
                let trusted = trust.trust(observer, target.id) >= config.trust_threshold;
                match (target.malicious, trusted) {
                    (false, false) => metrics.false_positives += 1,
                    (true, true) => metrics.false_negatives += 1,
                    _ => {}
                }
            }
        }

        metrics
    }

    /// Field-wise mean of several runs; counts are truncated.
    pub fn average(runs: &[FinalMetrics]) -> Option<FinalMetrics> {
        let first = runs.first()?;
        let n = runs.len() as f64;
        let mean = |f: fn(&FinalMetrics) -> f64| runs.iter().map(f).sum::<f64>() / n;
        Some(FinalMetrics {
            algorithm: first.algorithm.clone(),
            pdr: mean(|m| m.pdr),
            mean_delay: mean(|m| m.mean_delay),
            energy_efficiency: mean(|m| m.energy_efficiency),
            ch_churn_rate: mean(|m| m.ch_churn_rate),
            false_positives: mean(|m| m.false_positives as f64) as u64,
            false_negatives: mean(|m| m.false_negatives as f64) as u64,
        })
    }
}
