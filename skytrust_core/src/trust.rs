//! The "TRUST" Engine - pairwise trust between swarm nodes
//!
//! Owns an N×N matrix of trust values in [0, 1] (one row per observer) and a
//! parallel matrix of last-update times. All writes go through
//! [`TrustEngine::record_interaction`] and are serialized by one write lock;
//! reads share a read lock.
//!
//! # Models
//!
//! ```text
//! Simple          new = (1-α)·old + α·obs                 obs ∈ {0, 1}
//! Complex         new = 0.5·direct + 0.3·recommended + 0.2·historical
//! TrustByDefault  proven drop → old/2, success → +0.01 up to the initial ceiling
//! ```

use parking_lot::RwLock;
use skytrust_env::{clamp, InteractionOutcome, NodeId, SimConfig, TrustModel};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// EMA weight applied to a proven malicious drop in the complex model.
const MALICIOUS_DROP_ALPHA: f64 = 0.7;

/// Complex model blend weights (direct, recommended, historical).
const W_DIRECT: f64 = 0.5;
const W_RECOMMENDED: f64 = 0.3;
const W_HISTORICAL: f64 = 0.2;

/// Per-success recovery step of the trust-by-default model.
const RECOVERY_STEP: f64 = 0.01;

/// Model parameters taken from the run configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustParams {
    /// EMA factor α
    pub alpha: f64,

    /// Initial off-diagonal trust, also the recovery ceiling
    pub initial_trust: f64,

    /// Historical decay rate λ
    pub lambda_decay: f64,
}

impl TrustParams {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            alpha: config.alpha_trust,
            initial_trust: config.initial_trust,
            lambda_decay: config.lambda_decay,
        }
    }
}

/// Dense trust and last-update matrices.
#[derive(Debug, Clone)]
pub struct TrustMatrix {
    size: usize,
    values: Vec<f64>,
    last_update: Vec<f64>,
}

impl TrustMatrix {
    /// Diagonal 1.0, everything else `initial_trust`, all stamps at t = 0.
    pub fn new(size: usize, initial_trust: f64) -> Self {
        let mut values = vec![initial_trust; size * size];
        for i in 0..size {
            values[i * size + i] = 1.0;
        }
        Self {
            size,
            values,
            last_update: vec![0.0; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, observer: usize, target: usize) -> f64 {
        self.values[observer * self.size + target]
    }

    pub fn last_update(&self, observer: usize, target: usize) -> f64 {
        self.last_update[observer * self.size + target]
    }

    fn set(&mut self, observer: usize, target: usize, value: f64) {
        self.values[observer * self.size + target] = value;
    }

    fn stamp(&mut self, observer: usize, target: usize, time: f64) {
        self.last_update[observer * self.size + target] = time;
    }

    /// Applies one interaction under `model`. The diagonal is never touched.
    fn apply(
        &mut self,
        model: TrustModel,
        params: &TrustParams,
        observer: usize,
        target: usize,
        outcome: InteractionOutcome,
        time: f64,
    ) {
        if observer == target {
            return;
        }
        match model {
            TrustModel::Simple => {
                let value = simple_update(self.get(observer, target), outcome, params.alpha);
                self.set(observer, target, value);
            }
            TrustModel::Complex => {
                let direct = direct_trust(self.get(observer, target), outcome, params.alpha);
                let recommended = self.recommended_trust(observer, target);
                let historical = self.historical_trust(observer, target, time, params.lambda_decay);
                let value = clamp(
                    W_DIRECT * direct + W_RECOMMENDED * recommended + W_HISTORICAL * historical,
                    0.0,
                    1.0,
                );
                self.set(observer, target, value);
                self.stamp(observer, target, time);
            }
            TrustModel::TrustByDefault => {
                let value =
                    trust_by_default_update(self.get(observer, target), outcome, params.initial_trust);
                self.set(observer, target, value);
            }
        }
    }

    /// Σ(trust[obs][k] · trust[k][tgt]) / Σ trust[obs][k] over every third party k.
    ///
    /// Falls back to the current value when nobody is trusted at all.
    fn recommended_trust(&self, observer: usize, target: usize) -> f64 {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for k in 0..self.size {
            if k == observer || k == target {
                continue;
            }
            let in_recommender = self.get(observer, k);
            numerator += in_recommender * self.get(k, target);
            denominator += in_recommender;
        }
        if denominator == 0.0 {
            self.get(observer, target)
        } else {
            numerator / denominator
        }
    }

    fn historical_trust(&self, observer: usize, target: usize, time: f64, lambda: f64) -> f64 {
        let elapsed = time - self.last_update(observer, target);
        self.get(observer, target) * (-lambda * elapsed).exp()
    }
}

/// Simple model: only success vs. anything else is distinguished.
pub fn simple_update(old: f64, outcome: InteractionOutcome, alpha: f64) -> f64 {
    let observation = if outcome == InteractionOutcome::Success { 1.0 } else { 0.0 };
    clamp((1.0 - alpha) * old + alpha * observation, 0.0, 1.0)
}

/// Direct component of the complex model.
///
/// Neutral failures (range, routing, loops) leave it at the old value.
pub fn direct_trust(old: f64, outcome: InteractionOutcome, alpha: f64) -> f64 {
    let (alpha, observation) = match outcome {
        InteractionOutcome::Success => (alpha, 1.0),
        InteractionOutcome::MaliciousDrop => (MALICIOUS_DROP_ALPHA, 0.0),
        _ => return old,
    };
    clamp((1.0 - alpha) * old + alpha * observation, 0.0, 1.0)
}

/// Trust-by-default model: punish proven drops, slowly forgive otherwise.
pub fn trust_by_default_update(old: f64, outcome: InteractionOutcome, ceiling: f64) -> f64 {
    match outcome {
        InteractionOutcome::MaliciousDrop => old * 0.5,
        InteractionOutcome::Success if old < ceiling => clamp(old + RECOVERY_STEP, 0.0, ceiling),
        _ => old,
    }
}

/// Thread-safe owner of the trust matrix.
#[derive(Debug)]
pub struct TrustEngine {
    model: TrustModel,
    params: TrustParams,
    matrix: RwLock<TrustMatrix>,

    /// Recorded interactions per outcome
    ledger: [AtomicU64; 5],
}

impl TrustEngine {
    pub fn new(num_nodes: usize, model: TrustModel, params: TrustParams) -> Self {
        Self {
            model,
            params,
            matrix: RwLock::new(TrustMatrix::new(num_nodes, params.initial_trust)),
            ledger: Default::default(),
        }
    }

    /// Builds an engine sized and parameterized for `config`.
    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(config.num_nodes, config.trust_model, TrustParams::from_config(config))
    }

    /// Updates `observer`'s trust in `target` after one interaction.
    ///
    /// The single write entry point of the matrix.
    pub fn record_interaction(
        &self,
        observer: NodeId,
        target: NodeId,
        outcome: InteractionOutcome,
        time: f64,
    ) {
        if observer == target {
            return;
        }
        self.ledger[outcome.index()].fetch_add(1, Ordering::Relaxed);

        let mut matrix = self.matrix.write();
        let before = matrix.get(observer.index(), target.index());
        matrix.apply(self.model, &self.params, observer.index(), target.index(), outcome, time);
        trace!(
            "t={:.3} {} -> {} {:?}: {:.3} -> {:.3}",
            time,
            observer,
            target,
            outcome,
            before,
            matrix.get(observer.index(), target.index())
        );
    }

    /// Current trust of `observer` in `target`.
    pub fn trust(&self, observer: NodeId, target: NodeId) -> f64 {
        self.matrix.read().get(observer.index(), target.index())
    }

    /// Average trust every other node places in `candidate`.
    pub fn mean_incoming_trust(&self, candidate: NodeId) -> f64 {
        let matrix = self.matrix.read();
        let n = matrix.size();
        if n <= 1 {
            return 0.0;
        }
        let sum: f64 = (0..n)
            .filter(|&i| i != candidate.index())
            .map(|i| matrix.get(i, candidate.index()))
            .sum();
        sum / (n - 1) as f64
    }

    /// How many interactions with `outcome` have been recorded so far.
    pub fn interaction_count(&self, outcome: InteractionOutcome) -> u64 {
        self.ledger[outcome.index()].load(Ordering::Relaxed)
    }

    /// Copy of the current matrices.
    pub fn snapshot(&self) -> TrustMatrix {
        self.matrix.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn params() -> TrustParams {
        TrustParams {
            alpha: 0.3,
            initial_trust: 0.5,
            lambda_decay: 0.1,
        }
    }

    #[test]
    fn test_initial_matrix() {
        let engine = TrustEngine::new(3, TrustModel::Simple, params());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.5 };
                assert_eq!(engine.trust(NodeId(i), NodeId(j)), expected);
            }
        }
    }

    #[test]
    fn test_simple_model_ema() {
        let engine = TrustEngine::new(2, TrustModel::Simple, params());

        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::Success, 1.0);
        assert_relative_eq!(engine.trust(NodeId(0), NodeId(1)), 0.65);

        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::OutOfRange, 2.0);
        assert_relative_eq!(engine.trust(NodeId(0), NodeId(1)), 0.455);

        // Other direction untouched
        assert_eq!(engine.trust(NodeId(1), NodeId(0)), 0.5);
    }

    #[test]
    fn test_complex_model_components() {
        let engine = TrustEngine::new(3, TrustModel::Complex, params());

        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::MaliciousDrop, 2.0);

        // direct: 0.3 * 0.5 = 0.15
        // recommended: only k = 2 -> 0.5 * 0.5 / 0.5 = 0.5
        // historical: 0.5 * e^(-0.2)
        let expected = 0.5 * 0.15 + 0.3 * 0.5 + 0.2 * 0.5 * (-0.2f64).exp();
        assert_relative_eq!(engine.trust(NodeId(0), NodeId(1)), expected, epsilon = 1e-12);
        assert_eq!(engine.snapshot().last_update(0, 1), 2.0);
    }

    #[test]
    fn test_complex_model_neutral_failure_keeps_direct() {
        let old = 0.42;
        assert_eq!(direct_trust(old, InteractionOutcome::NoRoute, 0.3), old);
        assert_relative_eq!(direct_trust(old, InteractionOutcome::Success, 0.3), 0.7 * old + 0.3);
    }

    #[test]
    fn test_recommended_falls_back_without_trusted_peers() {
        let mut matrix = TrustMatrix::new(3, 0.0);
        matrix.set(0, 1, 0.4);
        assert_eq!(matrix.recommended_trust(0, 1), 0.4);
    }

    #[test]
    fn test_trust_by_default_model() {
        let engine = TrustEngine::new(2, TrustModel::TrustByDefault, params());

        // Already at the ceiling: success does nothing
        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::Success, 1.0);
        assert_eq!(engine.trust(NodeId(0), NodeId(1)), 0.5);

        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::MaliciousDrop, 2.0);
        assert_eq!(engine.trust(NodeId(0), NodeId(1)), 0.25);

        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::Success, 3.0);
        assert_relative_eq!(engine.trust(NodeId(0), NodeId(1)), 0.26);

        // Neutral failures leave trust alone
        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::OutOfRange, 4.0);
        assert_relative_eq!(engine.trust(NodeId(0), NodeId(1)), 0.26);
    }

    #[test]
    fn test_simple_model_leaves_stamps() {
        let engine = TrustEngine::new(2, TrustModel::Simple, params());
        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::Success, 3.0);
        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::MaliciousDrop, 7.5);

        assert!(engine.trust(NodeId(0), NodeId(1)) != 0.5);
        assert_eq!(engine.snapshot().last_update(0, 1), 0.0);
    }

    #[test]
    fn test_trust_by_default_model_leaves_stamps() {
        let engine = TrustEngine::new(2, TrustModel::TrustByDefault, params());
        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::MaliciousDrop, 3.0);
        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::Success, 7.5);

        assert_relative_eq!(engine.trust(NodeId(0), NodeId(1)), 0.26);
        assert_eq!(engine.snapshot().last_update(0, 1), 0.0);
    }

    #[test]
    fn test_recovery_capped_at_ceiling() {
        assert_eq!(trust_by_default_update(0.895, InteractionOutcome::Success, 0.9), 0.9);
    }

    #[test]
    fn test_self_interaction_ignored() {
        let engine = TrustEngine::new(2, TrustModel::Simple, params());
        engine.record_interaction(NodeId(1), NodeId(1), InteractionOutcome::MaliciousDrop, 1.0);
        assert_eq!(engine.trust(NodeId(1), NodeId(1)), 1.0);
        assert_eq!(engine.interaction_count(InteractionOutcome::MaliciousDrop), 0);
    }

    #[test]
    fn test_mean_incoming_trust() {
        let engine = TrustEngine::new(3, TrustModel::Simple, params());
        engine.record_interaction(NodeId(0), NodeId(2), InteractionOutcome::Success, 1.0);
        // (0.65 + 0.5) / 2
        assert_relative_eq!(engine.mean_incoming_trust(NodeId(2)), 0.575);

        let lonely = TrustEngine::new(1, TrustModel::Simple, params());
        assert_eq!(lonely.mean_incoming_trust(NodeId(0)), 0.0);
    }

    #[test]
    fn test_ledger_counts_outcomes() {
        let engine = TrustEngine::new(2, TrustModel::Simple, params());
        engine.record_interaction(NodeId(0), NodeId(1), InteractionOutcome::Success, 1.0);
        engine.record_interaction(NodeId(1), NodeId(0), InteractionOutcome::Success, 1.0);
        engine.record_interaction(NodeId(1), NodeId(0), InteractionOutcome::OutOfRange, 1.0);

        assert_eq!(engine.interaction_count(InteractionOutcome::Success), 2);
        assert_eq!(engine.interaction_count(InteractionOutcome::OutOfRange), 1);
        assert_eq!(engine.interaction_count(InteractionOutcome::MaliciousDrop), 0);
    }

    fn any_model() -> impl Strategy<Value = TrustModel> {
        prop_oneof![
            Just(TrustModel::Simple),
            Just(TrustModel::Complex),
            Just(TrustModel::TrustByDefault),
        ]
    }

    fn any_outcome() -> impl Strategy<Value = InteractionOutcome> {
        (0usize..5).prop_map(|i| InteractionOutcome::ALL[i])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn trust_stays_in_unit_interval(
            model in any_model(),
            alpha in 0.01f64..=1.0,
            initial in 0.0f64..=1.0,
            lambda in 0.0f64..2.0,
            updates in prop::collection::vec((0usize..4, 0usize..4, any_outcome(), 0.0f64..50.0), 1..120),
        ) {
            let params = TrustParams { alpha, initial_trust: initial, lambda_decay: lambda };
            let engine = TrustEngine::new(4, model, params);

            let mut time = 0.0;
            for (obs, tgt, outcome, dt) in updates {
                time += dt;
                engine.record_interaction(NodeId(obs), NodeId(tgt), outcome, time);
            }

            let matrix = engine.snapshot();
            for i in 0..4 {
                for j in 0..4 {
                    let value = matrix.get(i, j);
                    if i == j {
                        prop_assert_eq!(value, 1.0);
                    } else {
                        prop_assert!((0.0..=1.0).contains(&value), "trust[{}][{}] = {}", i, j, value);
                    }
                }
            }
        }
    }
}
