//! Derived candidate scores used for leader election and consensus.
//!
//! All scores read the trust matrix and a [`NodeSnapshot`]; none of them
//! mutate anything.

use crate::trust::TrustEngine;
use skytrust_env::{clamp, NodeSnapshot, Point};

/// PoRS = 0.5·meanIncomingTrust + 0.3·deliveryRatio + 0.2·energyRatio
pub fn pors_score(trust: &TrustEngine, candidate: &NodeSnapshot, initial_energy: f64) -> f64 {
    const W_TRUST: f64 = 0.5;
    const W_DELIVERY: f64 = 0.3;
    const W_ENERGY: f64 = 0.2;

    let trust_score = trust.mean_incoming_trust(candidate.id);
    let energy_ratio = if initial_energy > 0.0 {
        candidate.state.energy / initial_energy
    } else {
        0.0
    };
    W_TRUST * trust_score + W_DELIVERY * candidate.state.delivery_ratio() + W_ENERGY * energy_ratio
}

/// Blockchain leader score = 0.5·RF + 0.5·FF.
///
/// FF is the candidate's capacity relative to the strongest node in the swarm.
pub fn blockchain_leader_score(candidate: &NodeSnapshot, max_capacity: f64) -> f64 {
    let capacity_factor = if max_capacity > 0.0 {
        candidate.capacity / max_capacity
    } else {
        0.0
    };
    0.5 * candidate.state.reliability_factor() + 0.5 * capacity_factor
}

/// Stability-weighted blend used for cluster-head election: 0.3·PoRS + 0.7·RF.
pub fn unified_score(trust: &TrustEngine, candidate: &NodeSnapshot, initial_energy: f64) -> f64 {
    0.3 * pors_score(trust, candidate, initial_energy) + 0.7 * candidate.state.reliability_factor()
}

/// Performance-weighted blend used to pick a consensus proposer: 0.6·PoRS + 0.4·RF.
pub fn consensus_leader_score(
    trust: &TrustEngine,
    candidate: &NodeSnapshot,
    initial_energy: f64,
) -> f64 {
    0.6 * pors_score(trust, candidate, initial_energy) + 0.4 * candidate.state.reliability_factor()
}

/// Topological centrality: `1 - avgDistanceToPeers / radius`, clamped to [0, 1].
///
/// A candidate alone in its cluster is perfectly central.
pub fn topological_factor(candidate: Point, peers: &[Point], radius: f64) -> f64 {
    if peers.is_empty() || radius <= 0.0 {
        return 1.0;
    }
    let total: f64 = peers.iter().map(|p| candidate.distance(p)).sum();
    let average = total / peers.len() as f64;
    clamp(1.0 - average / radius, 0.0, 1.0)
}
