//! Cluster formation and cluster-head election.
//!
//! ```text
//!   positions ──BFS over radius graph──▶ Partition.clusters
//!                                             │
//!   trust + node counters ──strategy score──▶ Partition.leaders
//!                                             │
//!                       node.cluster / node.is_leader (overwritten)
//! ```
//!
//! The partition is rebuilt from scratch on every re-election and swapped in
//! under a single write lock, which also covers the node role updates. A
//! reader that sees a node's new cluster id and then asks for the partition
//! gets the partition of the same election.

use crate::metrics::MetricsCollector;
use crate::scoring::{blockchain_leader_score, pors_score, topological_factor, unified_score};
use crate::trust::TrustEngine;
use parking_lot::RwLock;
use skytrust_env::{ChSelection, ClusterId, NodeArena, NodeId, NodeSnapshot, Point, SimConfig};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

/// Weight of the unified score in the unified strategy; the rest goes to centrality.
const UNIFIED_WEIGHT: f64 = 0.8;
const TOPOLOGY_WEIGHT: f64 = 0.2;

/// One complete clustering of the swarm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    /// Members per cluster, in ascending node id order
    pub clusters: BTreeMap<ClusterId, Vec<NodeId>>,

    /// Cluster of every node, indexed by node id
    pub membership: Vec<ClusterId>,

    /// Elected head per cluster; leaderless clusters are absent
    pub leaders: BTreeMap<ClusterId, NodeId>,
}

/// Groups nodes into connected components of the communication graph.
///
/// Two nodes are adjacent iff their distance is at most `radius`. Seeds are
/// visited in ascending node id order and cluster ids start at 1, so the same
/// positions always yield the same partition.
pub fn form_clusters(positions: &[Point], radius: f64) -> BTreeMap<ClusterId, Vec<NodeId>> {
    let n = positions.len();
    let mut visited = vec![false; n];
    let mut clusters = BTreeMap::new();
    let mut next_id = 1;

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut members = Vec::new();
        let mut queue = VecDeque::from([seed]);

        while let Some(current) = queue.pop_front() {
            members.push(NodeId(current));
            for neighbor in 0..n {
                if !visited[neighbor] && positions[current].distance(&positions[neighbor]) <= radius {
                    visited[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }

        members.sort();
        clusters.insert(ClusterId(next_id), members);
        next_id += 1;
    }

    clusters
}

/// Owns the current partition and runs re-elections.
#[derive(Debug, Default)]
pub struct ClusterEngine {
    partition: RwLock<Partition>,
}

impl ClusterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds clusters, elects a head per cluster and publishes roles.
    ///
    /// Returns the new leader map. Clusters without an energy-eligible member
    /// stay leaderless for this round.
    pub fn reelect(
        &self,
        time: f64,
        nodes: &NodeArena,
        trust: &TrustEngine,
        config: &SimConfig,
        metrics: &MetricsCollector,
    ) -> BTreeMap<ClusterId, NodeId> {
        let snapshots = nodes.snapshots();
        let positions: Vec<Point> = snapshots.iter().map(|s| s.state.position).collect();
        let clusters = form_clusters(&positions, config.communication_radius);

        let mut membership = vec![ClusterId(0); snapshots.len()];
        let mut leaders = BTreeMap::new();

        for (&cluster, members) in &clusters {
            for member in members {
                membership[member.index()] = cluster;
            }
            match elect_leader(members, &snapshots, nodes, trust, config) {
                Some(leader) => {
                    leaders.insert(cluster, leader);
                }
                None => debug!("t={:.2} {} has no eligible leader", time, cluster),
            }
        }

        info!(
            "t={:.2} Re-election: {} clusters, {} leaders",
            time,
            clusters.len(),
            leaders.len()
        );

        // Roles and partition change under one write lock; every node is
        // overwritten, one node lock at a time
        let mut partition = self.partition.write();
        for node in nodes.iter() {
            let cluster = membership[node.id.index()];
            let has_leader = leaders.contains_key(&cluster);
            let mut state = node.lock();
            state.is_leader = leaders.get(&cluster) == Some(&node.id);
            state.cluster = has_leader.then_some(cluster);
        }
        *partition = Partition {
            clusters,
            membership,
            leaders: leaders.clone(),
        };
        drop(partition);

        metrics.record_leadership(leaders.clone());
        leaders
    }

    /// Head of the cluster `node` belongs to, if that cluster has one.
    pub fn cluster_head_of(&self, node: NodeId) -> Option<NodeId> {
        let partition = self.partition.read();
        let cluster = partition.membership.get(node.index())?;
        partition.leaders.get(cluster).copied()
    }

    pub fn cluster_head(&self, cluster: ClusterId) -> Option<NodeId> {
        self.partition.read().leaders.get(&cluster).copied()
    }

    /// Members of `cluster`, empty if it does not exist.
    pub fn members(&self, cluster: ClusterId) -> Vec<NodeId> {
        self.partition
            .read()
            .clusters
            .get(&cluster)
            .cloned()
            .unwrap_or_default()
    }

    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.partition.read().clusters.keys().copied().collect()
    }

    pub fn partition(&self) -> Partition {
        self.partition.read().clone()
    }
}

/// Highest-scoring energy-eligible member; the first one seen wins ties.
fn elect_leader(
    members: &[NodeId],
    snapshots: &[NodeSnapshot],
    nodes: &NodeArena,
    trust: &TrustEngine,
    config: &SimConfig,
) -> Option<NodeId> {
    let mut best: Option<(NodeId, f64)> = None;

    for &candidate in members {
        let snapshot = &snapshots[candidate.index()];
        if snapshot.state.energy < config.energy_min {
            continue;
        }
        let score = candidate_score(snapshot, members, snapshots, nodes, trust, config);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }

    best.map(|(id, _)| id)
}

fn candidate_score(
    candidate: &NodeSnapshot,
    members: &[NodeId],
    snapshots: &[NodeSnapshot],
    nodes: &NodeArena,
    trust: &TrustEngine,
    config: &SimConfig,
) -> f64 {
    match config.ch_selection {
        ChSelection::MeanIncomingTrust => trust.mean_incoming_trust(candidate.id),
        ChSelection::Pors => pors_score(trust, candidate, config.initial_energy),
        ChSelection::Blockchain => blockchain_leader_score(candidate, nodes.max_capacity()),
        ChSelection::Unified => {
            let peers: Vec<Point> = members
                .iter()
                .filter(|&&m| m != candidate.id)
                .map(|m| snapshots[m.index()].state.position)
                .collect();
            let centrality =
                topological_factor(candidate.state.position, &peers, config.communication_radius);
            UNIFIED_WEIGHT * unified_score(trust, candidate, config.initial_energy)
                + TOPOLOGY_WEIGHT * centrality
        }
    }
}
