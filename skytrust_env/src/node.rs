//! Node records and the arena that owns them.
//!
//! Every node's mutable fields sit behind their own lock. Callers must never
//! hold two node locks at once; cross-node operations take [`NodeSnapshot`]s
//! one node at a time instead.

use crate::config::SimConfig;
use crate::types::{ClusterId, NodeId, Point};
use parking_lot::{Mutex, MutexGuard};
use rand::Rng;

/// Mutable per-node state, guarded by the node's lock.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    /// Current position (moved by the mobility event)
    pub position: Point,

    /// Remaining energy in joules (never recharged)
    pub energy: f64,

    /// Cluster this node belongs to, if its cluster elected a leader
    pub cluster: Option<ClusterId>,

    /// Whether this node currently heads its cluster
    pub is_leader: bool,

    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_forwarded: u64,
    pub packets_dropped: u64,

    /// Consensus rounds this node took part in
    pub consensus_rounds: u64,

    /// Blocks this node proposed that were accepted
    pub valid_blocks_proposed: u64,
}

impl NodeState {
    fn new(position: Point, energy: f64) -> Self {
        Self {
            position,
            energy,
            cluster: None,
            is_leader: false,
            packets_sent: 0,
            packets_delivered: 0,
            packets_forwarded: 0,
            packets_dropped: 0,
            consensus_rounds: 0,
            valid_blocks_proposed: 0,
        }
    }

    /// Fraction of sent packets that reached their destination.
    ///
    /// Defaults to 1.0 for a node that has not sent anything yet.
    pub fn delivery_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            1.0
        } else {
            self.packets_delivered as f64 / self.packets_sent as f64
        }
    }

    /// Consensus reliability factor (RF): valid proposals per round.
    ///
    /// Neutral 0.5 for a node that never participated.
    pub fn reliability_factor(&self) -> f64 {
        if self.consensus_rounds == 0 {
            0.5
        } else {
            (self.valid_blocks_proposed as f64 / self.consensus_rounds as f64).clamp(0.0, 1.0)
        }
    }
}

/// One simulated drone.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,

    /// Assigned at construction, never changes
    pub malicious: bool,

    /// Computational capacity (Gflops), never changes
    pub capacity: f64,

    state: Mutex<NodeState>,
}

impl Node {
    pub fn new(id: NodeId, malicious: bool, capacity: f64, position: Point, energy: f64) -> Self {
        Self {
            id,
            malicious,
            capacity,
            state: Mutex::new(NodeState::new(position, energy)),
        }
    }

    /// Acquires this node's lock.
    pub fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock()
    }

    /// Copies the node's current state out from under its lock.
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            malicious: self.malicious,
            capacity: self.capacity,
            state: self.state.lock().clone(),
        }
    }

    pub fn position(&self) -> Point {
        self.state.lock().position
    }

    pub fn energy(&self) -> f64 {
        self.state.lock().energy
    }

    /// Spends `amount` joules.
    pub fn debit_energy(&self, amount: f64) {
        self.state.lock().energy -= amount;
    }
}

/// Point-in-time copy of a node, safe to use without holding any lock.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub malicious: bool,
    pub capacity: f64,
    pub state: NodeState,
}

/// Owns every node of a run, addressed by [`NodeId`].
#[derive(Debug)]
pub struct NodeArena {
    nodes: Vec<Node>,
    max_capacity: f64,
}

impl NodeArena {
    /// Wraps pre-built nodes. Node `i` must carry id `NodeId(i)`.
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        debug_assert!(nodes.iter().enumerate().all(|(i, n)| n.id == NodeId(i)));
        let max_capacity = nodes.iter().map(|n| n.capacity).fold(0.0, f64::max);
        Self {
            nodes,
            max_capacity,
        }
    }

    /// Places `config.num_nodes` nodes uniformly at random in the arena.
    ///
    /// The first `floor(num_nodes * malicious_ratio)` ids are malicious.
    pub fn generate<R: Rng + ?Sized>(config: &SimConfig, rng: &mut R) -> Self {
        let malicious_count = (config.num_nodes as f64 * config.malicious_ratio) as usize;
        let nodes = (0..config.num_nodes)
            .map(|i| {
                let position = Point::new(
                    rng.gen::<f64>() * config.area_width,
                    rng.gen::<f64>() * config.area_height,
                );
                let capacity = config.min_capacity
                    + rng.gen::<f64>() * (config.max_capacity - config.min_capacity);
                Node::new(
                    NodeId(i),
                    i < malicious_count,
                    capacity,
                    position,
                    config.initial_energy,
                )
            })
            .collect();
        Self::from_nodes(nodes)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Returns the node with `id`.
    ///
    /// # Panics
    /// If `id` was not issued by this arena.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Current positions of all nodes, indexed by node id.
    pub fn positions(&self) -> Vec<Point> {
        self.nodes.iter().map(Node::position).collect()
    }

    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        self.nodes.iter().map(Node::snapshot).collect()
    }

    /// Largest computational capacity in the swarm.
    pub fn max_capacity(&self) -> f64 {
        self.max_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_generate_assigns_malicious_prefix() {
        let config = SimConfig {
            num_nodes: 10,
            malicious_ratio: 0.3,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let arena = NodeArena::generate(&config, &mut rng);

        assert_eq!(arena.len(), 10);
        let malicious: Vec<usize> = arena
            .iter()
            .filter(|n| n.malicious)
            .map(|n| n.id.index())
            .collect();
        assert_eq!(malicious, vec![0, 1, 2]);
    }

    #[test]
    fn test_generate_respects_bounds() {
        let config = SimConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let arena = NodeArena::generate(&config, &mut rng);

        for node in arena.iter() {
            let p = node.position();
            assert!(p.x >= 0.0 && p.x <= config.area_width);
            assert!(p.y >= 0.0 && p.y <= config.area_height);
            assert!(node.capacity >= config.min_capacity && node.capacity <= config.max_capacity);
            assert_eq!(node.energy(), config.initial_energy);
        }
        assert!(arena.max_capacity() <= config.max_capacity);
    }

    #[test]
    fn test_ratios_default_to_neutral() {
        let node = Node::new(NodeId(0), false, 1.0, Point::default(), 100.0);
        let snap = node.snapshot();
        assert_eq!(snap.state.delivery_ratio(), 1.0);
        assert_eq!(snap.state.reliability_factor(), 0.5);

        {
            let mut state = node.lock();
            state.packets_sent = 4;
            state.packets_delivered = 1;
            state.consensus_rounds = 2;
            state.valid_blocks_proposed = 2;
        }
        let snap = node.snapshot();
        assert_eq!(snap.state.delivery_ratio(), 0.25);
        assert_eq!(snap.state.reliability_factor(), 1.0);
    }

    #[test]
    fn test_debit_energy() {
        let node = Node::new(NodeId(0), false, 1.0, Point::default(), 10.0);
        node.debit_energy(0.5);
        node.debit_energy(0.1);
        assert!((node.energy() - 9.4).abs() < 1e-12);
    }
}
