//! Common value types shared by every SkyTrust component.

use serde::{Deserialize, Serialize};

/// Maximum number of hops a packet may take before it is silently dropped.
pub const MAX_HOPS: u32 = 15;

/// Stable identifier of a node for the lifetime of a run.
///
/// Doubles as the node's index into the [`NodeArena`](crate::NodeArena)
/// and into the rows/columns of the trust matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Returns the arena index of this node.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Identifier of a cluster inside one partition.
///
/// Cluster ids are reassigned from 1 on every re-election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cluster-{}", self.0)
    }
}

/// A position in the 2D arena, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Returns this point clamped into the `[0, width] x [0, height]` arena.
    pub fn clamped(self, width: f64, height: f64) -> Self {
        Self {
            x: clamp(self.x, 0.0, width),
            y: clamp(self.y, 0.0, height),
        }
    }
}

/// Clamps `value` into `[min, max]`.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// A data packet travelling through the swarm.
///
/// Identity, endpoints and creation time are fixed at generation; only the
/// hop counter changes while the packet is relayed.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Unique packet id (per run)
    pub id: u64,

    /// Node that generated the packet
    pub source: NodeId,

    /// Final destination
    pub destination: NodeId,

    /// Simulated time of generation (seconds)
    pub created_at: f64,

    hops: u32,
}

impl Packet {
    /// Creates a fresh packet with zero hops.
    pub fn new(id: u64, source: NodeId, destination: NodeId, created_at: f64) -> Self {
        Self {
            id,
            source,
            destination,
            created_at,
            hops: 0,
        }
    }

    /// Number of transmissions performed so far.
    pub fn hops(&self) -> u32 {
        self.hops
    }

    /// Counts one more transmission.
    ///
    /// Returns `false` once the packet has exceeded [`MAX_HOPS`] and must be dropped.
    pub fn advance_hop(&mut self) -> bool {
        self.hops += 1;
        self.hops <= MAX_HOPS
    }
}

/// A block produced by a successful consensus round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: u64,
    pub proposer: NodeId,

    /// Simulated time at which the block is final (round start + latency)
    pub timestamp: f64,
}

/// Result of one observed interaction between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionOutcome {
    /// Successful delivery or forward
    Success,

    /// The target was caught dropping a packet on purpose
    MaliciousDrop,

    /// Link broke before transmission (target out of radio range)
    OutOfRange,

    /// No next hop could be found
    NoRoute,

    /// Hop limit exceeded
    PacketLoop,
}

impl InteractionOutcome {
    /// All outcomes, in declaration order.
    pub const ALL: [InteractionOutcome; 5] = [
        InteractionOutcome::Success,
        InteractionOutcome::MaliciousDrop,
        InteractionOutcome::OutOfRange,
        InteractionOutcome::NoRoute,
        InteractionOutcome::PacketLoop,
    ];

    /// Dense index used by per-outcome counters.
    pub fn index(self) -> usize {
        match self {
            InteractionOutcome::Success => 0,
            InteractionOutcome::MaliciousDrop => 1,
            InteractionOutcome::OutOfRange => 2,
            InteractionOutcome::NoRoute => 3,
            InteractionOutcome::PacketLoop => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InteractionOutcome::Success => "success",
            InteractionOutcome::MaliciousDrop => "malicious_drop",
            InteractionOutcome::OutOfRange => "out_of_range",
            InteractionOutcome::NoRoute => "no_route",
            InteractionOutcome::PacketLoop => "packet_loop",
        }
    }
}
