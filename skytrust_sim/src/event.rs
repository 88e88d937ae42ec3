//! Simulation events and the global time-ordered event queue.
//!
//! Events are ordered by:
//! 1. Time (earlier first)
//! 2. Sequence number (FIFO among equal times)
//!
//! The queue is shared by the kernel loop and the background tasks, so every
//! push and pop takes the queue lock for exactly one heap operation.

use parking_lot::Mutex;
use skytrust_core::HopTransport;
use skytrust_env::{Block, ClusterId, NodeId, Packet, SimError};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::{error, trace};

/// Event payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Random walk step of one node
    Mobility { node: NodeId },

    /// A node generates its next data packet
    PacketGeneration { node: NodeId },

    /// A packet reaches `node` and is handed to its inbox
    PacketArrival { node: NodeId, packet: Packet },

    /// Clusters are rebuilt and heads re-elected
    ClusterReelection { initial: bool },

    /// A consensus round starts in `cluster`
    ConsensusStart { cluster: ClusterId },

    /// A consensus round in `cluster` finished
    ConsensusEnd {
        cluster: ClusterId,
        block: Option<Block>,
    },
}

impl EventKind {
    /// Node the event addresses, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            EventKind::Mobility { node }
            | EventKind::PacketGeneration { node }
            | EventKind::PacketArrival { node, .. } => Some(*node),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Simulated time at which the event fires (seconds)
    pub time: f64,
    pub kind: EventKind,
}

/// Ordering key: time, then insertion sequence.
#[derive(Debug, Clone, Copy)]
pub struct EventKey {
    pub time: f64,
    pub sequence: u64,
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.total_cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct Entry {
    key: EventKey,
    event: Event,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<Entry>>,
    next_sequence: u64,

    /// Time of the most recently popped event
    last_popped: f64,

    /// Set once a corrupt event was pushed; the next pop aborts the run
    poisoned: Option<String>,
}

/// Thread-safe min-heap of events.
#[derive(Debug, Default)]
pub struct EventQueue {
    state: Mutex<QueueState>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an event and returns the time it was actually scheduled at.
    ///
    /// An event earlier than the last popped one (a background task lagging
    /// behind the kernel) is moved up to the last popped time. A non-finite
    /// time poisons the queue.
    pub fn push(&self, time: f64, kind: EventKind) -> f64 {
        let mut state = self.state.lock();

        if !time.is_finite() {
            error!("Rejected event {:?} with time {}", kind, time);
            state
                .poisoned
                .get_or_insert_with(|| format!("event {:?} scheduled at {}", kind, time));
            return time;
        }

        let time = if time < state.last_popped {
            trace!("Late event {:?} at {:.4} moved to {:.4}", kind, time, state.last_popped);
            state.last_popped
        } else {
            time
        };

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.heap.push(Reverse(Entry {
            key: EventKey { time, sequence },
            event: Event { time, kind },
        }));
        time
    }

    /// Removes the earliest event.
    ///
    /// Fails if a corrupt event was ever pushed.
    pub fn pop(&self) -> Result<Option<Event>, SimError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.poisoned {
            return Err(SimError::invariant(format!("corrupt event queue: {reason}")));
        }
        let Some(Reverse(entry)) = state.heap.pop() else {
            return Ok(None);
        };
        state.last_popped = entry.key.time;
        Ok(Some(entry.event))
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }
}

impl HopTransport for EventQueue {
    fn schedule_arrival(&self, receiver: NodeId, packet: Packet, at: f64) {
        self.push(at, EventKind::PacketArrival { node: receiver, packet });
    }
}
