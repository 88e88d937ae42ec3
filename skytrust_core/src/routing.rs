//! Greedy, trust-gated, cluster-aware packet routing.
//!
//! One call to [`Router::route`] moves a packet by at most one hop:
//!
//! ```text
//!   destination in range ─────────────────────────▶ direct
//!   same cluster          target = destination  ─┐
//!   other cluster         target = dest. head   ─┴▶ closest trusted neighbor
//!   no neighbor, other cluster ───────────────────▶ own cluster head
//!   otherwise ────────────────────────────────────▶ dropped
//! ```
//!
//! The router never touches the event queue directly; arrivals are handed to
//! a [`HopTransport`].

use crate::cluster::ClusterEngine;
use crate::metrics::MetricsCollector;
use crate::trust::TrustEngine;
use skytrust_env::{InteractionOutcome, NodeArena, NodeId, Packet, SimConfig};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Fixed per-hop processing delay (seconds).
pub const HOP_BASE_DELAY: f64 = 0.01;

/// Radio propagation speed (m/s).
pub const PROPAGATION_SPEED: f64 = 3.0e8;

/// Where scheduled hops go. The kernel turns each call into an arrival event.
pub trait HopTransport {
    fn schedule_arrival(&self, receiver: NodeId, packet: Packet, at: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The packet exceeded the hop limit
    PacketLoop,

    /// No trusted neighbor makes progress and no fallback exists
    NoRoute,

    /// The chosen hop was out of radio range
    OutOfRange,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::PacketLoop => write!(f, "hop limit exceeded"),
            DropReason::NoRoute => write!(f, "no route"),
            DropReason::OutOfRange => write!(f, "next hop out of range"),
        }
    }
}

/// Result of one routing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Sent straight to the destination
    Direct(NodeId),

    /// Sent to a trusted neighbor closer to the target
    Relayed(NodeId),

    /// Sent to the sender's own cluster head as a last resort
    Escalated(NodeId),

    Dropped(DropReason),
}

/// Stateless router over the shared swarm state.
#[derive(Debug, Clone)]
pub struct Router {
    nodes: Arc<NodeArena>,
    trust: Arc<TrustEngine>,
    clusters: Arc<ClusterEngine>,
    metrics: Arc<MetricsCollector>,
    config: Arc<SimConfig>,
}

impl Router {
    pub fn new(
        nodes: Arc<NodeArena>,
        trust: Arc<TrustEngine>,
        clusters: Arc<ClusterEngine>,
        metrics: Arc<MetricsCollector>,
        config: Arc<SimConfig>,
    ) -> Self {
        Self {
            nodes,
            trust,
            clusters,
            metrics,
            config,
        }
    }

    /// Transmits `packet` from `sender` one hop closer to its destination.
    pub fn route(
        &self,
        sender: NodeId,
        mut packet: Packet,
        now: f64,
        transport: &dyn HopTransport,
    ) -> RouteOutcome {
        let config = &self.config;
        let sender_node = self.nodes.node(sender);
        sender_node.debit_energy(config.energy_tx);
        self.metrics.record_energy(config.energy_tx);

        if !packet.advance_hop() {
            trace!("t={:.3} packet {} dropped at {}: hop limit", now, packet.id, sender);
            return RouteOutcome::Dropped(DropReason::PacketLoop);
        }

        let destination = packet.destination;
        let (sender_pos, sender_cluster) = {
            let state = sender_node.lock();
            (state.position, state.cluster)
        };
        let (dest_pos, dest_cluster) = {
            let state = self.nodes.node(destination).lock();
            (state.position, state.cluster)
        };

        if sender_pos.distance(&dest_pos) <= config.communication_radius {
            if sender != packet.source {
                self.trust
                    .record_interaction(sender, destination, InteractionOutcome::Success, now);
            }
            return self
                .send_to_next_hop(sender, destination, packet, now, transport)
                .unwrap_or(RouteOutcome::Direct(destination));
        }

        let intra_cluster = sender_cluster.is_some() && sender_cluster == dest_cluster;
        let target = if intra_cluster {
            destination
        } else {
            self.clusters.cluster_head_of(destination).unwrap_or(destination)
        };
        let target_pos = self.nodes.node(target).position();

        // Strictly closer than the sender itself; first-seen wins ties
        let mut best: Option<NodeId> = None;
        let mut best_distance = sender_pos.distance(&target_pos);
        for candidate in self.nodes.iter() {
            if candidate.id == sender || candidate.id == destination {
                continue;
            }
            let position = candidate.position();
            if sender_pos.distance(&position) > config.communication_radius {
                continue;
            }
            if self.trust.trust(sender, candidate.id) < config.trust_threshold {
                continue;
            }
            let remaining = position.distance(&target_pos);
            if remaining < best_distance {
                best_distance = remaining;
                best = Some(candidate.id);
            }
        }

        if let Some(next_hop) = best {
            self.trust
                .record_interaction(sender, next_hop, InteractionOutcome::Success, now);
            return self
                .send_to_next_hop(sender, next_hop, packet, now, transport)
                .unwrap_or(RouteOutcome::Relayed(next_hop));
        }

        if !intra_cluster {
            if let Some(head) = self.clusters.cluster_head_of(sender).filter(|&h| h != sender) {
                self.trust
                    .record_interaction(sender, head, InteractionOutcome::Success, now);
                return self
                    .send_to_next_hop(sender, head, packet, now, transport)
                    .unwrap_or(RouteOutcome::Escalated(head));
            }
        }

        trace!("t={:.3} packet {} dropped at {}: no route", now, packet.id, sender);
        RouteOutcome::Dropped(DropReason::NoRoute)
    }

    /// Schedules the arrival of `packet` at `receiver` after the hop delay.
    ///
    /// Returns `Some(Dropped)` and records an out-of-range interaction if the
    /// receiver cannot be reached, `None` once the arrival is scheduled.
    pub fn send_to_next_hop(
        &self,
        sender: NodeId,
        receiver: NodeId,
        packet: Packet,
        now: f64,
        transport: &dyn HopTransport,
    ) -> Option<RouteOutcome> {
        let distance = self
            .nodes
            .node(sender)
            .position()
            .distance(&self.nodes.node(receiver).position());

        if distance > self.config.communication_radius {
            self.trust
                .record_interaction(sender, receiver, InteractionOutcome::OutOfRange, now);
            return Some(RouteOutcome::Dropped(DropReason::OutOfRange));
        }

        let at = now + HOP_BASE_DELAY + distance / PROPAGATION_SPEED;
        transport.schedule_arrival(receiver, packet, at);
        None
    }
}
