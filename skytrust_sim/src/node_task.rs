//! The long-lived task behind every node's inbound packet queue.

use crate::event::EventQueue;
use crate::quiescence::WorkGuard;
use rand::Rng;
use skytrust_core::{MetricsCollector, Router, TrustEngine};
use skytrust_env::{InteractionOutcome, NodeArena, NodeId, Packet, SimConfig, SimRng};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// A packet handed from the kernel to a node inbox.
#[derive(Debug)]
pub struct Delivery {
    pub packet: Packet,

    /// Simulated arrival time
    pub at: f64,

    /// Keeps the kernel from declaring quiescence until the packet is handled
    pub work: WorkGuard,
}

/// Everything a node task needs, owned by the task.
pub struct NodeTask {
    pub id: NodeId,
    pub nodes: Arc<NodeArena>,
    pub trust: Arc<TrustEngine>,
    pub metrics: Arc<MetricsCollector>,
    pub router: Router,
    pub queue: Arc<EventQueue>,
    pub config: Arc<SimConfig>,
    pub rng: SimRng,
}

impl NodeTask {
    /// Drains the inbox until the kernel closes it.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<Delivery>) {
        while let Some(delivery) = inbox.recv().await {
            self.handle(delivery.packet, delivery.at);
            drop(delivery.work);
        }
        trace!("{} inbox closed", self.id);
    }

    /// Receive cost, malicious drop, then delivery or forwarding.
    fn handle(&mut self, packet: Packet, now: f64) {
        let node = self.nodes.node(self.id);
        node.debit_energy(self.config.energy_rx);
        self.metrics.record_energy(self.config.energy_rx);

        if node.malicious && self.rng.gen::<f64>() < self.config.malicious_drop_probability {
            self.trust
                .record_interaction(packet.source, self.id, InteractionOutcome::MaliciousDrop, now);
            node.lock().packets_dropped += 1;
            trace!("t={:.3} {} dropped packet {}", now, self.id, packet.id);
            return;
        }

        if packet.destination == self.id {
            self.metrics.record_packet_delivered(now - packet.created_at);
            self.nodes.node(packet.source).lock().packets_delivered += 1;
            self.trust
                .record_interaction(packet.source, self.id, InteractionOutcome::Success, now);
            trace!("t={:.3} packet {} delivered to {}", now, packet.id, self.id);
        } else {
            node.lock().packets_forwarded += 1;
            self.router.route(self.id, packet, now, self.queue.as_ref());
        }
    }
}
