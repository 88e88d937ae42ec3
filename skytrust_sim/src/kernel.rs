//! The simulation kernel: event loop, node tasks and consensus rounds.
//!
//! ```text
//!            ┌──────────────────────── EventQueue ◀──────────────────────┐
//!            │ pop (ascending time)                                      │ push
//!      ┌─────▼─────┐  PacketArrival   ┌──────────┐   route()   ┌─────────┴─┐
//!      │  kernel   │─────────────────▶│ inbox[i] │────────────▶│ NodeTask i│
//!      │   loop    │                  └──────────┘             └───────────┘
//!      └─────┬─────┘  ConsensusStart  ┌────────────────┐  ConsensusEnd
//!            └───────────────────────▶│ consensus task │─────────────▶ queue
//!                                     └────────────────┘
//! ```
//!
//! Simulated time only moves in the kernel loop. Node tasks stamp their work
//! with the arrival time of the packet they handle; consensus rounds run
//! concurrently with the loop and only report back through the queue, so
//! their effects on node state are not ordered with simulated time.

use crate::context::SimContext;
use crate::event::{Event, EventKind, EventQueue};
use crate::node_task::{Delivery, NodeTask};
use crate::quiescence::Quiescence;
use crate::report::RunReport;
use rand::Rng;
use skytrust_core::{
    engine_for, run_round, ClusterEngine, FinalMetrics, MetricsCollector, RoundContext,
    RoundOutcome, Router, TrustEngine,
};
use skytrust_env::{
    ClusterId, ConfigError, InteractionOutcome, NodeArena, NodeId, Packet, SimConfig, SimError,
    SimRng,
};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Seconds between two mobility steps of a node.
const MOBILITY_PERIOD: f64 = 1.0;

/// Delay before the first packet of a node, plus a random [0, 1) offset.
const FIRST_PACKET_DELAY: f64 = 1.0;

/// The discrete-event simulator for one run.
pub struct Simulator {
    config: Arc<SimConfig>,
    ctx: SimContext,
    rng: SimRng,

    nodes: Arc<NodeArena>,
    trust: Arc<TrustEngine>,
    clusters: Arc<ClusterEngine>,
    metrics: Arc<MetricsCollector>,
    router: Router,
    queue: Arc<EventQueue>,

    /// Outstanding inbox deliveries and consensus rounds
    work: Quiescence,

    /// Run-wide block id counter
    block_ids: Arc<AtomicU64>,
    packet_ids: u64,

    /// Whether `run` schedules the initial events itself
    auto_bootstrap: bool,
}

impl Simulator {
    /// Creates a run with randomly placed nodes.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let ctx = SimContext::new(config.seed);
        let mut rng = ctx.kernel_rng();
        let nodes = NodeArena::generate(&config, &mut rng);
        Ok(Self::assemble(config, ctx, rng, nodes))
    }

    /// Creates a run over pre-built nodes.
    pub fn with_nodes(mut config: SimConfig, nodes: NodeArena) -> Result<Self, SimError> {
        if nodes.is_empty() {
            return Err(ConfigError::NoNodes.into());
        }
        config.num_nodes = nodes.len();
        config.validate()?;
        let ctx = SimContext::new(config.seed);
        let rng = ctx.kernel_rng();
        Ok(Self::assemble(config, ctx, rng, nodes))
    }

    fn assemble(config: SimConfig, ctx: SimContext, rng: SimRng, nodes: NodeArena) -> Self {
        let config = Arc::new(config);
        let nodes = Arc::new(nodes);
        let trust = Arc::new(TrustEngine::from_config(&config));
        let clusters = Arc::new(ClusterEngine::new());
        let metrics = Arc::new(MetricsCollector::new());
        let router = Router::new(
            Arc::clone(&nodes),
            Arc::clone(&trust),
            Arc::clone(&clusters),
            Arc::clone(&metrics),
            Arc::clone(&config),
        );

        Self {
            config,
            ctx,
            rng,
            nodes,
            trust,
            clusters,
            metrics,
            router,
            queue: Arc::new(EventQueue::new()),
            work: Quiescence::new(),
            block_ids: Arc::new(AtomicU64::new(0)),
            packet_ids: 0,
            auto_bootstrap: true,
        }
    }

    /// Leaves the initial events to the caller (see [`Simulator::schedule`]).
    pub fn without_bootstrap(mut self) -> Self {
        self.auto_bootstrap = false;
        self
    }

    pub fn nodes(&self) -> Arc<NodeArena> {
        Arc::clone(&self.nodes)
    }

    pub fn trust(&self) -> Arc<TrustEngine> {
        Arc::clone(&self.trust)
    }

    /// Inserts an event into the queue.
    pub fn schedule(&self, time: f64, kind: EventKind) {
        self.queue.push(time, kind);
    }

    /// Schedules the initial re-election and every node's first move and packet.
    pub fn bootstrap(&mut self) {
        self.schedule(0.0, EventKind::ClusterReelection { initial: true });
        for id in self.nodes.ids() {
            let first_move = self.rng.gen::<f64>();
            let first_packet = FIRST_PACKET_DELAY + self.rng.gen::<f64>();
            self.schedule(first_move, EventKind::Mobility { node: id });
            self.schedule(first_packet, EventKind::PacketGeneration { node: id });
        }
    }

    /// Runs the simulation to the horizon and computes the final metrics.
    ///
    /// Returns an error only for fatal conditions; background work is always
    /// drained first.
    pub async fn run(mut self) -> Result<RunReport, SimError> {
        if self.auto_bootstrap {
            self.bootstrap();
        }
        info!(
            "Starting {} (seed={}, nodes={}, horizon={}s)",
            self.config.algorithm_name,
            self.ctx.seed(),
            self.nodes.len(),
            self.config.simulation_time
        );

        let (inboxes, mut handles) = self.spawn_node_tasks();
        let mut rounds: Vec<JoinHandle<()>> = Vec::new();

        let outcome = self.event_loop(&inboxes, &mut rounds).await;

        // Close every inbox, let tasks drain, then join them
        drop(inboxes);
        self.work.wait_idle().await;
        handles.append(&mut rounds);
        for handle in handles {
            handle
                .await
                .map_err(|e| SimError::TaskFailed(e.to_string()))?;
        }

        let events_processed = outcome?;
        Ok(self.report(events_processed))
    }

    fn spawn_node_tasks(&self) -> (Vec<mpsc::Sender<Delivery>>, Vec<JoinHandle<()>>) {
        let mut inboxes = Vec::with_capacity(self.nodes.len());
        let mut handles = Vec::with_capacity(self.nodes.len());
        for id in self.nodes.ids() {
            let (tx, rx) = mpsc::channel(self.config.inbox_capacity);
            let task = NodeTask {
                id,
                nodes: Arc::clone(&self.nodes),
                trust: Arc::clone(&self.trust),
                metrics: Arc::clone(&self.metrics),
                router: self.router.clone(),
                queue: Arc::clone(&self.queue),
                config: Arc::clone(&self.config),
                rng: self.ctx.node_rng(id),
            };
            inboxes.push(tx);
            handles.push(tokio::spawn(task.run(rx)));
        }
        (inboxes, handles)
    }

    /// Pops events until the queue runs dry or the horizon is passed.
    async fn event_loop(
        &mut self,
        inboxes: &[mpsc::Sender<Delivery>],
        rounds: &mut Vec<JoinHandle<()>>,
    ) -> Result<u64, SimError> {
        let mut processed = 0;
        loop {
            let event = match self.queue.pop()? {
                Some(event) => event,
                None => {
                    // Background work may still schedule events
                    if self.work.outstanding() == 0 {
                        break;
                    }
                    self.work.wait_idle().await;
                    continue;
                }
            };
            if event.time > self.config.simulation_time {
                break;
            }
            self.ctx.clock().advance_to(event.time);
            self.handle(event, inboxes, rounds).await?;
            processed += 1;
        }
        info!(
            "Event loop stopped at t={:.2} after {} events",
            self.ctx.now(),
            processed
        );
        Ok(processed)
    }

    async fn handle(
        &mut self,
        event: Event,
        inboxes: &[mpsc::Sender<Delivery>],
        rounds: &mut Vec<JoinHandle<()>>,
    ) -> Result<(), SimError> {
        let now = event.time;
        if let Some(node) = event.kind.node() {
            if self.nodes.get(node).is_none() {
                return Err(SimError::UnknownNode(node));
            }
        }

        match event.kind {
            EventKind::Mobility { node } => {
                self.move_node(node);
                self.schedule(now + MOBILITY_PERIOD, EventKind::Mobility { node });
            }
            EventKind::PacketGeneration { node } => {
                self.generate_packet(node, now);
                self.schedule(
                    now + self.config.packet_interval,
                    EventKind::PacketGeneration { node },
                );
            }
            EventKind::PacketArrival { node, packet } => {
                let inbox = inboxes
                    .get(node.index())
                    .ok_or(SimError::UnknownNode(node))?;
                let delivery = Delivery {
                    packet,
                    at: now,
                    work: self.work.begin(),
                };
                inbox
                    .send(delivery)
                    .await
                    .map_err(|_| SimError::TaskFailed(format!("{node} inbox closed")))?;
                // Give the node task a chance to run before the next event
                tokio::task::yield_now().await;
            }
            EventKind::ClusterReelection { initial } => {
                let leaders = self.clusters.reelect(
                    now,
                    &self.nodes,
                    &self.trust,
                    &self.config,
                    &self.metrics,
                );
                if !initial && self.config.uses_consensus() {
                    for cluster in self.clusters.cluster_ids() {
                        self.schedule(now, EventKind::ConsensusStart { cluster });
                    }
                }
                debug!("t={:.2} {} cluster heads elected", now, leaders.len());
                self.schedule(
                    now + self.config.reelection_interval,
                    EventKind::ClusterReelection { initial: false },
                );
            }
            EventKind::ConsensusStart { cluster } => {
                rounds.push(self.spawn_round(cluster, now)?);
            }
            EventKind::ConsensusEnd { cluster, block } => match block {
                Some(block) => debug!(
                    "t={:.2} {} block {} final (proposer {})",
                    now, cluster, block.id, block.proposer
                ),
                None => debug!("t={:.2} {} round ended without a block", now, cluster),
            },
        }
        Ok(())
    }

    /// Random walk step, clamped to the arena.
    fn move_node(&mut self, node: NodeId) {
        let step = self.config.mobility_step;
        let dx = (self.rng.gen::<f64>() - 0.5) * step;
        let dy = (self.rng.gen::<f64>() - 0.5) * step;
        let mut state = self.nodes.node(node).lock();
        state.position.x += dx;
        state.position.y += dy;
        state.position = state
            .position
            .clamped(self.config.area_width, self.config.area_height);
    }

    /// A non-leader node sends a packet to a random other node.
    fn generate_packet(&mut self, source: NodeId, now: f64) {
        let n = self.nodes.len();
        if n < 2 || self.nodes.node(source).lock().is_leader {
            return;
        }
        let destination = loop {
            let candidate = NodeId(self.rng.gen_range(0..n));
            if candidate != source {
                break candidate;
            }
        };

        self.packet_ids += 1;
        let packet = Packet::new(self.packet_ids, source, destination, now);
        self.metrics.record_packet_sent();
        self.nodes.node(source).lock().packets_sent += 1;

        let outcome = self.router.route(source, packet, now, self.queue.as_ref());
        debug!("t={:.3} {} -> {}: {:?}", now, source, destination, outcome);
    }

    /// Runs one consensus round on a background task.
    fn spawn_round(&self, cluster: ClusterId, now: f64) -> Result<JoinHandle<()>, SimError> {
        let engine = engine_for(self.config.consensus).ok_or_else(|| {
            SimError::invariant(format!("consensus start for {cluster} without a protocol"))
        })?;

        let work = self.work.begin();
        let mut rng = self.ctx.round_rng();
        let config = Arc::clone(&self.config);
        let nodes = Arc::clone(&self.nodes);
        let trust = Arc::clone(&self.trust);
        let clusters = Arc::clone(&self.clusters);
        let metrics = Arc::clone(&self.metrics);
        let block_ids = Arc::clone(&self.block_ids);
        let queue = Arc::clone(&self.queue);

        Ok(tokio::spawn(async move {
            let ctx = RoundContext {
                config: &config,
                trust: &trust,
                metrics: &metrics,
                block_ids: &block_ids,
            };
            let outcome = run_round(engine, cluster, now, &nodes, &clusters, &ctx, &mut rng);
            let (end, block) = match outcome {
                RoundOutcome::Committed { block, latency } => (now + latency, Some(block)),
                RoundOutcome::Failed(_) => (now, None),
            };
            queue.push(end, EventKind::ConsensusEnd { cluster, block });
            drop(work);
        }))
    }

    fn report(&self, events_processed: u64) -> RunReport {
        let counters = self.metrics.snapshot();
        let final_time = self.ctx.now();
        let metrics = FinalMetrics::compute(
            &counters,
            &self.nodes,
            &self.trust,
            &self.config,
            final_time,
        );
        let interactions: BTreeMap<String, u64> = InteractionOutcome::ALL
            .iter()
            .map(|o| (o.name().to_string(), self.trust.interaction_count(*o)))
            .collect();

        info!(
            "{} finished: PDR={:.3} delay={:.4}s churn={:.2}/min FP={} FN={}",
            metrics.algorithm,
            metrics.pdr,
            metrics.mean_delay,
            metrics.ch_churn_rate,
            metrics.false_positives,
            metrics.false_negatives
        );

        RunReport {
            algorithm: self.config.algorithm_name.clone(),
            results_dir: self.config.results_dir.clone(),
            seed: self.ctx.seed(),
            final_time,
            events_processed,
            counters,
            interactions,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skytrust_env::{ConsensusKind, Node, Point, Protocol, TrustModel};

    fn two_nodes(malicious_receiver: bool) -> NodeArena {
        NodeArena::from_nodes(vec![
            Node::new(NodeId(0), false, 1.0, Point::new(100.0, 100.0), 5000.0),
            Node::new(NodeId(1), malicious_receiver, 1.0, Point::new(150.0, 100.0), 5000.0),
        ])
    }

    /// A static, quiet two-node run: one packet, no elections, no mobility.
    fn quiet_config(trust_model: TrustModel) -> SimConfig {
        SimConfig {
            trust_model,
            simulation_time: 5.0,
            packet_interval: 100.0,
            malicious_drop_probability: 1.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_two_node_direct_delivery() {
        let sim = Simulator::with_nodes(quiet_config(TrustModel::Simple), two_nodes(false))
            .unwrap()
            .without_bootstrap();
        sim.schedule(1.0, EventKind::PacketGeneration { node: NodeId(0) });
        let nodes = sim.nodes();
        let trust = sim.trust();

        let report = sim.run().await.unwrap();

        assert_eq!(report.counters.packets_sent, 1);
        assert_eq!(report.counters.packets_delivered, 1);
        assert_eq!(report.metrics.pdr, 1.0);
        assert!(report.metrics.mean_delay > 0.0 && report.metrics.mean_delay < 0.02);

        let source = nodes.node(NodeId(0)).snapshot();
        assert_eq!(source.state.packets_sent, 1);
        assert_eq!(source.state.packets_delivered, 1);
        // Delivered straight away, nobody relayed it
        assert_eq!(nodes.node(NodeId(1)).snapshot().state.packets_forwarded, 0);

        assert_eq!(trust.interaction_count(InteractionOutcome::Success), 1);
        assert!(trust.trust(NodeId(0), NodeId(1)) > 0.5);
        assert_eq!(report.interactions["success"], 1);
    }

    async fn run_always_drop(trust_model: TrustModel) {
        let sim = Simulator::with_nodes(quiet_config(trust_model), two_nodes(true))
            .unwrap()
            .without_bootstrap();
        sim.schedule(1.0, EventKind::PacketGeneration { node: NodeId(0) });
        let nodes = sim.nodes();
        let trust = sim.trust();
        let before = trust.trust(NodeId(0), NodeId(1));

        let report = sim.run().await.unwrap();

        assert_eq!(nodes.node(NodeId(1)).snapshot().state.packets_dropped, 1);
        assert_eq!(report.counters.packets_delivered, 0);
        assert_eq!(trust.interaction_count(InteractionOutcome::MaliciousDrop), 1);
        assert!(trust.trust(NodeId(0), NodeId(1)) < before);
    }

    #[tokio::test]
    async fn test_always_drop_lowers_trust_simple() {
        run_always_drop(TrustModel::Simple).await;
    }

    #[tokio::test]
    async fn test_always_drop_lowers_trust_complex() {
        run_always_drop(TrustModel::Complex).await;
    }

    #[tokio::test]
    async fn test_unknown_node_aborts() {
        let sim = Simulator::with_nodes(quiet_config(TrustModel::Simple), two_nodes(false))
            .unwrap()
            .without_bootstrap();
        sim.schedule(1.0, EventKind::Mobility { node: NodeId(9) });

        let result = sim.run().await;
        assert!(matches!(result, Err(SimError::UnknownNode(NodeId(9)))));
    }

    #[tokio::test]
    async fn test_stray_consensus_start_aborts() {
        let sim = Simulator::with_nodes(quiet_config(TrustModel::Simple), two_nodes(false))
            .unwrap()
            .without_bootstrap();
        sim.schedule(1.0, EventKind::ConsensusStart { cluster: ClusterId(1) });

        let result = sim.run().await;
        assert!(matches!(result, Err(SimError::Invariant(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimConfig {
            num_nodes: 0,
            ..Default::default()
        };
        assert!(matches!(Simulator::new(config), Err(SimError::Config(_))));
    }

    #[tokio::test]
    async fn test_full_run_stays_within_bounds() {
        let config = SimConfig {
            num_nodes: 20,
            simulation_time: 30.0,
            seed: 7,
            ..Protocol::BaseBtmsd.config()
        };
        let report = Simulator::new(config).unwrap().run().await.unwrap();

        assert!(report.final_time <= 30.0);
        assert!(report.counters.packets_sent > 0);
        assert!((0.0..=1.0).contains(&report.metrics.pdr));
        assert!(report.metrics.ch_churn_rate >= 0.0);
        assert!(report.metrics.mean_delay >= 0.0);
        assert!(report.events_processed > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_consensus_rounds_run_after_reelection() {
        let config = SimConfig {
            num_nodes: 12,
            simulation_time: 25.0,
            area_width: 100.0,
            area_height: 100.0,
            communication_radius: 100.0,
            seed: 3,
            ..Protocol::BlockchainPbft.config()
        };
        assert_eq!(config.consensus, ConsensusKind::Threshold);
        let sim = Simulator::new(config).unwrap();
        let nodes = sim.nodes();

        let report = sim.run().await.unwrap();

        // Re-elections at t = 10 and t = 20 each start a round
        assert!(report.counters.consensus_rounds >= 2);
        let participated: u64 = nodes.iter().map(|n| n.snapshot().state.consensus_rounds).sum();
        assert!(participated > 0);
    }

    #[test]
    fn test_same_seed_same_topology() {
        let config = SimConfig {
            num_nodes: 10,
            simulation_time: 3.0,
            seed: 99,
            ..Default::default()
        };
        let a = Simulator::new(config.clone()).unwrap();
        let b = Simulator::new(config).unwrap();
        assert_eq!(a.nodes().positions(), b.nodes().positions());
    }
}
