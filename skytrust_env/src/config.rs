//! Run configuration and the protocol presets.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Strategy used to score cluster-head candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChSelection {
    /// Mean trust the rest of the swarm places in the candidate (Base BTMSD)
    MeanIncomingTrust,

    /// Trust + delivery ratio + remaining energy
    Pors,

    /// Consensus reliability + computational capacity (RF/FF)
    Blockchain,

    /// Stability-weighted PoRS/RF blend plus topological centrality
    Unified,
}

/// How a single interaction updates the observer's trust in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustModel {
    /// Exponential moving average over success / non-success
    Simple,

    /// Direct + recommended + time-decayed historical composite
    Complex,

    /// Innocent until proven guilty: halve on proven drops, slow recovery
    TrustByDefault,
}

/// Consensus protocol run per cluster after re-elections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusKind {
    None,

    /// PBFT-style quorum round
    Threshold,

    /// PoW-style capacity-weighted lottery
    Lottery,

    /// Deterministic pick of the best consensus-leader score
    Reputation,
}

/// Full configuration of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Human-readable algorithm name (reported with the metrics)
    pub algorithm_name: String,

    /// Tag naming where an external reporter stores this run's results
    pub results_dir: String,

    /// Master seed for all randomness of the run
    pub seed: u64,

    pub num_nodes: usize,

    /// Fraction of nodes flagged malicious, in [0, 1]
    pub malicious_ratio: f64,

    /// Probability a malicious node drops a packet it receives
    pub malicious_drop_probability: f64,

    /// Arena width in meters
    pub area_width: f64,

    /// Arena height in meters
    pub area_height: f64,

    /// Simulation horizon in seconds
    pub simulation_time: f64,

    /// Seconds between cluster re-elections
    pub reelection_interval: f64,

    /// Seconds between packets generated by one node
    pub packet_interval: f64,

    /// Peak-to-peak random displacement per mobility tick (meters)
    pub mobility_step: f64,

    pub ch_selection: ChSelection,
    pub trust_model: TrustModel,

    /// EMA factor α
    pub alpha_trust: f64,

    /// Minimum trust for a neighbor to be used as next hop
    pub trust_threshold: f64,

    /// Off-diagonal trust at the start of a run (and TrustByDefault ceiling)
    pub initial_trust: f64,

    /// Historical trust decay rate λ (per second)
    pub lambda_decay: f64,

    pub initial_energy: f64,

    /// Nodes below this energy are excluded from leadership and consensus
    pub energy_min: f64,

    pub energy_tx: f64,
    pub energy_rx: f64,
    pub energy_consensus: f64,

    pub min_capacity: f64,
    pub max_capacity: f64,

    /// Radio range in meters
    pub communication_radius: f64,

    pub consensus: ConsensusKind,

    /// Mean block time of the lottery engine (seconds)
    pub lottery_mining_time: f64,

    /// Base latency of the threshold engine (seconds)
    pub threshold_base_latency: f64,

    /// Bounded capacity of each node's inbound packet queue
    pub inbox_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            algorithm_name: "Base BTMSD".to_string(),
            results_dir: "default".to_string(),
            seed: 42,
            num_nodes: 50,
            malicious_ratio: 0.1,
            malicious_drop_probability: 0.7,
            area_width: 400.0,
            area_height: 400.0,
            simulation_time: 120.0,
            reelection_interval: 10.0,
            packet_interval: 1.0,
            mobility_step: 10.0,
            ch_selection: ChSelection::MeanIncomingTrust,
            trust_model: TrustModel::Simple,
            alpha_trust: 0.3,
            trust_threshold: 0.5,
            initial_trust: 0.5,
            lambda_decay: 0.1,
            initial_energy: 5000.0,
            energy_min: 500.0,
            energy_tx: 0.5,
            energy_rx: 0.1,
            energy_consensus: 0.0,
            min_capacity: 1.0,
            max_capacity: 2.0,
            communication_radius: 100.0,
            consensus: ConsensusKind::None,
            lottery_mining_time: 5.0,
            threshold_base_latency: 0.5,
            inbox_capacity: 100,
        }
    }
}

impl SimConfig {
    /// Sets a square arena and the matching radio range (a quarter of its side).
    pub fn with_area(mut self, side: f64) -> Self {
        self.area_width = side;
        self.area_height = side;
        self.communication_radius = side / 4.0;
        self
    }

    /// Whether re-elections are followed by per-cluster consensus rounds.
    pub fn uses_consensus(&self) -> bool {
        self.consensus != ConsensusKind::None
    }

    /// Checks every numeric option for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::NotPositive { name, value })
            }
        }
        fn unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::OutOfUnitRange { name, value })
            }
        }
        fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
            if value >= 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::Negative { name, value })
            }
        }

        if self.num_nodes == 0 {
            return Err(ConfigError::NoNodes);
        }
        if self.inbox_capacity == 0 {
            return Err(ConfigError::Invalid("inbox_capacity must be at least 1".into()));
        }
        unit("malicious_ratio", self.malicious_ratio)?;
        unit("malicious_drop_probability", self.malicious_drop_probability)?;
        positive("area_width", self.area_width)?;
        positive("area_height", self.area_height)?;
        positive("simulation_time", self.simulation_time)?;
        positive("reelection_interval", self.reelection_interval)?;
        positive("packet_interval", self.packet_interval)?;
        positive("communication_radius", self.communication_radius)?;
        non_negative("mobility_step", self.mobility_step)?;
        if !(self.alpha_trust > 0.0 && self.alpha_trust <= 1.0) {
            return Err(ConfigError::OutOfUnitRange {
                name: "alpha_trust",
                value: self.alpha_trust,
            });
        }
        unit("trust_threshold", self.trust_threshold)?;
        unit("initial_trust", self.initial_trust)?;
        non_negative("lambda_decay", self.lambda_decay)?;
        positive("initial_energy", self.initial_energy)?;
        non_negative("energy_min", self.energy_min)?;
        non_negative("energy_tx", self.energy_tx)?;
        non_negative("energy_rx", self.energy_rx)?;
        non_negative("energy_consensus", self.energy_consensus)?;
        non_negative("min_capacity", self.min_capacity)?;
        non_negative("max_capacity", self.max_capacity)?;
        non_negative("lottery_mining_time", self.lottery_mining_time)?;
        non_negative("threshold_base_latency", self.threshold_base_latency)?;
        if self.min_capacity > self.max_capacity {
            return Err(ConfigError::Invalid(format!(
                "min_capacity {} exceeds max_capacity {}",
                self.min_capacity, self.max_capacity
            )));
        }
        if self.energy_min > self.initial_energy {
            return Err(ConfigError::Invalid(format!(
                "energy_min {} exceeds initial_energy {}",
                self.energy_min, self.initial_energy
            )));
        }
        Ok(())
    }
}

/// The algorithm families compared by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Mean-incoming-trust cluster heads, simple trust, no consensus
    BaseBtmsd,

    /// PoRS cluster heads, simple trust, no consensus
    Pors,

    /// RF/FF cluster heads, complex trust, PBFT-style consensus
    BlockchainPbft,

    /// PoRS cluster heads, complex trust, PoW-style consensus
    PorsPow,

    /// PoRS cluster heads, simple trust, reputation consensus
    ReputationConsensus,

    /// Unified scoring, trust-by-default, reputation consensus
    Barc,
}

impl Protocol {
    pub fn all() -> Vec<Protocol> {
        vec![
            Protocol::BaseBtmsd,
            Protocol::Pors,
            Protocol::BlockchainPbft,
            Protocol::PorsPow,
            Protocol::ReputationConsensus,
            Protocol::Barc,
        ]
    }

    /// Short CLI name.
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::BaseBtmsd => "btmsd",
            Protocol::Pors => "pors",
            Protocol::BlockchainPbft => "pbft",
            Protocol::PorsPow => "pow",
            Protocol::ReputationConsensus => "reputation",
            Protocol::Barc => "barc",
        }
    }

    /// Name reported alongside the metrics.
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            Protocol::BaseBtmsd => "Base BTMSD",
            Protocol::Pors => "PoRS",
            Protocol::BlockchainPbft => "Blockchain (PBFT)",
            Protocol::PorsPow => "PoRS + Blockchain (PoW)",
            Protocol::ReputationConsensus => "Reputation-Based Consensus",
            Protocol::Barc => "BARC",
        }
    }

    /// Builds the configuration for this protocol on top of the defaults.
    pub fn config(&self) -> SimConfig {
        let mut cfg = SimConfig {
            algorithm_name: self.algorithm_name().to_string(),
            results_dir: self.algorithm_name().to_string(),
            ..SimConfig::default()
        };
        match self {
            Protocol::BaseBtmsd => {}
            Protocol::Pors => {
                cfg.ch_selection = ChSelection::Pors;
            }
            Protocol::BlockchainPbft => {
                cfg.ch_selection = ChSelection::Blockchain;
                cfg.trust_model = TrustModel::Complex;
                cfg.consensus = ConsensusKind::Threshold;
                cfg.energy_consensus = 2.0;
            }
            Protocol::PorsPow => {
                cfg.ch_selection = ChSelection::Pors;
                cfg.trust_model = TrustModel::Complex;
                cfg.consensus = ConsensusKind::Lottery;
                cfg.energy_consensus = 1.5;
            }
            Protocol::ReputationConsensus => {
                cfg.ch_selection = ChSelection::Pors;
                cfg.consensus = ConsensusKind::Reputation;
                cfg.energy_consensus = 1.0;
            }
            Protocol::Barc => {
                cfg.ch_selection = ChSelection::Unified;
                cfg.trust_model = TrustModel::TrustByDefault;
                cfg.initial_trust = 0.9;
                cfg.consensus = ConsensusKind::Reputation;
                cfg.energy_consensus = 1.0;
            }
        }
        cfg
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "btmsd" | "base_btmsd" => Ok(Protocol::BaseBtmsd),
            "pors" => Ok(Protocol::Pors),
            "pbft" | "blockchain" => Ok(Protocol::BlockchainPbft),
            "pow" | "pors_pow" => Ok(Protocol::PorsPow),
            "reputation" | "pors_consensus" => Ok(Protocol::ReputationConsensus),
            "barc" | "unified" => Ok(Protocol::Barc),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_every_preset_is_valid() {
        for protocol in Protocol::all() {
            let cfg = protocol.config();
            assert!(cfg.validate().is_ok(), "{} preset invalid", protocol);
            assert_eq!(cfg.algorithm_name, protocol.algorithm_name());
        }
    }

    #[test]
    fn test_barc_preset() {
        let cfg = Protocol::Barc.config();
        assert_eq!(cfg.ch_selection, ChSelection::Unified);
        assert_eq!(cfg.trust_model, TrustModel::TrustByDefault);
        assert_eq!(cfg.consensus, ConsensusKind::Reputation);
        assert_eq!(cfg.initial_trust, 0.9);
        assert!(cfg.uses_consensus());
        assert!(!Protocol::Pors.config().uses_consensus());
    }

    #[test]
    fn test_protocol_round_trips_through_name() {
        for protocol in Protocol::all() {
            assert_eq!(protocol.name().parse::<Protocol>().unwrap(), protocol);
        }
        assert!("paxos".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_with_area_sets_radius() {
        let cfg = SimConfig::default().with_area(800.0);
        assert_eq!(cfg.area_width, 800.0);
        assert_eq!(cfg.area_height, 800.0);
        assert_eq!(cfg.communication_radius, 200.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = SimConfig {
            num_nodes: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::NoNodes)));

        let cfg = SimConfig {
            malicious_ratio: 1.5,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::OutOfUnitRange { .. })));

        let cfg = SimConfig {
            min_capacity: 3.0,
            max_capacity: 2.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let cfg = SimConfig {
            communication_radius: 0.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::NotPositive { .. })));
    }

    #[test]
    fn test_validate_rejects_non_finite_values() {
        let cfg = SimConfig {
            lambda_decay: f64::INFINITY,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Negative { name: "lambda_decay", .. })
        ));

        let cfg = SimConfig {
            energy_tx: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Negative { name: "energy_tx", .. })));

        let cfg = SimConfig {
            max_capacity: f64::INFINITY,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Negative { name: "max_capacity", .. })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: SimConfig =
            serde_json::from_str(r#"{"num_nodes": 12, "trust_model": "complex"}"#).unwrap();
        assert_eq!(cfg.num_nodes, 12);
        assert_eq!(cfg.trust_model, TrustModel::Complex);
        assert_eq!(cfg.alpha_trust, 0.3);
    }
}
