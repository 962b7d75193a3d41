//! In-process mesh simulator
//!
//! Runs real [`RelayEngine`]s over an adjacency list with a seeded lossy
//! broadcast medium. Frames are delivered in FIFO order, one hop per queue
//! entry, so a run is fully reproducible from the seed.

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::config::NodeRole;
use crate::contracts::{AlertPayload, AlertType, DedupKey, EmergencyPacket, MacAddress};
use crate::relay::{Reception, RelayEngine};

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub node_count: usize,
    pub seed: u64,
    /// Chance a single neighbor misses a broadcast
    pub loss_probability: f64,
    /// Chance a single neighbor hears a broadcast twice
    pub duplicate_probability: f64,
    /// Upper bound on queue entries processed per run
    pub max_steps: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            node_count: 8,
            seed: 42,
            loss_probability: 0.0,
            duplicate_probability: 0.0,
            max_steps: 100_000,
        }
    }
}

impl SimConfig {
    pub fn with_node_count(mut self, n: usize) -> Self {
        self.node_count = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_loss(mut self, p: f64) -> Self {
        self.loss_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_duplication(mut self, p: f64) -> Self {
        self.duplicate_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }
}

/// Aggregate counters for a simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Broadcasts made (originations plus forwards)
    pub transmissions: u64,
    /// Frames handed to a receiving node
    pub receptions: u64,
    pub lost: u64,
    pub duplicated: u64,
    /// Alerts surfaced by sinks
    pub deliveries: u64,
    pub steps: u64,
}

#[derive(Debug, Clone)]
struct InFlight {
    to: usize,
    frame: Vec<u8>,
}

/// Deterministic multi-node mesh
pub struct MeshSimulator {
    config: SimConfig,
    nodes: Vec<RelayEngine>,
    neighbors: Vec<Vec<usize>>,
    queue: VecDeque<InFlight>,
    deliveries: HashMap<usize, Vec<EmergencyPacket>>,
    rng: StdRng,
    stats: SimStats,
}

/// Stable MAC for simulated node `index`
pub fn node_mac(index: usize) -> MacAddress {
    let [.., hi, lo] = (index as u32).to_be_bytes();
    MacAddress::new([0x02, 0x53, 0x58, 0x00, hi, lo])
}

impl MeshSimulator {
    /// Nodes with no links; add them with [`connect`](Self::connect)
    pub fn new(config: SimConfig) -> Self {
        let nodes = (0..config.node_count)
            .map(|i| RelayEngine::new(node_mac(i), NodeRole::Relay))
            .collect();
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            neighbors: vec![Vec::new(); config.node_count],
            nodes,
            config,
            queue: VecDeque::new(),
            deliveries: HashMap::new(),
            rng,
            stats: SimStats::default(),
        }
    }

    /// Chain 0 - 1 - 2 - ... - n-1
    pub fn line(config: SimConfig) -> Self {
        let mut sim = Self::new(config);
        for i in 1..sim.len() {
            sim.connect(i - 1, i);
        }
        sim
    }

    /// Row-major grid with 4-neighbor links
    pub fn grid(config: SimConfig, width: usize) -> Self {
        let mut sim = Self::new(config);
        let width = width.max(1);
        for i in 0..sim.len() {
            if (i + 1) % width != 0 && i + 1 < sim.len() {
                sim.connect(i, i + 1);
            }
            if i + width < sim.len() {
                sim.connect(i, i + width);
            }
        }
        sim
    }

    /// Symmetric link; returns false for unknown or self links
    pub fn connect(&mut self, a: usize, b: usize) -> bool {
        if a == b || a >= self.len() || b >= self.len() {
            return false;
        }
        if !self.neighbors[a].contains(&b) {
            self.neighbors[a].push(b);
            self.neighbors[b].push(a);
        }
        true
    }

    /// Turn a node into a sink
    pub fn set_sink(&mut self, index: usize) -> bool {
        match self.nodes.get_mut(index) {
            Some(node) => {
                *node = RelayEngine::new(node_mac(index), NodeRole::Sink);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn node(&self, index: usize) -> Option<&RelayEngine> {
        self.nodes.get(index)
    }

    pub fn neighbors(&self, index: usize) -> &[usize] {
        self.neighbors.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Alerts a sink has surfaced, in arrival order
    pub fn deliveries_at(&self, index: usize) -> &[EmergencyPacket] {
        self.deliveries.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// How many times `key` was surfaced at `index`
    pub fn delivery_count(&self, index: usize, key: DedupKey) -> usize {
        self.deliveries_at(index)
            .iter()
            .filter(|p| p.dedup_key() == key)
            .count()
    }

    fn broadcast(&mut self, from: usize, frame: &[u8]) {
        self.stats.transmissions += 1;
        for i in 0..self.neighbors[from].len() {
            let to = self.neighbors[from][i];
            if self.rng.gen_bool(self.config.loss_probability) {
                self.stats.lost += 1;
                trace!(from, to, "frame lost");
                continue;
            }
            self.queue.push_back(InFlight {
                to,
                frame: frame.to_vec(),
            });
            if self.rng.gen_bool(self.config.duplicate_probability) {
                self.stats.duplicated += 1;
                self.queue.push_back(InFlight {
                    to,
                    frame: frame.to_vec(),
                });
            }
        }
    }

    /// Originate an alert at `index`; returns its dedup key
    pub fn originate(
        &mut self,
        index: usize,
        alert_type: AlertType,
        timestamp: u32,
    ) -> Option<DedupKey> {
        let payload = AlertPayload {
            spo2: 97,
            heart_rate: 80,
            ..Default::default()
        };
        let packet = EmergencyPacket::alert(node_mac(index), timestamp, alert_type, payload);
        self.originate_packet(index, &packet)
    }

    /// Inject a prepared packet from `index`
    pub fn originate_packet(&mut self, index: usize, packet: &EmergencyPacket) -> Option<DedupKey> {
        let node = self.nodes.get_mut(index)?;
        let frame = node.originate(packet);
        if node.role() == NodeRole::Sink && !packet.is_ack() {
            self.stats.deliveries += 1;
            self.deliveries.entry(index).or_default().push(*packet);
        }
        self.broadcast(index, &frame);
        Some(packet.dedup_key())
    }

    /// Drain the medium; returns the number of queue entries processed
    pub fn run(&mut self) -> usize {
        let mut processed = 0;
        while processed < self.config.max_steps {
            let Some(InFlight { to, frame }) = self.queue.pop_front() else {
                break;
            };
            processed += 1;
            self.stats.receptions += 1;

            if let Reception::Alert(outcome) = self.nodes[to].receive_frame(&frame) {
                if outcome.deliver {
                    self.stats.deliveries += 1;
                    self.deliveries.entry(to).or_default().push(outcome.packet);
                }
                if let Some(fwd) = outcome.forward_frame() {
                    self.broadcast(to, &fwd);
                }
            }
        }

        self.stats.steps += processed as u64;
        if !self.queue.is_empty() {
            debug!(left = self.queue.len(), "step limit reached");
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_HOP_COUNT;

    #[test]
    fn test_line_reaches_sink_within_hop_bound() {
        let reach = usize::from(MAX_HOP_COUNT) + 1;
        let mut sim = MeshSimulator::line(SimConfig::default().with_node_count(reach + 1));
        sim.set_sink(reach);
        let key = sim.originate(0, AlertType::Fall, 100).unwrap();
        sim.run();
        assert_eq!(sim.delivery_count(reach, key), 1);
        assert_eq!(sim.deliveries_at(reach)[0].hop_count, MAX_HOP_COUNT);
    }

    #[test]
    fn test_line_beyond_hop_bound_misses_sink() {
        let far = usize::from(MAX_HOP_COUNT) + 2;
        let mut sim = MeshSimulator::line(SimConfig::default().with_node_count(far + 1));
        sim.set_sink(far);
        sim.originate(0, AlertType::Fall, 100).unwrap();
        sim.run();
        assert!(sim.deliveries_at(far).is_empty());
        assert_eq!(sim.stats().deliveries, 0);
    }

    #[test]
    fn test_grid_delivers_exactly_once() {
        let mut sim = MeshSimulator::grid(SimConfig::default().with_node_count(16), 4);
        sim.set_sink(15);
        let key = sim.originate(0, AlertType::Gas, 7).unwrap();
        sim.run();
        assert_eq!(sim.delivery_count(15, key), 1);
        // every node transmits at most once per key
        assert!(sim.stats().transmissions <= 16);
    }

    #[test]
    fn test_duplicating_medium_still_exactly_once() {
        let config = SimConfig::default()
            .with_node_count(12)
            .with_duplication(0.6)
            .with_seed(7);
        let mut sim = MeshSimulator::grid(config, 4);
        sim.set_sink(11);
        let key = sim.originate(0, AlertType::Manual, 1).unwrap();
        sim.run();
        assert_eq!(sim.delivery_count(11, key), 1);
        assert!(sim.stats().duplicated > 0);
    }

    #[test]
    fn test_seed_reproducible() {
        let run = |seed| {
            let config = SimConfig::default()
                .with_node_count(16)
                .with_loss(0.3)
                .with_duplication(0.2)
                .with_seed(seed);
            let mut sim = MeshSimulator::grid(config, 4);
            sim.set_sink(15);
            sim.originate(0, AlertType::Fall, 1);
            sim.run();
            sim.stats()
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn test_total_loss_isolates_origin() {
        let mut sim = MeshSimulator::line(SimConfig::default().with_node_count(3).with_loss(1.0));
        sim.set_sink(2);
        sim.originate(0, AlertType::Fall, 1);
        assert_eq!(sim.run(), 0);
        assert_eq!(sim.stats().lost, 1);
    }

    #[test]
    fn test_sink_originating_surfaces_locally() {
        let mut sim = MeshSimulator::line(SimConfig::default().with_node_count(2));
        sim.set_sink(0);
        let key = sim.originate(0, AlertType::Manual, 5).unwrap();
        sim.run();
        assert_eq!(sim.delivery_count(0, key), 1);
    }

    #[test]
    fn test_connect_rejects_bad_links() {
        let mut sim = MeshSimulator::new(SimConfig::default().with_node_count(2));
        assert!(!sim.connect(0, 0));
        assert!(!sim.connect(0, 5));
        assert!(sim.connect(0, 1));
        assert!(sim.connect(1, 0));
        assert_eq!(sim.neighbors(0), &[1]);
        assert!(sim.originate(9, AlertType::Fall, 1).is_none());
    }
}
