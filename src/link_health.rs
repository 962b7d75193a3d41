//! Link health monitor - heartbeat tracking and blackout detection
//!
//! Each known peer is Healthy, Degraded (one missed heartbeat window) or in
//! Blackout (`BLACKOUT_THRESHOLD` consecutive misses). Any heartbeat snaps
//! the peer back to Healthy. Time is passed in as monotonic milliseconds so
//! the monitor stays deterministic; the node runtime supplies the clock.
//!
//! Blackout is informational: flooding still goes to every neighbor.
//!
//! The table holds at most `MAX_PEERS` peers. A heartbeat from an unknown
//! peer when the table is full evicts the peer silent the longest, which is
//! always a Blackout peer if there is one.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::contracts::{BatteryLevel, HeartbeatPacket, MacAddress};
use crate::{BLACKOUT_THRESHOLD, HEARTBEAT_INTERVAL_MS, MAX_PEERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Healthy,
    Degraded,
    Blackout,
}

impl LinkState {
    fn for_failures(failures: u32) -> Self {
        if failures >= BLACKOUT_THRESHOLD {
            Self::Blackout
        } else if failures >= 1 {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }
}

/// Everything known about one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerHealth {
    pub mac: MacAddress,
    pub state: LinkState,
    /// Whole heartbeat windows elapsed since the last receipt
    pub consecutive_failures: u32,
    /// Monotonic receipt time of the last heartbeat
    pub last_heard_ms: u64,
    /// Sender's own timestamp from that heartbeat
    pub last_timestamp: u32,
    pub battery: BatteryLevel,
    pub wifi_connected: bool,
}

/// A peer moved between link states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTransition {
    pub mac: MacAddress,
    pub from: LinkState,
    pub to: LinkState,
    pub consecutive_failures: u32,
}

/// Snapshot of the mesh as seen from this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshStatus {
    pub healthy: usize,
    pub degraded: usize,
    pub blackout: usize,
}

impl MeshStatus {
    pub fn total(&self) -> usize {
        self.healthy + self.degraded + self.blackout
    }

    /// At least one peer has dropped off the mesh
    pub fn blackout_mode(&self) -> bool {
        self.blackout > 0
    }
}

/// Per-peer heartbeat state machine
#[derive(Debug, Clone)]
pub struct LinkHealthMonitor {
    own_mac: MacAddress,
    window_ms: u64,
    max_peers: usize,
    peers: HashMap<MacAddress, PeerHealth>,
}

impl LinkHealthMonitor {
    pub fn new(own_mac: MacAddress) -> Self {
        Self::with_window(own_mac, HEARTBEAT_INTERVAL_MS)
    }

    /// Monitor with a custom miss window (minimum 1 ms)
    pub fn with_window(own_mac: MacAddress, window_ms: u64) -> Self {
        Self {
            own_mac,
            window_ms: window_ms.max(1),
            max_peers: MAX_PEERS,
            peers: HashMap::new(),
        }
    }

    /// Cap the peer table (minimum 1)
    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers.max(1);
        self
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    /// Drop the peer heard least recently (ties broken by MAC)
    fn evict_stalest(&mut self) {
        let stalest = self
            .peers
            .values()
            .min_by_key(|p| (p.last_heard_ms, p.mac))
            .map(|p| (p.mac, p.state));
        if let Some((mac, state)) = stalest {
            self.peers.remove(&mac);
            debug!(peer = %mac, ?state, "peer table full, evicted");
        }
    }

    /// Record a heartbeat heard at `now_ms`.
    ///
    /// Returns a transition when the peer was Degraded or in Blackout.
    /// New peers start Healthy without a transition. Our own heartbeat
    /// echoed back is ignored.
    pub fn record_heartbeat(&mut self, hb: &HeartbeatPacket, now_ms: u64) -> Option<LinkTransition> {
        if hb.origin_mac == self.own_mac {
            return None;
        }

        let fresh = PeerHealth {
            mac: hb.origin_mac,
            state: LinkState::Healthy,
            consecutive_failures: 0,
            last_heard_ms: now_ms,
            last_timestamp: hb.timestamp,
            battery: hb.battery(),
            wifi_connected: hb.is_wifi_connected(),
        };

        if !self.peers.contains_key(&hb.origin_mac) && self.peers.len() >= self.max_peers {
            self.evict_stalest();
        }

        match self.peers.insert(hb.origin_mac, fresh) {
            None => {
                info!(peer = %hb.origin_mac, battery = ?fresh.battery, "new peer");
                None
            }
            Some(prev) if prev.state != LinkState::Healthy => {
                info!(
                    peer = %hb.origin_mac,
                    from = ?prev.state,
                    missed = prev.consecutive_failures,
                    "peer recovered"
                );
                Some(LinkTransition {
                    mac: hb.origin_mac,
                    from: prev.state,
                    to: LinkState::Healthy,
                    consecutive_failures: 0,
                })
            }
            Some(_) => None,
        }
    }

    /// Re-evaluate every peer at `now_ms` and report state changes
    pub fn poll(&mut self, now_ms: u64) -> Vec<LinkTransition> {
        let window_ms = self.window_ms;
        let mut transitions = Vec::new();

        for peer in self.peers.values_mut() {
            let elapsed = now_ms.saturating_sub(peer.last_heard_ms);
            let failures = u32::try_from(elapsed / window_ms).unwrap_or(u32::MAX);
            let state = LinkState::for_failures(failures);
            peer.consecutive_failures = failures;

            if state != peer.state {
                match state {
                    LinkState::Blackout => {
                        warn!(peer = %peer.mac, missed = failures, "peer in blackout")
                    }
                    _ => debug!(peer = %peer.mac, missed = failures, state = ?state, "link state changed"),
                }
                transitions.push(LinkTransition {
                    mac: peer.mac,
                    from: peer.state,
                    to: state,
                    consecutive_failures: failures,
                });
                peer.state = state;
            }
        }

        transitions.sort_by_key(|t| t.mac);
        transitions
    }

    pub fn peer(&self, mac: &MacAddress) -> Option<&PeerHealth> {
        self.peers.get(mac)
    }

    pub fn state_of(&self, mac: &MacAddress) -> Option<LinkState> {
        self.peers.get(mac).map(|p| p.state)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerHealth> + '_ {
        self.peers.values()
    }

    /// Peers currently considered dead relay targets
    pub fn blackout_peers(&self) -> Vec<MacAddress> {
        let mut macs: Vec<_> = self
            .peers
            .values()
            .filter(|p| p.state == LinkState::Blackout)
            .map(|p| p.mac)
            .collect();
        macs.sort();
        macs
    }

    pub fn status(&self) -> MeshStatus {
        self.peers
            .values()
            .fold(MeshStatus::default(), |mut status, peer| {
                match peer.state {
                    LinkState::Healthy => status.healthy += 1,
                    LinkState::Degraded => status.degraded += 1,
                    LinkState::Blackout => status.blackout += 1,
                }
                status
            })
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWN: MacAddress = MacAddress::new([0; 6]);
    const PEER: MacAddress = MacAddress::new([1; 6]);
    const W: u64 = HEARTBEAT_INTERVAL_MS;

    fn heartbeat(mac: MacAddress, battery: u8) -> HeartbeatPacket {
        HeartbeatPacket {
            origin_mac: mac,
            timestamp: 1,
            battery_pct: battery,
            wifi_connected: 1,
            reserved: [0; 2],
        }
    }

    #[test]
    fn test_new_peer_starts_healthy() {
        let mut monitor = LinkHealthMonitor::new(OWN);
        assert_eq!(monitor.record_heartbeat(&heartbeat(PEER, 90), 0), None);
        assert_eq!(monitor.state_of(&PEER), Some(LinkState::Healthy));
        assert!(monitor.poll(W - 1).is_empty());
    }

    #[test]
    fn test_degraded_after_one_window() {
        let mut monitor = LinkHealthMonitor::new(OWN);
        monitor.record_heartbeat(&heartbeat(PEER, 90), 0);
        let transitions = monitor.poll(W);
        assert_eq!(
            transitions,
            vec![LinkTransition {
                mac: PEER,
                from: LinkState::Healthy,
                to: LinkState::Degraded,
                consecutive_failures: 1,
            }]
        );
        // no repeat while state is unchanged
        assert!(monitor.poll(W + 10).is_empty());
    }

    #[test]
    fn test_blackout_then_recovery() {
        let mut monitor = LinkHealthMonitor::new(OWN);
        monitor.record_heartbeat(&heartbeat(PEER, 90), 1_000);

        monitor.poll(1_000 + W);
        monitor.poll(1_000 + 2 * W);
        assert_eq!(monitor.state_of(&PEER), Some(LinkState::Degraded));

        let transitions = monitor.poll(1_000 + 3 * W);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, LinkState::Blackout);
        assert_eq!(monitor.peer(&PEER).unwrap().consecutive_failures, 3);
        assert_eq!(monitor.blackout_peers(), vec![PEER]);
        assert!(monitor.status().blackout_mode());

        let recovered = monitor.record_heartbeat(&heartbeat(PEER, 80), 1_000 + 3 * W + 5);
        assert_eq!(
            recovered,
            Some(LinkTransition {
                mac: PEER,
                from: LinkState::Blackout,
                to: LinkState::Healthy,
                consecutive_failures: 0,
            })
        );
        let peer = monitor.peer(&PEER).unwrap();
        assert_eq!(peer.state, LinkState::Healthy);
        assert_eq!(peer.consecutive_failures, 0);
        assert!(!monitor.status().blackout_mode());
    }

    #[test]
    fn test_poll_can_jump_straight_to_blackout() {
        let mut monitor = LinkHealthMonitor::new(OWN);
        monitor.record_heartbeat(&heartbeat(PEER, 90), 0);
        let transitions = monitor.poll(10 * W);
        assert_eq!(transitions[0].from, LinkState::Healthy);
        assert_eq!(transitions[0].to, LinkState::Blackout);
        assert_eq!(transitions[0].consecutive_failures, 10);
    }

    #[test]
    fn test_own_heartbeat_ignored() {
        let mut monitor = LinkHealthMonitor::new(OWN);
        monitor.record_heartbeat(&heartbeat(OWN, 90), 0);
        assert!(monitor.is_empty());
    }

    #[test]
    fn test_battery_sentinel_preserved() {
        let mut monitor = LinkHealthMonitor::new(OWN);
        monitor.record_heartbeat(&heartbeat(PEER, 0xFF), 0);
        monitor.record_heartbeat(&heartbeat(MacAddress::new([2; 6]), 0), 0);
        assert_eq!(monitor.peer(&PEER).unwrap().battery, BatteryLevel::Unknown);
        assert_eq!(
            monitor.peer(&MacAddress::new([2; 6])).unwrap().battery,
            BatteryLevel::Percent(0)
        );
    }

    #[test]
    fn test_peer_table_is_bounded() {
        let mut monitor = LinkHealthMonitor::new(OWN);
        for i in 0..10_000u32 {
            let b = i.to_le_bytes();
            let mac = MacAddress::new([0xaa, 0xbb, b[0], b[1], b[2], b[3]]);
            monitor.record_heartbeat(&heartbeat(mac, 50), u64::from(i));
        }
        assert_eq!(monitor.len(), MAX_PEERS);
        // the survivors are the most recently heard
        assert!(monitor.peers().all(|p| p.last_heard_ms >= 10_000 - MAX_PEERS as u64));
    }

    #[test]
    fn test_full_table_evicts_blackout_peer_first() {
        let mut monitor = LinkHealthMonitor::with_window(OWN, 100).with_max_peers(3);
        let (a, b, c) = (
            MacAddress::new([1; 6]),
            MacAddress::new([2; 6]),
            MacAddress::new([3; 6]),
        );
        monitor.record_heartbeat(&heartbeat(a, 50), 0);
        monitor.record_heartbeat(&heartbeat(b, 50), 500);
        monitor.record_heartbeat(&heartbeat(c, 50), 600);
        monitor.poll(650);
        assert_eq!(monitor.blackout_peers(), vec![a]);

        let newcomer = MacAddress::new([4; 6]);
        assert_eq!(monitor.record_heartbeat(&heartbeat(newcomer, 50), 660), None);
        assert_eq!(monitor.len(), 3);
        assert_eq!(monitor.state_of(&a), None);
        assert_eq!(monitor.state_of(&newcomer), Some(LinkState::Healthy));

        // known peers refresh in place without evicting anyone
        monitor.record_heartbeat(&heartbeat(b, 50), 700);
        assert_eq!(monitor.len(), 3);
        assert!(monitor.state_of(&c).is_some());
    }

    #[test]
    fn test_status_counts() {
        let mut monitor = LinkHealthMonitor::with_window(OWN, 100);
        monitor.record_heartbeat(&heartbeat(MacAddress::new([1; 6]), 50), 0);
        monitor.record_heartbeat(&heartbeat(MacAddress::new([2; 6]), 50), 150);
        monitor.record_heartbeat(&heartbeat(MacAddress::new([3; 6]), 50), 320);
        monitor.poll(350);
        let status = monitor.status();
        assert_eq!(status.blackout, 1);
        assert_eq!(status.degraded, 1);
        assert_eq!(status.healthy, 1);
        assert_eq!(status.total(), 3);
    }
}
