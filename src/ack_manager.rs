//! ACK Manager module - opportunistic end-to-end acknowledgment
//!
//! A sink floods an Ack for each alert it consumes. The originator keeps its
//! own unacknowledged alerts and re-broadcasts them with exponential backoff
//! until an Ack arrives or the attempts run out. Delivery never depends on
//! this: flooding alone is the correctness mechanism.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::contracts::EmergencyPacket;

/// ACK Manager - backoff arithmetic shared by the tracker
pub struct AckManager;

impl AckManager {
    /// Calculate exponential backoff delay
    ///
    /// Formula: delay = min(base_ms * (backoff_multiplier ^ attempt), max_delay_ms)
    pub fn calculate_backoff_ms(attempt: u32, base_ms: u64, max_delay_ms: u64) -> u64 {
        let multiplier = crate::BACKOFF_MULTIPLIER;
        let backoff = base_ms.saturating_mul(multiplier.saturating_pow(attempt));
        backoff.min(max_delay_ms)
    }
}

/// Retransmission state for one originated alert
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetransmissionState {
    pub packet: EmergencyPacket,

    /// Re-broadcasts done so far
    pub attempt: u32,

    /// Monotonic time of the last transmission
    pub last_sent_ms: u64,

    /// Next scheduled retry time
    pub next_retry_ms: u64,
}

impl RetransmissionState {
    pub fn new(packet: EmergencyPacket, now_ms: u64, base_timeout_ms: u64) -> Self {
        Self {
            packet,
            attempt: 0,
            last_sent_ms: now_ms,
            next_retry_ms: now_ms.saturating_add(base_timeout_ms),
        }
    }

    pub fn is_ready_for_retry(&self, now_ms: u64) -> bool {
        now_ms >= self.next_retry_ms
    }

    /// Schedule next retry with exponential backoff
    pub fn schedule_next_retry(&mut self, now_ms: u64, base_timeout_ms: u64) {
        self.attempt += 1;
        let backoff_ms =
            AckManager::calculate_backoff_ms(self.attempt, base_timeout_ms, base_timeout_ms * 10);
        self.last_sent_ms = now_ms;
        self.next_retry_ms = now_ms.saturating_add(backoff_ms);
    }

    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.attempt >= max_attempts
    }
}

/// Work produced by one `AckTracker::poll`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AckPoll {
    /// Alerts to re-broadcast now
    pub retransmit: Vec<EmergencyPacket>,
    /// Alerts given up on
    pub timed_out: Vec<EmergencyPacket>,
}

/// Originator-side table of alerts waiting for an Ack
#[derive(Debug, Clone)]
pub struct AckTracker {
    pending: VecDeque<RetransmissionState>,
    base_timeout_ms: u64,
    max_attempts: u32,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::with_policy(crate::ACK_TIMEOUT_MS, crate::MAX_RETRANSMIT_ATTEMPTS)
    }

    pub fn with_policy(base_timeout_ms: u64, max_attempts: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            base_timeout_ms,
            max_attempts,
        }
    }

    /// Start waiting for an Ack to `packet`, sent at `now_ms`
    pub fn track(&mut self, packet: EmergencyPacket, now_ms: u64) {
        if packet.is_ack() {
            return;
        }
        if self
            .pending
            .iter()
            .any(|s| s.packet.dedup_key() == packet.dedup_key())
        {
            return;
        }
        self.pending
            .push_back(RetransmissionState::new(packet, now_ms, self.base_timeout_ms));
    }

    /// Match an incoming Ack; returns the alert it acknowledged
    pub fn acknowledge(&mut self, ack: &EmergencyPacket) -> Option<EmergencyPacket> {
        let idx = self.pending.iter().position(|s| ack.acknowledges(&s.packet))?;
        let state = self.pending.remove(idx)?;
        info!(
            timestamp = state.packet.timestamp,
            alert = %state.packet.alert_type,
            hops = ack.hop_count,
            attempts = state.attempt,
            "alert acknowledged"
        );
        Some(state.packet)
    }

    /// Collect due retransmissions and expire exhausted alerts
    pub fn poll(&mut self, now_ms: u64) -> AckPoll {
        let mut out = AckPoll::default();
        let base = self.base_timeout_ms;
        let max_attempts = self.max_attempts;

        self.pending.retain_mut(|state| {
            if !state.is_ready_for_retry(now_ms) {
                return true;
            }
            if state.is_exhausted(max_attempts) {
                warn!(
                    timestamp = state.packet.timestamp,
                    alert = %state.packet.alert_type,
                    "no ack after {} attempts",
                    state.attempt
                );
                out.timed_out.push(state.packet);
                return false;
            }
            state.schedule_next_retry(now_ms, base);
            debug!(
                timestamp = state.packet.timestamp,
                attempt = state.attempt,
                next_retry_ms = state.next_retry_ms,
                "re-broadcasting unacknowledged alert"
            );
            out.retransmit.push(state.packet);
            true
        });

        out
    }

    pub fn pending(&self) -> impl Iterator<Item = &RetransmissionState> + '_ {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{AlertPayload, AlertType, MacAddress};

    fn alert(ts: u32) -> EmergencyPacket {
        EmergencyPacket::alert(
            MacAddress::new([1; 6]),
            ts,
            AlertType::Manual,
            AlertPayload {
                spo2: 97,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_exponential_backoff() {
        assert_eq!(AckManager::calculate_backoff_ms(0, 100, 5000), 100);
        assert_eq!(AckManager::calculate_backoff_ms(1, 100, 5000), 200);
        assert_eq!(AckManager::calculate_backoff_ms(2, 100, 5000), 400);
        assert_eq!(AckManager::calculate_backoff_ms(3, 100, 5000), 800);
        assert_eq!(AckManager::calculate_backoff_ms(10, 100, 5000), 5000); // Capped
        assert_eq!(AckManager::calculate_backoff_ms(200, 100, 5000), 5000);
    }

    #[test]
    fn test_retransmission_state() {
        let mut state = RetransmissionState::new(alert(1), 0, 100);

        assert_eq!(state.attempt, 0);
        assert!(!state.is_exhausted(3));
        assert!(!state.is_ready_for_retry(99));
        assert!(state.is_ready_for_retry(100));

        state.schedule_next_retry(100, 100);
        assert_eq!(state.attempt, 1);
        assert_eq!(state.next_retry_ms, 300);
        assert!(!state.is_ready_for_retry(299));
    }

    #[test]
    fn test_ack_clears_pending() {
        let mut tracker = AckTracker::with_policy(100, 3);
        let pkt = alert(10);
        tracker.track(pkt, 0);
        tracker.track(pkt, 5);
        assert_eq!(tracker.len(), 1);

        let ack = EmergencyPacket::ack_for(&pkt, MacAddress::new([9; 6]));
        assert_eq!(tracker.acknowledge(&ack), Some(pkt));
        assert!(tracker.is_empty());
        assert_eq!(tracker.acknowledge(&ack), None);
    }

    #[test]
    fn test_unrelated_ack_ignored() {
        let mut tracker = AckTracker::with_policy(100, 3);
        tracker.track(alert(10), 0);
        let ack = EmergencyPacket::ack_for(&alert(11), MacAddress::new([9; 6]));
        assert_eq!(tracker.acknowledge(&ack), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_retries_then_timeout() {
        let mut tracker = AckTracker::with_policy(100, 3);
        let pkt = alert(10);
        tracker.track(pkt, 0);

        assert_eq!(tracker.poll(50), AckPoll::default());

        // attempts at 100, 300, 700, then give up at 1500
        let mut now = 100;
        for expected_attempt in 1..=3u32 {
            let polled = tracker.poll(now);
            assert_eq!(polled.retransmit, vec![pkt]);
            let state = tracker.pending().next().unwrap();
            assert_eq!(state.attempt, expected_attempt);
            now = state.next_retry_ms;
        }
        assert_eq!(now, 1500);

        let polled = tracker.poll(now);
        assert!(polled.retransmit.is_empty());
        assert_eq!(polled.timed_out, vec![pkt]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_acks_are_not_tracked() {
        let mut tracker = AckTracker::new();
        tracker.track(EmergencyPacket::ack_for(&alert(1), MacAddress::new([2; 6])), 0);
        assert!(tracker.is_empty());
    }
}
