//! Relay engine - the mesh flooding state machine
//!
//! For every Emergency/Ack frame heard, decide whether to forward it, drop
//! it, and (on a sink) surface it. The dedup table is the only loop
//! prevention and doubles as the exactly-once guard for consumption.
//! Heartbeats are single-hop and are handed back to the caller untouched.

use tracing::{debug, trace, warn};

use crate::codec::{decode, Packet};
use crate::config::NodeRole;
use crate::contracts::{EmergencyPacket, HeartbeatPacket, MacAddress, EMERGENCY_PACKET_SIZE};
use crate::dedup::DedupTable;
use crate::errors::DecodeError;
use crate::MAX_HOP_COUNT;

/// Why an Emergency/Ack packet was not re-broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Key already in the dedup table
    Duplicate,
    /// Travelled `MAX_HOP_COUNT` hops already
    HopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Re-broadcast this rewritten packet
    Forward(EmergencyPacket),
    Drop(DropReason),
}

/// Decision for one Emergency/Ack packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayOutcome {
    /// The packet as received
    pub packet: EmergencyPacket,
    pub verdict: Verdict,
    /// First time this node saw the packet's dedup key
    pub first_seen: bool,
    /// A sink should surface this alert now (exactly once per key)
    pub deliver: bool,
}

impl RelayOutcome {
    pub fn forwarded(&self) -> Option<&EmergencyPacket> {
        match &self.verdict {
            Verdict::Forward(pkt) => Some(pkt),
            Verdict::Drop(_) => None,
        }
    }

    /// Frame to hand to the radio, if any
    pub fn forward_frame(&self) -> Option<[u8; EMERGENCY_PACKET_SIZE]> {
        self.forwarded().map(EmergencyPacket::encode)
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        match self.verdict {
            Verdict::Forward(_) => None,
            Verdict::Drop(reason) => Some(reason),
        }
    }
}

/// What a raw frame turned out to be
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reception {
    Alert(RelayOutcome),
    Heartbeat(HeartbeatPacket),
    Malformed(DecodeError),
}

/// Diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub frames_received: u64,
    pub forwarded: u64,
    pub duplicates: u64,
    pub hop_limited: u64,
    pub truncated: u64,
    pub unknown_type: u64,
    pub consumed: u64,
    pub originated: u64,
}

/// Flooding relay for one node
#[derive(Debug, Clone)]
pub struct RelayEngine {
    own_mac: MacAddress,
    role: NodeRole,
    dedup: DedupTable,
    stats: RelayStats,
}

impl RelayEngine {
    pub fn new(own_mac: MacAddress, role: NodeRole) -> Self {
        Self::with_table(own_mac, role, DedupTable::new())
    }

    pub fn with_table(own_mac: MacAddress, role: NodeRole, dedup: DedupTable) -> Self {
        Self {
            own_mac,
            role,
            dedup,
            stats: RelayStats::default(),
        }
    }

    pub fn own_mac(&self) -> MacAddress {
        self.own_mac
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn dedup_table(&self) -> &DedupTable {
        &self.dedup
    }

    /// Decode a raw frame and run it through the relay rules.
    ///
    /// Never fails: malformed frames come back as `Reception::Malformed`
    /// and are counted.
    pub fn receive_frame(&mut self, frame: &[u8]) -> Reception {
        self.stats.frames_received += 1;
        match decode(frame) {
            Ok(Packet::Emergency(pkt)) => Reception::Alert(self.handle_packet(pkt)),
            Ok(Packet::Heartbeat(hb)) => Reception::Heartbeat(hb),
            Err(err) => {
                match err {
                    DecodeError::TruncatedBuffer { .. } => self.stats.truncated += 1,
                    DecodeError::UnknownPacketType(_) => self.stats.unknown_type += 1,
                }
                debug!(len = frame.len(), error = %err, "dropping malformed frame");
                Reception::Malformed(err)
            }
        }
    }

    /// Apply dedup, hop bound and forwarding to a decoded Emergency/Ack packet
    pub fn handle_packet(&mut self, packet: EmergencyPacket) -> RelayOutcome {
        let key = packet.dedup_key();

        if !self.dedup.check_and_insert(key) {
            self.stats.duplicates += 1;
            trace!(
                origin = %packet.origin_mac,
                timestamp = packet.timestamp,
                via = %packet.relay_mac,
                "duplicate dropped"
            );
            return RelayOutcome {
                packet,
                verdict: Verdict::Drop(DropReason::Duplicate),
                first_seen: false,
                deliver: false,
            };
        }

        let deliver = self.role == NodeRole::Sink && !packet.is_ack();
        if deliver {
            self.stats.consumed += 1;
        }

        if packet.hop_count >= MAX_HOP_COUNT {
            self.stats.hop_limited += 1;
            debug!(
                origin = %packet.origin_mac,
                timestamp = packet.timestamp,
                hops = packet.hop_count,
                "hop limit reached, not forwarding"
            );
            return RelayOutcome {
                packet,
                verdict: Verdict::Drop(DropReason::HopLimit),
                first_seen: true,
                deliver,
            };
        }

        let mut forward = packet;
        forward.relay_mac = self.own_mac;
        forward.hop_count += 1;
        self.stats.forwarded += 1;
        debug!(
            origin = %packet.origin_mac,
            timestamp = packet.timestamp,
            kind = ?packet.packet_type,
            hops = forward.hop_count,
            "forwarding"
        );

        RelayOutcome {
            packet,
            verdict: Verdict::Forward(forward),
            first_seen: true,
            deliver,
        }
    }

    /// Mark a locally built packet as seen and return its frame.
    ///
    /// Echoes of it coming back from neighbors are then dropped as
    /// duplicates. Re-originating a key that is already known is logged but
    /// still encoded, which is how unacknowledged alerts are re-broadcast.
    /// Acks carry the acknowledged alert's origin, not ours.
    pub fn originate(&mut self, packet: &EmergencyPacket) -> [u8; EMERGENCY_PACKET_SIZE] {
        if packet.origin_mac != self.own_mac && !packet.is_ack() {
            warn!(
                origin = %packet.origin_mac,
                own = %self.own_mac,
                "originating packet with foreign origin"
            );
        }
        if self.dedup.check_and_insert(packet.dedup_key()) {
            self.stats.originated += 1;
        } else {
            debug!(timestamp = packet.timestamp, "re-broadcasting known packet");
        }
        packet.encode()
    }
}
