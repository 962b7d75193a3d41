//! Packet codec - packed little-endian wire format
//!
//! Every node in the fleet must produce byte-identical frames, so fields are
//! written one by one in declaration order with no padding. Decoding only
//! rejects what is structurally impossible (short buffer, unknown type byte);
//! range checks belong to the classifier and relay.

use crate::contracts::{
    AlertPayload, AlertType, EmergencyPacket, HeartbeatPacket, MacAddress, PacketType,
    EMERGENCY_PACKET_SIZE, HEARTBEAT_PACKET_SIZE,
};
use crate::errors::{DecodeError, Result, SuraxitError};

/// A decoded frame of either wire variant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet {
    /// Emergency or Ack, which share one layout
    Emergency(EmergencyPacket),
    Heartbeat(HeartbeatPacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Emergency(pkt) => pkt.packet_type,
            Self::Heartbeat(_) => PacketType::Heartbeat,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Emergency(_) => EMERGENCY_PACKET_SIZE,
            Self::Heartbeat(_) => HEARTBEAT_PACKET_SIZE,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Emergency(pkt) => pkt.encode().to_vec(),
            Self::Heartbeat(hb) => hb.encode().to_vec(),
        }
    }

    /// Encode into a caller buffer, returning the number of bytes written
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(SuraxitError::BufferTooSmall {
                required: len,
                available: buf.len(),
            });
        }
        match self {
            Self::Emergency(pkt) => buf[..len].copy_from_slice(&pkt.encode()),
            Self::Heartbeat(hb) => buf[..len].copy_from_slice(&hb.encode()),
        }
        Ok(len)
    }
}

impl From<EmergencyPacket> for Packet {
    fn from(pkt: EmergencyPacket) -> Self {
        Self::Emergency(pkt)
    }
}

impl From<HeartbeatPacket> for Packet {
    fn from(hb: HeartbeatPacket) -> Self {
        Self::Heartbeat(hb)
    }
}

/// Decode one frame. Bytes past the variant's fixed size are ignored.
pub fn decode(bytes: &[u8]) -> std::result::Result<Packet, DecodeError> {
    let first = *bytes.first().ok_or(DecodeError::TruncatedBuffer {
        expected: 1,
        received: 0,
    })?;
    let packet_type = PacketType::from_byte(first).ok_or(DecodeError::UnknownPacketType(first))?;

    match packet_type {
        PacketType::Emergency | PacketType::Ack => {
            EmergencyPacket::decode(bytes).map(Packet::Emergency)
        }
        PacketType::Heartbeat => HeartbeatPacket::decode(bytes).map(Packet::Heartbeat),
    }
}

/// Cursor over a fixed-size output array
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn u8(&mut self, v: u8) {
        self.put(&[v]);
    }
}

/// Cursor over an input slice already checked to be long enough
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn mac(&mut self) -> MacAddress {
        MacAddress(self.take())
    }
}

fn check_len(bytes: &[u8], expected: usize) -> std::result::Result<(), DecodeError> {
    if bytes.len() < expected {
        return Err(DecodeError::TruncatedBuffer {
            expected,
            received: bytes.len(),
        });
    }
    Ok(())
}

impl EmergencyPacket {
    pub fn encode(&self) -> [u8; EMERGENCY_PACKET_SIZE] {
        let mut out = [0u8; EMERGENCY_PACKET_SIZE];
        let mut w = Writer::new(&mut out);
        w.u8(self.packet_type.as_byte());
        w.put(self.origin_mac.as_bytes());
        w.put(&self.timestamp.to_le_bytes());
        w.u8(self.alert_type.as_byte());
        w.put(&self.payload.fall_prob.to_le_bytes());
        w.u8(self.payload.spo2);
        w.put(&self.payload.heart_rate.to_le_bytes());
        w.put(&self.payload.gas_ppm.to_le_bytes());
        w.put(&self.payload.accel_magnitude.to_le_bytes());
        w.u8(self.hop_count);
        w.put(self.relay_mac.as_bytes());
        debug_assert_eq!(w.pos, EMERGENCY_PACKET_SIZE);
        out
    }

    /// Decode an Emergency or Ack frame
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        check_len(bytes, EMERGENCY_PACKET_SIZE)?;
        let mut r = Reader::new(bytes);
        let type_byte = r.u8();
        let packet_type = match PacketType::from_byte(type_byte) {
            Some(t @ (PacketType::Emergency | PacketType::Ack)) => t,
            _ => return Err(DecodeError::UnknownPacketType(type_byte)),
        };
        let origin_mac = r.mac();
        let timestamp = r.u32();
        let alert_type = AlertType::from_byte(r.u8());
        let fall_prob = r.f32();
        let spo2 = r.u8();
        let heart_rate = r.u16();
        let gas_ppm = r.f32();
        let accel_magnitude = r.f32();
        let hop_count = r.u8();
        let relay_mac = r.mac();

        Ok(Self {
            packet_type,
            origin_mac,
            timestamp,
            alert_type,
            payload: AlertPayload {
                fall_prob,
                spo2,
                heart_rate,
                gas_ppm,
                accel_magnitude,
            },
            hop_count,
            relay_mac,
        })
    }
}

impl HeartbeatPacket {
    pub fn encode(&self) -> [u8; HEARTBEAT_PACKET_SIZE] {
        let mut out = [0u8; HEARTBEAT_PACKET_SIZE];
        let mut w = Writer::new(&mut out);
        w.u8(PacketType::Heartbeat.as_byte());
        w.put(self.origin_mac.as_bytes());
        w.put(&self.timestamp.to_le_bytes());
        w.u8(self.battery_pct);
        w.u8(self.wifi_connected);
        w.put(&self.reserved);
        debug_assert_eq!(w.pos, HEARTBEAT_PACKET_SIZE);
        out
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        check_len(bytes, HEARTBEAT_PACKET_SIZE)?;
        let mut r = Reader::new(bytes);
        let type_byte = r.u8();
        if type_byte != PacketType::Heartbeat.as_byte() {
            return Err(DecodeError::UnknownPacketType(type_byte));
        }
        Ok(Self {
            origin_mac: r.mac(),
            timestamp: r.u32(),
            battery_pct: r.u8(),
            wifi_connected: r.u8(),
            reserved: r.take(),
        })
    }
}
