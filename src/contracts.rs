//! Core data structures for the Suraxit mesh protocol
//!
//! These are the in-memory forms of the two wire formats. Field order here
//! mirrors the packed on-air layout; the actual byte work lives in
//! [`crate::codec`].

use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, SuraxitError};

/// Encoded size of an Emergency/Ack packet
pub const EMERGENCY_PACKET_SIZE: usize = 34;

/// Encoded size of a Heartbeat packet
pub const HEARTBEAT_PACKET_SIZE: usize = 15;

/// Battery byte meaning "level not known"
pub const BATTERY_UNKNOWN: u8 = 0xFF;

/// 6-byte hardware identity of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = SuraxitError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| SuraxitError::InvalidMacAddress(s.to_string()))?;
            if part.len() != 2 {
                return Err(SuraxitError::InvalidMacAddress(s.to_string()));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| SuraxitError::InvalidMacAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(SuraxitError::InvalidMacAddress(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

/// Wire discriminant, always the first byte of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Emergency = 0x01,
    Ack = 0x02,
    Heartbeat = 0x03,
}

impl PacketType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Emergency),
            0x02 => Some(Self::Ack),
            0x03 => Some(Self::Heartbeat),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Hazard carried by an Emergency packet.
///
/// Bytes this build does not know decode to `Unrecognized` and encode back
/// unchanged, so a relay running older firmware still floods newer alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertType {
    Fall,
    LowSpO2,
    Gas,
    Manual,
    Unrecognized(u8),
}

impl AlertType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::Fall,
            0x02 => Self::LowSpO2,
            0x03 => Self::Gas,
            0x04 => Self::Manual,
            other => Self::Unrecognized(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Fall => 0x01,
            Self::LowSpO2 => 0x02,
            Self::Gas => 0x03,
            Self::Manual => 0x04,
            Self::Unrecognized(other) => other,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fall => write!(f, "fall"),
            Self::LowSpO2 => write!(f, "low-spo2"),
            Self::Gas => write!(f, "gas"),
            Self::Manual => write!(f, "manual"),
            Self::Unrecognized(b) => write!(f, "unrecognized({:#04x})", b),
        }
    }
}

/// Identity of one alert event: who raised it and when.
///
/// An alert and the Ack answering it share `mac` and `timestamp`; `ack`
/// keeps them apart so both flood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub mac: MacAddress,
    pub timestamp: u32,
    pub ack: bool,
}

impl DedupKey {
    /// Key of an alert
    pub fn new(mac: MacAddress, timestamp: u32) -> Self {
        Self {
            mac,
            timestamp,
            ack: false,
        }
    }

    /// Key of the Ack answering the alert `(mac, timestamp)`
    pub fn for_ack(mac: MacAddress, timestamp: u32) -> Self {
        Self {
            mac,
            timestamp,
            ack: true,
        }
    }
}

/// Sensor values captured at alert time.
///
/// Set once by the originator; relays never touch these.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlertPayload {
    /// 0.0 – 1.0
    pub fall_prob: f32,
    /// 0 – 100 %
    pub spo2: u8,
    /// bpm
    pub heart_rate: u16,
    pub gas_ppm: f32,
    /// g-force at time of alert
    pub accel_magnitude: f32,
}

impl AlertPayload {
    /// Bitwise equality, so NaN and -0.0 compare the way they travel on air
    pub fn same_bits(&self, other: &AlertPayload) -> bool {
        self.fall_prob.to_bits() == other.fall_prob.to_bits()
            && self.spo2 == other.spo2
            && self.heart_rate == other.heart_rate
            && self.gas_ppm.to_bits() == other.gas_ppm.to_bits()
            && self.accel_magnitude.to_bits() == other.accel_magnitude.to_bits()
    }
}

/// EmergencyPacket - alert flooded toward the gateway (also the Ack layout)
///
/// # Wire Layout
/// Total size: 34 bytes, packed, little-endian
/// - packet_type: 1 byte
/// - origin_mac: 6 bytes
/// - timestamp: 4 bytes (u32 epoch seconds)
/// - alert_type: 1 byte
/// - fall_prob: 4 bytes (f32)
/// - spo2: 1 byte
/// - heart_rate: 2 bytes (u16)
/// - gas_ppm: 4 bytes (f32)
/// - accel_magnitude: 4 bytes (f32)
/// - hop_count: 1 byte
/// - relay_mac: 6 bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmergencyPacket {
    /// `Emergency` or `Ack`
    pub packet_type: PacketType,

    /// Originator identity, immutable once created
    pub origin_mac: MacAddress,

    /// Epoch seconds, wraps in 2106
    pub timestamp: u32,

    pub alert_type: AlertType,

    pub payload: AlertPayload,

    /// Relays traversed so far; 0 at origin
    pub hop_count: u8,

    /// Most recent relay, overwritten at every hop
    pub relay_mac: MacAddress,
}

impl EmergencyPacket {
    /// Build a fresh alert as it leaves its originator
    pub fn alert(
        origin_mac: MacAddress,
        timestamp: u32,
        alert_type: AlertType,
        payload: AlertPayload,
    ) -> Self {
        Self {
            packet_type: PacketType::Emergency,
            origin_mac,
            timestamp,
            alert_type,
            payload,
            hop_count: 0,
            relay_mac: origin_mac,
        }
    }

    /// Build the acknowledgment a sink floods back for `alert`.
    ///
    /// The Ack keeps the alert's origin and timestamp so its key is unique to
    /// that alert; the sink only shows up as the first `relay_mac`.
    pub fn ack_for(alert: &EmergencyPacket, sink_mac: MacAddress) -> Self {
        Self {
            packet_type: PacketType::Ack,
            origin_mac: alert.origin_mac,
            timestamp: alert.timestamp,
            alert_type: alert.alert_type,
            payload: alert.payload,
            hop_count: 0,
            relay_mac: sink_mac,
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        if self.is_ack() {
            DedupKey::for_ack(self.origin_mac, self.timestamp)
        } else {
            DedupKey::new(self.origin_mac, self.timestamp)
        }
    }

    pub fn is_ack(&self) -> bool {
        self.packet_type == PacketType::Ack
    }

    /// Whether this Ack answers the alert `original`
    pub fn acknowledges(&self, original: &EmergencyPacket) -> bool {
        self.is_ack()
            && !original.is_ack()
            && self.origin_mac == original.origin_mac
            && self.timestamp == original.timestamp
            && self.alert_type == original.alert_type
            && self.payload.same_bits(&original.payload)
    }
}

/// Battery level as reported in a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryLevel {
    Unknown,
    Percent(u8),
}

impl BatteryLevel {
    pub fn from_byte(byte: u8) -> Self {
        if byte == BATTERY_UNKNOWN {
            Self::Unknown
        } else {
            Self::Percent(byte)
        }
    }

    /// Validating constructor for locally measured levels
    pub fn percent(pct: u8) -> Result<Self> {
        if pct > 100 {
            return Err(SuraxitError::InvalidBatteryLevel(pct));
        }
        Ok(Self::Percent(pct))
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Unknown => BATTERY_UNKNOWN,
            Self::Percent(pct) => pct,
        }
    }

    /// Unknown never counts as low
    pub fn is_below(self, pct: u8) -> bool {
        matches!(self, Self::Percent(level) if level < pct)
    }
}

/// HeartbeatPacket - single-hop liveness beacon
///
/// # Wire Layout
/// Total size: 15 bytes, packed, little-endian
/// - packet_type: 1 byte
/// - origin_mac: 6 bytes
/// - timestamp: 4 bytes
/// - battery_pct: 1 byte (0xFF = unknown)
/// - wifi_connected: 1 byte
/// - reserved: 2 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPacket {
    pub origin_mac: MacAddress,
    pub timestamp: u32,
    pub battery_pct: u8,
    /// Raw byte; any non-zero value means connected
    pub wifi_connected: u8,
    /// Forward-compatibility bytes, carried through untouched
    pub reserved: [u8; 2],
}

impl HeartbeatPacket {
    pub fn new(
        origin_mac: MacAddress,
        timestamp: u32,
        battery: BatteryLevel,
        wifi_connected: bool,
    ) -> Self {
        Self {
            origin_mac,
            timestamp,
            battery_pct: battery.as_byte(),
            wifi_connected: u8::from(wifi_connected),
            reserved: [0; 2],
        }
    }

    pub fn battery(&self) -> BatteryLevel {
        BatteryLevel::from_byte(self.battery_pct)
    }

    pub fn is_wifi_connected(&self) -> bool {
        self.wifi_connected != 0
    }
}
