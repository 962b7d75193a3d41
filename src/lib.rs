//! Suraxit Core - Emergency mesh relay protocol
//!
//! This library implements the on-device protocol core shared by Suraxit
//! sensor nodes, relay nodes and the gateway: the packed wire format, the
//! flooding relay with duplicate suppression, heartbeat-based link health
//! and the threshold classifier that turns sensor readings into alerts.
//!
//! # Design Principles
//! - Byte-exact, little-endian packed packets (no struct layout tricks)
//! - Naive flooding: no routing tables, correctness under node churn
//! - Fixed-size state: dedup table and link table never grow unbounded
//! - A malformed or hostile frame is a dropped frame, never a fault

pub mod ack_manager;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod contracts;
pub mod dedup;
pub mod errors;
pub mod link_health;
pub mod logging;
pub mod node;
pub mod receiver;
pub mod relay;
pub mod simulation;
pub mod transmitter;

pub use classifier::{classify, Evaluation, SensorReadings, Severity};
pub use codec::{decode, Packet};
pub use config::{NodeConfig, NodeRole};
pub use contracts::{AlertType, DedupKey, EmergencyPacket, HeartbeatPacket, MacAddress, PacketType};
pub use errors::{DecodeError, Result, SuraxitError};
pub use relay::{RelayEngine, RelayOutcome};

// ── Fleet-wide protocol constants ──

/// Packets at or above this hop count are never re-broadcast
pub const MAX_HOP_COUNT: u8 = 5;

/// Heartbeat origination period, also the link-health miss window
pub const HEARTBEAT_INTERVAL_MS: u64 = 5000;

/// Consecutive missed heartbeat windows before a peer is in blackout
pub const BLACKOUT_THRESHOLD: u32 = 3;

/// Sensor evaluation / data push period
pub const DATA_PUSH_INTERVAL_MS: u64 = 1000;

/// Number of recent alerts remembered for duplicate suppression
pub const DEDUP_TABLE_SIZE: usize = 16;

/// Peers tracked by link health; the longest-silent peer is evicted first
pub const MAX_PEERS: usize = 32;

/// Largest frame the radio delivers (ESP-NOW payload limit)
pub const MAX_FRAME_SIZE: usize = 250;

// ── Classifier thresholds ──

/// g-force spike indicating a fall
pub const FALL_ACCEL_THRESHOLD: f32 = 2.5;

/// Elevated motion warning
pub const FALL_ACCEL_WARNING: f32 = 1.8;

/// SpO2 below this is critical
pub const SPO2_CRITICAL: u8 = 90;

/// SpO2 below this is a warning
pub const SPO2_WARNING: u8 = 95;

/// Gas concentration (ppm) that requires evacuation
pub const GAS_HAZARDOUS: f32 = 50.0;

/// Gas concentration (ppm) that is monitored but not escalated
pub const GAS_MODERATE: f32 = 25.0;

// ── Opportunistic acknowledgment ──

/// Wait before the first re-broadcast of an unacknowledged alert
pub const ACK_TIMEOUT_MS: u64 = 2000;

/// Maximum re-broadcast attempts for an unacknowledged alert
pub const MAX_RETRANSMIT_ATTEMPTS: u32 = 3;

/// Backoff multiplier for re-broadcasts (exponential)
pub const BACKOFF_MULTIPLIER: u64 = 2;
