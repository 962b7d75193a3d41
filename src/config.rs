//! Node configuration.
//!
//! Protocol constants are fleet-wide and live in the crate root; this
//! builder only carries what differs per node (identity, role, timers).

use crate::contracts::{BatteryLevel, MacAddress};
use crate::{DATA_PUSH_INTERVAL_MS, HEARTBEAT_INTERVAL_MS};

/// What a node does with alerts it hears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRole {
    /// Relay only
    #[default]
    Relay,
    /// Gateway: consumes alerts (and still relays them)
    Sink,
}

/// NodeConfig - per-node settings with builder-style setters
#[derive(Debug, Clone)]
pub struct NodeConfig {
    mac: MacAddress,
    role: NodeRole,
    heartbeat_interval_ms: u64,
    sensor_tick_ms: u64,
    send_acks: bool,
    battery: BatteryLevel,
    wifi_connected: bool,
}

impl NodeConfig {
    /// Create a relay-node config with fleet defaults
    pub fn new(mac: MacAddress) -> Self {
        Self {
            mac,
            role: NodeRole::Relay,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            sensor_tick_ms: DATA_PUSH_INTERVAL_MS,
            send_acks: true,
            battery: BatteryLevel::Unknown,
            wifi_connected: false,
        }
    }

    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    /// Heartbeat period; also the link-health miss window
    pub fn with_heartbeat_interval_ms(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms.max(1);
        self
    }

    pub fn with_sensor_tick_ms(mut self, tick_ms: u64) -> Self {
        self.sensor_tick_ms = tick_ms.max(1);
        self
    }

    /// Whether a sink floods Acks for consumed alerts
    pub fn with_acks(mut self, enable: bool) -> Self {
        self.send_acks = enable;
        self
    }

    pub fn with_battery(mut self, battery: BatteryLevel) -> Self {
        self.battery = battery;
        self
    }

    pub fn with_wifi_connected(mut self, connected: bool) -> Self {
        self.wifi_connected = connected;
        self
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_sink(&self) -> bool {
        self.role == NodeRole::Sink
    }

    pub fn heartbeat_interval_ms(&self) -> u64 {
        self.heartbeat_interval_ms
    }

    pub fn sensor_tick_ms(&self) -> u64 {
        self.sensor_tick_ms
    }

    pub fn acks_enabled(&self) -> bool {
        self.send_acks
    }

    pub fn battery(&self) -> BatteryLevel {
        self.battery
    }

    pub fn wifi_connected(&self) -> bool {
        self.wifi_connected
    }
}
