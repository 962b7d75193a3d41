//! Node runtime - one event context driving the protocol core
//!
//! `MeshNode` owns the node's relay engine, link health monitor and ack
//! tracker. Every mutation happens from the task running [`MeshNode::run`]
//! (or from the caller of the synchronous handlers), so none of that state is
//! shared or locked. Radio sends are fire-and-forget: failures are logged
//! and the node carries on.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ack_manager::AckTracker;
use crate::classifier::{classify, Alert, LocalWarnings, SensorReadings, Severity};
use crate::config::NodeConfig;
use crate::contracts::{AlertType, EmergencyPacket, HeartbeatPacket, MacAddress};
use crate::link_health::{LinkHealthMonitor, LinkTransition, MeshStatus};
use crate::relay::{Reception, RelayEngine, RelayStats};
use crate::transmitter::Radio;

/// Notifications for the node's external alerting collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// This node raised an alert
    AlertOriginated {
        packet: EmergencyPacket,
        severity: Severity,
    },
    /// A sink surfaces an alert (once per dedup key)
    AlertReceived {
        packet: EmergencyPacket,
        severity: Severity,
    },
    /// A sink confirmed one of our alerts; `hops` is how far the Ack travelled
    AlertAcknowledged { packet: EmergencyPacket, hops: u8 },
    /// Gave up waiting for an Ack; the alert may still have arrived
    AckTimedOut { packet: EmergencyPacket },
    LinkChanged(LinkTransition),
    /// Local-only warning state changed
    LocalWarning(LocalWarnings),
}

/// Channels feeding a running node
#[derive(Debug)]
pub struct NodeInputs {
    /// Raw radio frames
    pub frames: mpsc::Receiver<Vec<u8>>,
    /// Latest sensor readings, sampled every sensor tick
    pub readings: watch::Receiver<SensorReadings>,
    /// Manual alert button presses
    pub manual: mpsc::Receiver<()>,
    pub shutdown: watch::Receiver<bool>,
}

/// Current wall-clock time as protocol timestamp (epoch seconds)
pub fn epoch_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}

pub struct MeshNode<R: Radio> {
    config: NodeConfig,
    radio: R,
    relay: RelayEngine,
    links: LinkHealthMonitor,
    acks: AckTracker,
    last_alert: Option<AlertType>,
    last_warnings: Option<LocalWarnings>,
    last_timestamp: Option<u32>,
}

impl<R: Radio> MeshNode<R> {
    pub fn new(config: NodeConfig, radio: R) -> Self {
        let relay = RelayEngine::new(config.mac(), config.role());
        let links = LinkHealthMonitor::with_window(config.mac(), config.heartbeat_interval_ms());
        Self {
            config,
            radio,
            relay,
            links,
            acks: AckTracker::new(),
            last_alert: None,
            last_warnings: None,
            last_timestamp: None,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn relay(&self) -> &RelayEngine {
        &self.relay
    }

    pub fn links(&self) -> &LinkHealthMonitor {
        &self.links
    }

    pub fn acks(&self) -> &AckTracker {
        &self.acks
    }

    pub fn mesh_status(&self) -> MeshStatus {
        self.links.status()
    }

    fn transmit(&self, frame: &[u8]) {
        if let Err(err) = self.radio.broadcast(frame) {
            warn!(error = %err, len = frame.len(), "broadcast failed");
        }
    }

    /// Alert timestamps strictly increase so two alerts in one second keep
    /// distinct dedup keys
    fn next_timestamp(&mut self, now_secs: u32) -> u32 {
        let ts = match self.last_timestamp {
            Some(last) if now_secs <= last => last.wrapping_add(1),
            _ => now_secs,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    /// Process one raw frame heard on the radio
    pub fn handle_frame(&mut self, frame: &[u8], now_ms: u64) -> Vec<NodeEvent> {
        let mut events = Vec::new();

        match self.relay.receive_frame(frame) {
            Reception::Malformed(_) => {}
            Reception::Heartbeat(hb) => {
                if let Some(transition) = self.links.record_heartbeat(&hb, now_ms) {
                    events.push(NodeEvent::LinkChanged(transition));
                }
            }
            Reception::Alert(outcome) => {
                if let Some(frame) = outcome.forward_frame() {
                    self.transmit(&frame);
                }

                let packet = outcome.packet;
                if outcome.deliver {
                    let severity = Severity::of(&packet);
                    info!(
                        origin = %packet.origin_mac,
                        timestamp = packet.timestamp,
                        alert = %packet.alert_type,
                        ?severity,
                        hops = packet.hop_count,
                        "alert received"
                    );
                    events.push(NodeEvent::AlertReceived { packet, severity });

                    if self.config.acks_enabled() {
                        let ack = EmergencyPacket::ack_for(&packet, self.config.mac());
                        let frame = self.relay.originate(&ack);
                        self.transmit(&frame);
                    }
                }

                if outcome.first_seen && packet.is_ack() {
                    if let Some(acked) = self.acks.acknowledge(&packet) {
                        events.push(NodeEvent::AlertAcknowledged {
                            packet: acked,
                            hops: packet.hop_count,
                        });
                    }
                }
            }
        }

        events
    }

    /// Build, mark and broadcast an alert from this node
    pub fn originate(&mut self, alert: Alert, now_secs: u32, now_ms: u64) -> Vec<NodeEvent> {
        let timestamp = self.next_timestamp(now_secs);
        let packet = alert.into_packet(self.config.mac(), timestamp);
        let frame = self.relay.originate(&packet);
        self.transmit(&frame);

        let severity = Severity::of(&packet);
        info!(timestamp, alert = %packet.alert_type, ?severity, "alert originated");

        let mut events = vec![NodeEvent::AlertOriginated { packet, severity }];
        if self.config.is_sink() {
            events.push(NodeEvent::AlertReceived { packet, severity });
        } else {
            self.acks.track(packet, now_ms);
        }
        events
    }

    /// Sensor tick: raise an alert on a rising edge only
    pub fn evaluate(
        &mut self,
        readings: &SensorReadings,
        now_secs: u32,
        now_ms: u64,
    ) -> Vec<NodeEvent> {
        let evaluation = classify(readings);
        let mut events = Vec::new();

        if self.last_warnings != Some(evaluation.warnings) {
            if evaluation.warnings.any() {
                debug!(warnings = ?evaluation.warnings, "local warning state");
                events.push(NodeEvent::LocalWarning(evaluation.warnings));
            }
            self.last_warnings = Some(evaluation.warnings);
        }

        let current = evaluation.alert.map(|a| a.alert_type);
        if let Some(alert) = evaluation.alert {
            if self.last_alert != current {
                events.extend(self.originate(alert, now_secs, now_ms));
            }
        }
        self.last_alert = current;

        events
    }

    /// Manual button: always originates, highest-priority condition wins
    pub fn trigger_manual(
        &mut self,
        readings: &SensorReadings,
        now_secs: u32,
        now_ms: u64,
    ) -> Vec<NodeEvent> {
        let pressed = SensorReadings {
            manual_trigger: true,
            ..*readings
        };
        match classify(&pressed).alert {
            Some(alert) => {
                self.last_alert = Some(alert.alert_type);
                self.originate(alert, now_secs, now_ms)
            }
            None => Vec::new(),
        }
    }

    pub fn send_heartbeat(&mut self, now_secs: u32) {
        let hb = HeartbeatPacket::new(
            self.config.mac(),
            now_secs,
            self.config.battery(),
            self.config.wifi_connected(),
        );
        self.transmit(&hb.encode());
    }

    pub fn check_links(&mut self, now_ms: u64) -> Vec<NodeEvent> {
        self.links
            .poll(now_ms)
            .into_iter()
            .map(NodeEvent::LinkChanged)
            .collect()
    }

    /// Re-broadcast due alerts and report the ones given up on
    pub fn poll_acks(&mut self, now_ms: u64) -> Vec<NodeEvent> {
        let polled = self.acks.poll(now_ms);
        for packet in &polled.retransmit {
            let frame = self.relay.originate(packet);
            self.transmit(&frame);
        }
        polled
            .timed_out
            .into_iter()
            .map(|packet| NodeEvent::AckTimedOut { packet })
            .collect()
    }

    /// Run until shutdown or until the frame source closes, returning the
    /// relay totals
    pub async fn run(
        mut self,
        mut inputs: NodeInputs,
        events: mpsc::Sender<NodeEvent>,
    ) -> RelayStats {
        let start = Instant::now();
        let elapsed_ms = || start.elapsed().as_millis() as u64;

        let mut heartbeat = interval(Duration::from_millis(self.config.heartbeat_interval_ms()));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sensor = interval(Duration::from_millis(self.config.sensor_tick_ms()));
        sensor.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            mac = %self.config.mac(),
            role = ?self.config.role(),
            "node started"
        );

        loop {
            let produced = tokio::select! {
                changed = inputs.shutdown.changed() => {
                    if changed.is_err() || *inputs.shutdown.borrow() {
                        break;
                    }
                    Vec::new()
                }
                frame = inputs.frames.recv() => match frame {
                    Some(frame) => self.handle_frame(&frame, elapsed_ms()),
                    None => break,
                },
                _ = heartbeat.tick() => {
                    self.send_heartbeat(epoch_secs());
                    Vec::new()
                }
                _ = sensor.tick() => {
                    let now_ms = elapsed_ms();
                    let readings = *inputs.readings.borrow();
                    let mut produced = self.evaluate(&readings, epoch_secs(), now_ms);
                    produced.extend(self.check_links(now_ms));
                    produced.extend(self.poll_acks(now_ms));
                    produced
                }
                Some(()) = inputs.manual.recv() => {
                    let readings = *inputs.readings.borrow();
                    self.trigger_manual(&readings, epoch_secs(), elapsed_ms())
                }
            };

            for event in produced {
                if events.send(event).await.is_err() {
                    debug!("event listener gone, dropping notifications");
                }
            }
        }

        let stats = *self.relay.stats();
        info!(?stats, "node stopped");
        stats
    }
}
