use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use suraxit_core::classifier::SensorReadings;
use suraxit_core::contracts::{BatteryLevel, MacAddress};
use suraxit_core::node::{MeshNode, NodeEvent, NodeInputs};
use suraxit_core::receiver::{spawn_udp_receiver, RECEIVE_QUEUE_DEPTH};
use suraxit_core::transmitter::UdpRadio;
use suraxit_core::{NodeConfig, NodeRole, HEARTBEAT_INTERVAL_MS};

#[derive(Parser)]
#[command(name = "suraxit-node", about = "Suraxit mesh node over UDP broadcast")]
struct Cli {
    /// Node MAC address, e.g. 24:6f:28:01:02:03
    #[arg(short, long)]
    mac: MacAddress,

    /// Act as a gateway sink
    #[arg(long)]
    sink: bool,

    #[arg(long, default_value = "0.0.0.0:4210")]
    bind: SocketAddr,

    /// Broadcast address standing in for the radio
    #[arg(long, default_value = "255.255.255.255:4210")]
    broadcast: SocketAddr,

    #[arg(long, default_value_t = HEARTBEAT_INTERVAL_MS)]
    heartbeat_ms: u64,

    /// Battery percentage advertised in heartbeats
    #[arg(long)]
    battery: Option<u8>,

    /// Do not flood Acks for consumed alerts
    #[arg(long)]
    no_acks: bool,

    /// Static acceleration magnitude in g
    #[arg(long, default_value_t = 1.0)]
    accel: f32,

    #[arg(long, default_value_t = 98)]
    spo2: u8,

    #[arg(long, default_value_t = 72)]
    heart_rate: u16,

    #[arg(long, default_value_t = 0.0)]
    gas_ppm: f32,

    /// Press the manual alert button once at startup
    #[arg(long)]
    manual: bool,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn report(event: &NodeEvent) {
    match event {
        NodeEvent::AlertReceived { packet, severity } => info!(
            origin = %packet.origin_mac,
            alert = %packet.alert_type,
            ?severity,
            spo2 = packet.payload.spo2,
            heart_rate = packet.payload.heart_rate,
            gas_ppm = packet.payload.gas_ppm,
            hops = packet.hop_count,
            "EMERGENCY"
        ),
        NodeEvent::AckTimedOut { packet } => {
            warn!(alert = %packet.alert_type, timestamp = packet.timestamp, "alert unacknowledged")
        }
        other => info!(event = ?other, "node event"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.json_logs {
        suraxit_core::logging::init_json();
    } else {
        suraxit_core::logging::init();
    }

    let battery = match cli.battery.map(BatteryLevel::percent).transpose() {
        Ok(level) => level.unwrap_or(BatteryLevel::Unknown),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let role = if cli.sink { NodeRole::Sink } else { NodeRole::Relay };
    let config = NodeConfig::new(cli.mac)
        .with_role(role)
        .with_heartbeat_interval_ms(cli.heartbeat_ms)
        .with_acks(!cli.no_acks)
        .with_battery(battery)
        .with_wifi_connected(cli.sink);

    let radio = match UdpRadio::bind(cli.bind, cli.broadcast).await {
        Ok(radio) => radio,
        Err(e) => {
            error!("failed to bind radio on {}: {e}", cli.bind);
            std::process::exit(1);
        }
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    let (frame_tx, frame_rx) = mpsc::channel(RECEIVE_QUEUE_DEPTH);
    let pump = spawn_udp_receiver(radio.socket(), frame_tx, stop_rx.clone());

    let readings = SensorReadings {
        accel_magnitude: cli.accel,
        spo2: cli.spo2,
        heart_rate: cli.heart_rate,
        gas_ppm: cli.gas_ppm,
        manual_trigger: false,
    };
    let (_readings_tx, readings_rx) = watch::channel(readings);
    let (manual_tx, manual_rx) = mpsc::channel(4);
    if cli.manual {
        let _ = manual_tx.try_send(());
    }

    let (event_tx, mut event_rx) = mpsc::channel(64);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            report(&event);
        }
    });

    let signal_stop = Arc::clone(&stop_tx);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received SIGINT, shutting down");
        let _ = signal_stop.send(true);
    });

    let node = MeshNode::new(config, radio);
    let inputs = NodeInputs {
        frames: frame_rx,
        readings: readings_rx,
        manual: manual_rx,
        shutdown: stop_rx,
    };

    let stats = node.run(inputs, event_tx).await;
    info!(?stats, "relay totals");
    let _ = stop_tx.send(true);
    if let Ok(stats) = pump.await {
        info!(?stats, "receive totals");
    }
    drop(manual_tx);
}
