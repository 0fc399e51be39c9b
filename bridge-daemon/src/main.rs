//! RaptorHab Bridge Daemon
//!
//! Runs the radio packet bridge on a host machine. Radio traffic comes from
//! the simulator; framed packets and status text go to a serial port (or
//! standard output), where the ground station software reads them.

mod log_panel;
mod serial_io;
mod settings;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bridge_core::{Bridge, BridgeError};
use clap::Parser;
use bridge_sim::{simulated_radio, virtual_peer, RadioFeeder, SimulatedBattery, TrafficGenerator, VirtualPeer};
use tracing::{debug, info, warn};

use log_panel::LogPanel;
use serial_io::DaemonWired;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "raptor-bridge")]
#[command(version)]
#[command(about = "RaptorHab radio packet bridge", long_about = None)]
struct Args {
    /// Settings file (default: platform config dir)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Serial port for wired output (default: stdout)
    #[arg(short, long, value_name = "PATH")]
    port: Option<String>,

    /// Stop after this many seconds
    #[arg(short, long, value_name = "SECS")]
    duration: Option<u64>,

    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Include all our crates in the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "raptor_bridge=info,bridge_core=info,bridge_protocol=info,bridge_sim=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        settings.wired.port = port;
    }

    if args.write_config {
        let path = args
            .config
            .or_else(Settings::default_path)
            .context("Could not determine settings path")?;
        settings.save(&path)?;
        println!("Settings written to {}", path.display());
        return Ok(());
    }

    info!("Starting RaptorHab bridge");
    run(settings, args.duration.map(Duration::from_secs)).await
}

async fn run(settings: Settings, duration: Option<Duration>) -> Result<()> {
    let config = settings.bridge_config();
    let caps = config.capabilities;
    let stop = Arc::new(AtomicBool::new(false));

    let (radio, feeder) = simulated_radio();
    let (mut peer, link, events) = virtual_peer(settings.peer.queue_capacity);

    let mut builder = Bridge::builder(radio).config(config).panel(LogPanel);
    if caps.wired {
        let wired = DaemonWired::open(&settings.wired)
            .with_context(|| format!("Failed to open serial port '{}'", settings.wired.port))?;
        builder = builder.wired(wired);
    }
    if caps.wireless {
        builder = builder.wireless(link, events);
        if settings.peer.connect {
            peer.connect(settings.peer.mtu);
        }
    }
    if caps.battery {
        builder = builder.battery(SimulatedBattery::new(settings.battery_voltage).with_drain(1));
    }
    let mut bridge = builder.build()?;

    let bridge_stop = stop.clone();
    let bridge_task = tokio::task::spawn_blocking(move || {
        let result = bridge.serve(&bridge_stop);
        (result, *bridge.stats())
    });

    let traffic = tokio::spawn(feed_traffic(
        feeder,
        TrafficGenerator::new(settings.traffic.clone()),
        Duration::from_millis(settings.frame_interval_ms.max(1)),
        stop.clone(),
    ));
    let listener = tokio::spawn(drain_peer(peer, stop.clone()));

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping"),
        _ = deadline => info!("Run time elapsed, stopping"),
    }
    stop.store(true, Ordering::Relaxed);

    let (result, stats) = bridge_task.await.context("Bridge thread panicked")?;
    let _ = traffic.await;
    let _ = listener.await;

    info!("{}", stats.report(None, None));
    match result {
        Ok(()) | Err(BridgeError::Stopped) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Deliver simulated frames until stopped
async fn feed_traffic(
    feeder: RadioFeeder,
    mut traffic: TrafficGenerator,
    interval: Duration,
    stop: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    while !stop.load(Ordering::Relaxed) {
        ticker.tick().await;
        let (frame, kind) = traffic.next_frame();
        debug!("Delivering simulated frame ({:?}, {} bytes)", kind, frame.data.len());
        if !feeder.deliver(frame) {
            warn!("Radio gone, stopping traffic");
            break;
        }
    }
    info!(
        "Traffic stopped: {} frames read, {} lost while the receiver was not armed",
        feeder.delivered(),
        feeder.missed()
    );
}

/// Consume what the bridge sends the virtual peer
async fn drain_peer(mut peer: VirtualPeer, stop: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    while !stop.load(Ordering::Relaxed) {
        ticker.tick().await;
        for packet in peer.take_packets() {
            debug!(
                "Peer received {} bytes (RSSI {:.1}, SNR {:.1})",
                packet.payload.len(),
                packet.rssi,
                packet.snr
            );
        }
    }
    let text = peer.text().to_string();
    if !text.is_empty() {
        debug!("Peer text: {}", text.trim_end());
    }
}
