//! Status panel rendered to the log

use bridge_core::{BatteryStatus, Capabilities, Statistics, StatusPanel, WirelessSession};
use bridge_protocol::RfConfig;
use tracing::{debug, error, info};

/// Writes panel updates as log lines
#[derive(Debug, Default)]
pub struct LogPanel;

impl StatusPanel for LogPanel {
    fn show_waiting(&mut self, defaults: &RfConfig) {
        info!("[panel] Waiting for config (default {})", defaults);
    }

    fn show_countdown(&mut self, remaining_secs: u64) {
        if remaining_secs % 10 == 0 {
            info!("[panel] Defaults in {}s", remaining_secs);
        }
    }

    fn draw_layout(&mut self, config: &RfConfig, capabilities: Capabilities) {
        info!(
            "[panel] {:.1} MHz {:.0} kbps ({})",
            config.frequency_mhz,
            config.bitrate_kbps,
            capabilities.describe()
        );
    }

    fn draw_signal(&mut self, rssi: f32, snr: f32) {
        debug!("[panel] RSSI {:.1} dBm SNR {:.1} dB", rssi, snr);
    }

    fn draw_stats(&mut self, stats: &Statistics) {
        debug!(
            "[panel] RX {} OK {} ({:.1}%)",
            stats.total,
            stats.forwarded,
            stats.success_rate()
        );
    }

    fn draw_aux(&mut self, battery: Option<&BatteryStatus>, session: Option<&WirelessSession>) {
        let link = match session {
            Some(s) if s.is_connected() => "connected",
            Some(_) => "idle",
            None => "-",
        };
        match battery {
            Some(b) => debug!("[panel] BLE {} Batt {:.2}V {}% {:?}", link, b.voltage, b.percent, b.level()),
            None => debug!("[panel] BLE {}", link),
        }
    }

    fn show_fatal(&mut self, message: &str) {
        error!("[panel] {}", message);
    }
}
