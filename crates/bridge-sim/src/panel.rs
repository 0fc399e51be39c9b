//! Recording status panel
//!
//! Records every call the bridge makes instead of drawing pixels.

use std::sync::{Arc, Mutex};

use bridge_core::{BatteryStatus, Capabilities, Statistics, StatusPanel, WirelessSession};
use bridge_protocol::RfConfig;

/// One panel call
#[derive(Debug, Clone, PartialEq)]
pub enum PanelCall {
    /// Waiting screen
    Waiting(RfConfig),
    /// Countdown update
    Countdown(u64),
    /// Full static layout
    Layout(RfConfig),
    /// Signal region
    Signal {
        /// RSSI shown
        rssi: f32,
        /// SNR shown
        snr: f32,
    },
    /// Statistics region
    Stats(Statistics),
    /// Battery / wireless indicators
    Aux {
        /// Battery shown, if any
        battery: Option<BatteryStatus>,
        /// Wireless connection shown, if the capability exists
        connected: Option<bool>,
    },
    /// Fatal screen
    Fatal(String),
}

/// Panel that records calls for later inspection
#[derive(Debug, Clone, Default)]
pub struct RecordingPanel {
    calls: Arc<Mutex<Vec<PanelCall>>>,
}

impl RecordingPanel {
    /// Create an empty recorder; clones share the record
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls made so far
    pub fn calls(&self) -> Vec<PanelCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Number of calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&PanelCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn push(&self, call: PanelCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl StatusPanel for RecordingPanel {
    fn show_waiting(&mut self, defaults: &RfConfig) {
        self.push(PanelCall::Waiting(*defaults));
    }

    fn show_countdown(&mut self, remaining_secs: u64) {
        self.push(PanelCall::Countdown(remaining_secs));
    }

    fn draw_layout(&mut self, config: &RfConfig, _capabilities: Capabilities) {
        self.push(PanelCall::Layout(*config));
    }

    fn draw_signal(&mut self, rssi: f32, snr: f32) {
        self.push(PanelCall::Signal { rssi, snr });
    }

    fn draw_stats(&mut self, stats: &Statistics) {
        self.push(PanelCall::Stats(*stats));
    }

    fn draw_aux(&mut self, battery: Option<&BatteryStatus>, session: Option<&WirelessSession>) {
        self.push(PanelCall::Aux {
            battery: battery.copied(),
            connected: session.map(WirelessSession::is_connected),
        });
    }

    fn show_fatal(&mut self, message: &str) {
        self.push(PanelCall::Fatal(message.to_string()));
    }
}
