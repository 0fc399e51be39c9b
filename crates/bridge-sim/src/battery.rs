//! Simulated battery

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bridge_core::BatteryMonitor;

/// Battery whose voltage is set from outside and optionally drains per read
#[derive(Debug, Clone)]
pub struct SimulatedBattery {
    millivolts: Arc<AtomicU32>,
    drain_per_read_mv: u32,
}

impl SimulatedBattery {
    /// Battery at a fixed voltage
    pub fn new(voltage: f32) -> Self {
        Self {
            millivolts: Arc::new(AtomicU32::new(to_millivolts(voltage))),
            drain_per_read_mv: 0,
        }
    }

    /// Lose `millivolts` on every read
    pub fn with_drain(mut self, millivolts: u32) -> Self {
        self.drain_per_read_mv = millivolts;
        self
    }

    /// Set the voltage; every clone sees it
    pub fn set_voltage(&self, voltage: f32) {
        self.millivolts.store(to_millivolts(voltage), Ordering::Relaxed);
    }

    /// Current voltage
    pub fn voltage(&self) -> f32 {
        self.millivolts.load(Ordering::Relaxed) as f32 / 1000.0
    }
}

fn to_millivolts(voltage: f32) -> u32 {
    (voltage.max(0.0) * 1000.0).round() as u32
}

impl BatteryMonitor for SimulatedBattery {
    fn read_voltage(&mut self) -> f32 {
        let reading = self.voltage();
        if self.drain_per_read_mv > 0 {
            let drain = self.drain_per_read_mv;
            let _ = self
                .millivolts
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |mv| {
                    Some(mv.saturating_sub(drain))
                });
        }
        reading
    }
}
