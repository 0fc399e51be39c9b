//! Battery gauge

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Voltage of an empty LiPo cell
pub const VBAT_MIN: f32 = 3.0;
/// Voltage of a full LiPo cell
pub const VBAT_MAX: f32 = 4.2;

/// Battery voltage sensor
pub trait BatteryMonitor: Send {
    /// Sample the cell voltage
    fn read_voltage(&mut self) -> f32;
}

/// Coarse charge level used by the status panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryLevel {
    /// Above 50%
    Good,
    /// Above 20%
    Low,
    /// 20% or less
    Critical,
}

/// One battery reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Cell voltage
    pub voltage: f32,
    /// Charge estimate, linear between empty and full, 0-100
    pub percent: u8,
}

impl BatteryStatus {
    /// Derive the charge estimate from a voltage
    pub fn from_voltage(voltage: f32) -> Self {
        let fraction = (voltage - VBAT_MIN) / (VBAT_MAX - VBAT_MIN);
        let percent = (fraction * 100.0).round().clamp(0.0, 100.0) as u8;
        Self { voltage, percent }
    }

    /// Charge level class
    pub fn level(&self) -> BatteryLevel {
        match self.percent {
            51..=100 => BatteryLevel::Good,
            21..=50 => BatteryLevel::Low,
            _ => BatteryLevel::Critical,
        }
    }
}

/// Rate-limited sampling of a [`BatteryMonitor`]
///
/// Sampling may be slow (it powers a voltage divider), so the gauge reads at
/// most once per interval and serves the cached value in between.
pub struct BatteryGauge {
    monitor: Box<dyn BatteryMonitor>,
    interval: Duration,
    last_read: Option<Instant>,
    status: Option<BatteryStatus>,
}

impl std::fmt::Debug for BatteryGauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatteryGauge")
            .field("interval", &self.interval)
            .field("status", &self.status)
            .finish()
    }
}

impl BatteryGauge {
    /// Wrap a monitor
    pub fn new(monitor: Box<dyn BatteryMonitor>, interval: Duration) -> Self {
        Self {
            monitor,
            interval,
            last_read: None,
            status: None,
        }
    }

    /// Last reading, if any
    pub fn status(&self) -> Option<&BatteryStatus> {
        self.status.as_ref()
    }

    /// Read the sensor if the interval has elapsed
    pub fn sample(&mut self, now: Instant) -> Option<&BatteryStatus> {
        let due = self
            .last_read
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            let status = BatteryStatus::from_voltage(self.monitor.read_voltage());
            debug!("Battery: {:.2}V ({}%)", status.voltage, status.percent);
            self.status = Some(status);
            self.last_read = Some(now);
        }
        self.status.as_ref()
    }
}
