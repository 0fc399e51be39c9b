//! Frame statistics
//!
//! Every radio read resolves to exactly one outcome, and every outcome bumps
//! `total` plus exactly one of the four outcome counters. That keeps
//!
//! ```text
//! total == forwarded + rejected_no_sync + rejected_bad_check + radio_error
//! ```
//!
//! true at every observation point.

use std::time::{Duration, Instant};

use bridge_protocol::{FrameRejection, PacketClass};
use serde::{Deserialize, Serialize};

use crate::battery::BatteryStatus;
use crate::wireless::WirelessSession;

/// Monotonic frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Every radio read that produced an outcome
    pub total: u64,
    /// Frames that passed validation and were handed to the framers
    pub forwarded: u64,
    /// Missing sync marker or too short
    pub rejected_no_sync: u64,
    /// CRC mismatch
    pub rejected_bad_check: u64,
    /// Failed read or impossible length
    pub radio_error: u64,
    /// Forwarded payloads under 100 bytes
    pub small: u64,
    /// Forwarded payloads of 100 bytes or more
    pub large: u64,
}

impl Statistics {
    /// Count one frame outcome
    pub fn record(&mut self, outcome: Result<PacketClass, FrameRejection>) {
        self.total += 1;
        match outcome {
            Ok(class) => {
                self.forwarded += 1;
                match class {
                    PacketClass::Small => self.small += 1,
                    PacketClass::Large => self.large += 1,
                }
            }
            Err(FrameRejection::RadioError) => self.radio_error += 1,
            Err(FrameRejection::TooShort | FrameRejection::NoSync) => self.rejected_no_sync += 1,
            Err(FrameRejection::BadCheck) => self.rejected_bad_check += 1,
        }
    }

    /// Percentage of frames forwarded (0 before the first frame)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.forwarded as f64 / self.total as f64
        }
    }

    /// Whether the outcome counters add up to the total
    pub fn is_consistent(&self) -> bool {
        self.total
            == self.forwarded + self.rejected_no_sync + self.rejected_bad_check + self.radio_error
            && self.forwarded == self.small + self.large
    }

    /// Render the periodic report (without trailing newline)
    pub fn report(
        &self,
        session: Option<&WirelessSession>,
        battery: Option<&BatteryStatus>,
    ) -> String {
        let mut line = format!(
            "[STATS] Total:{} Fwd:{} NoRAPT:{} BadCRC:{} Err:{} Rate:{:.1}% Small:{} Large:{}",
            self.total,
            self.forwarded,
            self.rejected_no_sync,
            self.rejected_bad_check,
            self.radio_error,
            self.success_rate(),
            self.small,
            self.large
        );
        if let Some(session) = session {
            line.push_str(if session.is_connected() {
                " BLE:Connected"
            } else {
                " BLE:Idle"
            });
        }
        if let Some(battery) = battery {
            line.push_str(&format!(" Batt:{:.2}V({}%)", battery.voltage, battery.percent));
        }
        line
    }
}

/// Owns the counters and decides when a report is due
#[derive(Debug)]
pub struct StatsTracker {
    stats: Statistics,
    period: Duration,
    last_report: Instant,
}

impl StatsTracker {
    /// Create a tracker whose first report falls one period after `now`
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            stats: Statistics::default(),
            period,
            last_report: now,
        }
    }

    /// Current counters
    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Count one frame outcome
    pub fn record(&mut self, outcome: Result<PacketClass, FrameRejection>) {
        self.stats.record(outcome);
    }

    /// Restart the report period, e.g. when the loop starts
    pub fn restart(&mut self, now: Instant) {
        self.last_report = now;
    }

    /// Returns a snapshot when a report is due, restarting the period
    pub fn poll_report(&mut self, now: Instant) -> Option<Statistics> {
        if now.saturating_duration_since(self.last_report) >= self.period {
            self.last_report = now;
            Some(self.stats)
        } else {
            None
        }
    }
}
