//! Loop-owned bridge state

use std::time::{Duration, Instant};

use bridge_protocol::RfConfig;

use crate::stats::StatsTracker;

/// Where the bridge is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for a configuration
    Negotiating,
    /// Configured, radio not yet started
    Configured,
    /// Forwarding frames
    Running,
    /// Radio bring-up failed
    Halted,
}

/// Everything the control loop mutates, in one place
#[derive(Debug)]
pub struct BridgeState {
    /// Lifecycle phase
    pub phase: Phase,
    /// Radio parameters, set once
    pub rf_config: Option<RfConfig>,
    /// Frame counters and report timing
    pub stats: StatsTracker,
    /// Arrival of the most recent frame (loop start before the first one)
    pub last_frame_at: Instant,
    /// Signal of the most recent successful read
    pub last_signal: Option<(f32, f32)>,
}

impl BridgeState {
    /// Fresh state at `now`
    pub fn new(stats_period: Duration, now: Instant) -> Self {
        Self {
            phase: Phase::Negotiating,
            rf_config: None,
            stats: StatsTracker::new(stats_period, now),
            last_frame_at: now,
            last_signal: None,
        }
    }

    /// Freeze the configuration; later calls are ignored
    pub fn settle(&mut self, config: RfConfig) -> RfConfig {
        if let Some(existing) = self.rf_config {
            return existing;
        }
        self.rf_config = Some(config);
        self.phase = Phase::Configured;
        config
    }

    /// Enter the running phase at `now`
    pub fn begin_running(&mut self, now: Instant) {
        self.phase = Phase::Running;
        self.last_frame_at = now;
        self.stats.restart(now);
    }
}
