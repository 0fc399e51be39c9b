//! Status panel scheduling
//!
//! Forwarding always wins over the panel. A redraw pass is only allowed once
//! the radio has been quiet for the idle threshold and the previous pass is
//! old enough; within a pass each region redraws only when its content has
//! changed enough (and, for statistics and auxiliary indicators, not more
//! often than their own interval).

use std::time::{Duration, Instant};

use bridge_protocol::RfConfig;
use serde::{Deserialize, Serialize};

use crate::battery::BatteryStatus;
use crate::capabilities::Capabilities;
use crate::stats::Statistics;
use crate::wireless::WirelessSession;

/// Status panel collaborator
///
/// Pixel-level layout is the panel's business; the bridge only decides when
/// each region may be redrawn and with what values.
pub trait StatusPanel: Send {
    /// Waiting-for-configuration screen
    fn show_waiting(&mut self, defaults: &RfConfig);

    /// Countdown value on the waiting screen
    fn show_countdown(&mut self, remaining_secs: u64);

    /// Full static layout for the running bridge
    fn draw_layout(&mut self, config: &RfConfig, capabilities: Capabilities);

    /// Signal region
    fn draw_signal(&mut self, rssi: f32, snr: f32);

    /// Statistics region
    fn draw_stats(&mut self, stats: &Statistics);

    /// Battery and wireless indicators
    fn draw_aux(&mut self, battery: Option<&BatteryStatus>, session: Option<&WirelessSession>);

    /// Fatal error screen
    fn show_fatal(&mut self, message: &str);
}

/// Display timing tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayTiming {
    /// Radio quiet time required before any redraw (ms)
    pub idle_threshold_ms: u64,
    /// Minimum time between redraw passes (ms)
    pub min_interval_ms: u64,
    /// Minimum time between statistics redraws (ms)
    pub stats_interval_ms: u64,
    /// Minimum time between battery / wireless indicator redraws (ms)
    pub aux_interval_ms: u64,
    /// Smallest RSSI or SNR change worth a signal redraw
    pub signal_min_delta: f32,
    /// Smallest voltage change worth a battery redraw
    pub battery_min_delta: f32,
}

impl Default for DisplayTiming {
    fn default() -> Self {
        Self {
            idle_threshold_ms: 750,
            min_interval_ms: 500,
            stats_interval_ms: 1000,
            aux_interval_ms: 1000,
            signal_min_delta: 0.1,
            battery_min_delta: 0.05,
        }
    }
}

/// Values the panel could show right now
#[derive(Debug, Clone, Copy)]
pub struct DisplayView<'a> {
    /// Arrival time of the most recent frame (or loop start)
    pub last_frame_at: Instant,
    /// Signal of the most recent frame
    pub signal: Option<(f32, f32)>,
    /// Current counters
    pub stats: &'a Statistics,
    /// Latest battery reading
    pub battery: Option<&'a BatteryStatus>,
    /// Wireless session, when the capability is present
    pub session: Option<&'a WirelessSession>,
}

/// Regions to redraw in this pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedrawPlan {
    /// Static layout (implies every region)
    pub full: bool,
    /// Signal region
    pub signal: bool,
    /// Statistics region
    pub stats: bool,
    /// Battery / wireless indicators
    pub aux: bool,
}

impl RedrawPlan {
    /// Whether nothing needs drawing
    pub fn is_empty(&self) -> bool {
        !(self.full || self.signal || self.stats || self.aux)
    }
}

/// Decides when the panel may redraw and which regions
#[derive(Debug)]
pub struct DisplayScheduler {
    timing: DisplayTiming,
    needs_full: bool,
    last_pass: Option<Instant>,
    last_stats: Option<Instant>,
    last_aux: Option<Instant>,
    shown_signal: Option<(f32, f32)>,
    shown_stats: Option<Statistics>,
    shown_battery: Option<f32>,
    shown_connected: Option<bool>,
}

impl DisplayScheduler {
    /// Create a scheduler; nothing is drawn until a full redraw is requested
    pub fn new(timing: DisplayTiming) -> Self {
        Self {
            timing,
            needs_full: false,
            last_pass: None,
            last_stats: None,
            last_aux: None,
            shown_signal: None,
            shown_stats: None,
            shown_battery: None,
            shown_connected: None,
        }
    }

    /// Timing in use
    pub fn timing(&self) -> &DisplayTiming {
        &self.timing
    }

    /// Ask for the static layout on the next permitted pass
    pub fn request_full_redraw(&mut self) {
        self.needs_full = true;
    }

    /// Whether a full redraw is pending
    pub fn full_redraw_pending(&self) -> bool {
        self.needs_full
    }

    /// Decide what to redraw at `now`
    ///
    /// The returned regions are considered drawn; the caller must draw them.
    pub fn plan(&mut self, now: Instant, view: &DisplayView<'_>) -> RedrawPlan {
        let idle = now.saturating_duration_since(view.last_frame_at);
        if idle <= ms(self.timing.idle_threshold_ms) {
            return RedrawPlan::default();
        }
        if let Some(last) = self.last_pass {
            if now.saturating_duration_since(last) <= ms(self.timing.min_interval_ms) {
                return RedrawPlan::default();
            }
        }
        self.last_pass = Some(now);

        let full = std::mem::take(&mut self.needs_full);
        let mut plan = RedrawPlan {
            full,
            ..RedrawPlan::default()
        };

        if let Some(signal) = view.signal {
            if full || self.signal_changed(signal) {
                plan.signal = true;
                self.shown_signal = Some(signal);
            }
        }

        let stats_changed = self.shown_stats.as_ref() != Some(view.stats);
        if full || (stats_changed && interval_elapsed(self.last_stats, now, self.timing.stats_interval_ms)) {
            plan.stats = true;
            self.shown_stats = Some(*view.stats);
            self.last_stats = Some(now);
        }

        let aux_changed = self.battery_changed(view.battery)
            || self.shown_connected != view.session.map(WirelessSession::is_connected);
        let has_aux = view.battery.is_some() || view.session.is_some();
        if has_aux
            && (full || (aux_changed && interval_elapsed(self.last_aux, now, self.timing.aux_interval_ms)))
        {
            plan.aux = true;
            self.shown_battery = view.battery.map(|b| b.voltage);
            self.shown_connected = view.session.map(WirelessSession::is_connected);
            self.last_aux = Some(now);
        }

        plan
    }

    fn signal_changed(&self, (rssi, snr): (f32, f32)) -> bool {
        match self.shown_signal {
            None => true,
            Some((shown_rssi, shown_snr)) => {
                (rssi - shown_rssi).abs() >= self.timing.signal_min_delta
                    || (snr - shown_snr).abs() >= self.timing.signal_min_delta
            }
        }
    }

    fn battery_changed(&self, battery: Option<&BatteryStatus>) -> bool {
        match (self.shown_battery, battery) {
            (None, None) => false,
            (Some(shown), Some(now)) => (now.voltage - shown).abs() >= self.timing.battery_min_delta,
            _ => true,
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn interval_elapsed(last: Option<Instant>, now: Instant, interval_ms: u64) -> bool {
    last.map_or(true, |last| now.saturating_duration_since(last) >= ms(interval_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        start: Instant,
        stats: Statistics,
        session: WirelessSession,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                stats: Statistics::default(),
                session: WirelessSession::default(),
            }
        }

        fn at(&self, millis: u64) -> Instant {
            self.start + Duration::from_millis(millis)
        }

        fn view(&self, last_frame_ms: u64, signal: Option<(f32, f32)>) -> DisplayView<'_> {
            DisplayView {
                last_frame_at: self.at(last_frame_ms),
                signal,
                stats: &self.stats,
                battery: None,
                session: Some(&self.session),
            }
        }
    }

    #[test]
    fn nothing_draws_while_radio_is_busy() {
        let fx = Fixture::new();
        let mut scheduler = DisplayScheduler::new(DisplayTiming::default());
        scheduler.request_full_redraw();

        let plan = scheduler.plan(fx.at(700), &fx.view(0, Some((-80.0, 5.0))));
        assert!(plan.is_empty());
        assert!(scheduler.full_redraw_pending());
    }

    #[test]
    fn full_redraw_after_idle_threshold() {
        let fx = Fixture::new();
        let mut scheduler = DisplayScheduler::new(DisplayTiming::default());
        scheduler.request_full_redraw();

        let plan = scheduler.plan(fx.at(751), &fx.view(0, Some((-80.0, 5.0))));
        assert_eq!(
            plan,
            RedrawPlan {
                full: true,
                signal: true,
                stats: true,
                aux: true
            }
        );
        assert!(!scheduler.full_redraw_pending());
    }

    #[test]
    fn passes_are_rate_limited() {
        let fx = Fixture::new();
        let mut scheduler = DisplayScheduler::new(DisplayTiming::default());
        scheduler.request_full_redraw();
        assert!(!scheduler.plan(fx.at(1000), &fx.view(0, None)).is_empty());

        scheduler.request_full_redraw();
        assert!(scheduler.plan(fx.at(1400), &fx.view(0, None)).is_empty());
        assert!(scheduler.plan(fx.at(1501), &fx.view(0, None)).full);
    }

    #[test]
    fn signal_redraws_only_on_visible_change() {
        let fx = Fixture::new();
        let mut scheduler = DisplayScheduler::new(DisplayTiming::default());
        assert!(scheduler.plan(fx.at(1000), &fx.view(0, Some((-80.0, 5.0)))).signal);
        assert!(!scheduler.plan(fx.at(2000), &fx.view(0, Some((-80.05, 5.0)))).signal);
        assert!(scheduler.plan(fx.at(3000), &fx.view(0, Some((-80.0, 5.5)))).signal);
    }

    #[test]
    fn stats_redraw_needs_change_and_own_interval() {
        let mut fx = Fixture::new();
        let mut scheduler = DisplayScheduler::new(DisplayTiming::default());
        assert!(scheduler.plan(fx.at(1000), &fx.view(0, None)).stats);

        fx.stats.record(Ok(bridge_protocol::PacketClass::Small));
        assert!(!scheduler.plan(fx.at(1600), &fx.view(0, None)).stats);
        assert!(scheduler.plan(fx.at(2200), &fx.view(0, None)).stats);
        assert!(!scheduler.plan(fx.at(3300), &fx.view(0, None)).stats);
    }

    #[test]
    fn session_change_redraws_aux() {
        let mut fx = Fixture::new();
        let mut scheduler = DisplayScheduler::new(DisplayTiming::default());
        assert!(scheduler.plan(fx.at(1000), &fx.view(0, None)).aux);
        assert!(!scheduler.plan(fx.at(2000), &fx.view(0, None)).aux);

        fx.session.connect(185);
        assert!(scheduler.plan(fx.at(3000), &fx.view(0, None)).aux);
    }

    #[test]
    fn battery_ignores_small_drift() {
        let fx = Fixture::new();
        let mut scheduler = DisplayScheduler::new(DisplayTiming::default());
        let first = BatteryStatus::from_voltage(3.90);
        let drift = BatteryStatus::from_voltage(3.92);
        let drop = BatteryStatus::from_voltage(3.80);

        let mut view = fx.view(0, None);
        view.battery = Some(&first);
        assert!(scheduler.plan(fx.at(1000), &view).aux);
        view.battery = Some(&drift);
        assert!(!scheduler.plan(fx.at(2000), &view).aux);
        view.battery = Some(&drop);
        assert!(scheduler.plan(fx.at(3000), &view).aux);
    }
}
