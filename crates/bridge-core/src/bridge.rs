//! The bridge control loop
//!
//! One thread, one loop. Each iteration:
//!
//! 1. If the radio signalled a frame: read it, re-arm the receiver, classify
//!    it, forward an accepted payload to every output, count the outcome.
//! 2. Emit the periodic statistics report when due.
//! 3. Drain inbound wired lines and wireless events.
//! 4. Let the display scheduler decide whether the panel may redraw.
//!
//! Before the loop starts the bridge negotiates its radio configuration; if
//! the radio then fails to come up, the bridge parks in a slow error-reporting
//! loop until it is reset or stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bridge_protocol::{
    format_ack, format_error, FrameRejection, FrameValidator, PacketClass, RadioFrame, RfConfig,
    ValidatedPacket,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::battery::{BatteryGauge, BatteryMonitor};
use crate::capabilities::Capabilities;
use crate::channel::{Radio, WiredChannel, WirelessLink};
use crate::clock::{Clock, SystemClock};
use crate::display::{DisplayScheduler, DisplayTiming, DisplayView, StatusPanel};
use crate::error::BridgeError;
use crate::events::BridgeEvent;
use crate::negotiator::{ConfigNegotiator, NegotiationEvent, NegotiatorConfig, Source};
use crate::state::{BridgeState, Phase};
use crate::stats::Statistics;
use crate::wired::WiredPort;
use crate::wireless::{WirelessEvent, WirelessEvents, WirelessPort, WirelessSession};

/// Outcome of one radio read
pub type FrameOutcome = Result<PacketClass, FrameRejection>;

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Optional hardware present on this board
    pub capabilities: Capabilities,
    /// Startup negotiation
    pub negotiator: NegotiatorConfig,
    /// Status panel timing
    pub display: DisplayTiming,
    /// Statistics report period (ms)
    pub stats_period_ms: u64,
    /// Delay between wireless chunks (ms)
    pub chunk_delay_ms: u64,
    /// Minimum time between battery samples (ms)
    pub battery_interval_ms: u64,
    /// Interval between error reports while halted (ms)
    pub halt_report_interval_ms: u64,
    /// Sleep after an iteration with no frame (ms); 0 spins
    pub idle_sleep_ms: u64,
    /// Buffer [`BridgeEvent`]s for [`Bridge::drain_events`]
    pub record_events: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::default(),
            negotiator: NegotiatorConfig::default(),
            display: DisplayTiming::default(),
            stats_period_ms: 10_000,
            chunk_delay_ms: 10,
            battery_interval_ms: 1000,
            halt_report_interval_ms: 5000,
            idle_sleep_ms: 0,
            record_events: false,
        }
    }
}

/// Assembles a [`Bridge`] from its collaborators
pub struct BridgeBuilder {
    config: BridgeConfig,
    radio: Box<dyn Radio>,
    clock: Box<dyn Clock>,
    wired: Option<Box<dyn WiredChannel>>,
    wireless: Option<(Box<dyn WirelessLink>, WirelessEvents)>,
    panel: Option<Box<dyn StatusPanel>>,
    battery: Option<Box<dyn BatteryMonitor>>,
}

impl BridgeBuilder {
    /// Start with a radio, default configuration and the system clock
    pub fn new(radio: impl Radio + 'static) -> Self {
        Self {
            config: BridgeConfig::default(),
            radio: Box::new(radio),
            clock: Box::new(SystemClock),
            wired: None,
            wireless: None,
            panel: None,
            battery: None,
        }
    }

    /// Use the given configuration
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use the given time source
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Attach the wired channel
    pub fn wired(mut self, channel: impl WiredChannel + 'static) -> Self {
        self.wired = Some(Box::new(channel));
        self
    }

    /// Attach the wireless notify link and its inbound event queue
    pub fn wireless(mut self, link: impl WirelessLink + 'static, events: WirelessEvents) -> Self {
        self.wireless = Some((Box::new(link), events));
        self
    }

    /// Attach a status panel
    pub fn panel(mut self, panel: impl StatusPanel + 'static) -> Self {
        self.panel = Some(Box::new(panel));
        self
    }

    /// Attach a battery monitor
    pub fn battery(mut self, monitor: impl BatteryMonitor + 'static) -> Self {
        self.battery = Some(Box::new(monitor));
        self
    }

    /// Check capabilities against the attached collaborators and build
    ///
    /// Collaborators for capabilities that are switched off are dropped.
    pub fn build(self) -> Result<Bridge, BridgeError> {
        let caps = self.config.capabilities;
        let wired = take_for(caps.wired, "wired", self.wired)?;
        let wireless = take_for(caps.wireless, "wireless", self.wireless)?;
        let battery = take_for(caps.battery, "battery", self.battery)?;

        let now = self.clock.now();
        let chunk_delay = Duration::from_millis(self.config.chunk_delay_ms);
        let battery_interval = Duration::from_millis(self.config.battery_interval_ms);

        info!("Building bridge with capabilities: {}", caps.describe());

        Ok(Bridge {
            negotiator: ConfigNegotiator::new(self.config.negotiator.clone(), now),
            display: DisplayScheduler::new(self.config.display.clone()),
            state: BridgeState::new(Duration::from_millis(self.config.stats_period_ms), now),
            radio: self.radio,
            clock: self.clock,
            wired: wired.map(WiredPort::new),
            wireless: wireless.map(|(link, events)| WirelessPort::new(link, events, chunk_delay)),
            panel: self.panel,
            battery: battery.map(|monitor| BatteryGauge::new(monitor, battery_interval)),
            validator: FrameValidator::new(),
            frame: RadioFrame::empty(),
            event_buffer: Vec::new(),
            config: self.config,
        })
    }
}

fn take_for<T>(enabled: bool, name: &'static str, item: Option<T>) -> Result<Option<T>, BridgeError> {
    match (enabled, item) {
        (true, None) => Err(BridgeError::MissingCollaborator(name)),
        (true, item) => Ok(item),
        (false, Some(_)) => {
            debug!("Capability '{}' disabled, ignoring its collaborator", name);
            Ok(None)
        }
        (false, None) => Ok(None),
    }
}

/// The radio packet bridge
pub struct Bridge {
    config: BridgeConfig,
    radio: Box<dyn Radio>,
    clock: Box<dyn Clock>,
    wired: Option<WiredPort>,
    wireless: Option<WirelessPort>,
    panel: Option<Box<dyn StatusPanel>>,
    battery: Option<BatteryGauge>,
    negotiator: ConfigNegotiator,
    display: DisplayScheduler,
    validator: FrameValidator,
    frame: RadioFrame,
    state: BridgeState,
    event_buffer: Vec<BridgeEvent>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("wired", &self.wired)
            .field("wireless", &self.wireless)
            .finish()
    }
}

impl Bridge {
    /// Start building a bridge around a radio
    pub fn builder(radio: impl Radio + 'static) -> BridgeBuilder {
        BridgeBuilder::new(radio)
    }

    /// Current configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Lifecycle phase
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Radio parameters, once negotiated
    pub fn rf_config(&self) -> Option<RfConfig> {
        self.state.rf_config
    }

    /// Frame counters
    pub fn stats(&self) -> &Statistics {
        self.state.stats.stats()
    }

    /// Wireless session, when the capability is present
    pub fn session(&self) -> Option<&WirelessSession> {
        self.wireless.as_ref().map(WirelessPort::session)
    }

    /// Take the buffered events
    pub fn drain_events(&mut self) -> Vec<BridgeEvent> {
        std::mem::take(&mut self.event_buffer)
    }

    fn record(&mut self, event: BridgeEvent) {
        if self.config.record_events {
            self.event_buffer.push(event);
        }
    }

    // =========================================================================
    // Negotiation
    // =========================================================================

    /// Wait for a configuration on either input channel
    ///
    /// Returns when a valid `CFG:` command was accepted or the timeout applied
    /// the defaults. Returns immediately if already configured.
    pub fn negotiate(&mut self, stop: &AtomicBool) -> Result<RfConfig, BridgeError> {
        if let Some(config) = self.state.rf_config {
            return Ok(config);
        }

        let poll_interval = self.config.negotiator.poll_interval();
        self.negotiator = ConfigNegotiator::new(self.config.negotiator.clone(), self.clock.now());
        self.announce_waiting();

        loop {
            if stop.load(Ordering::Relaxed) {
                return Err(BridgeError::Stopped);
            }

            self.negotiator.tick(self.clock.now());
            self.apply_negotiation_events();

            while self.state.rf_config.is_none() {
                let Some(line) = self.wired.as_mut().and_then(WiredPort::next_line) else {
                    break;
                };
                self.submit_line(&line, Source::Wired);
            }

            while self.state.rf_config.is_none() {
                let Some(event) = self.next_wireless_event() else {
                    break;
                };
                if let WirelessEvent::Line(line) = event {
                    self.submit_line(&line, Source::Wireless);
                }
            }

            if let Some(config) = self.state.rf_config {
                return Ok(config);
            }

            self.clock.sleep(poll_interval);
        }
    }

    fn announce_waiting(&mut self) {
        let defaults = self.config.negotiator.defaults;
        let timeout_secs = self.config.negotiator.timeout().as_secs();
        info!("Waiting up to {}s for configuration", timeout_secs);

        if let Some(wired) = self.wired.as_mut() {
            wired.write_text(&format!(
                "\n========================================\n\
                 RaptorHab Ground Station Bridge\n\
                 ========================================\n\
                 \n[WAIT_CFG] Waiting for configuration...\n\
                 [WAIT_CFG] Send: CFG:<freq>,<bitrate>,<deviation>,<bandwidth>,<preamble>\n\
                 [WAIT_CFG] Example: CFG:{}\n\
                 [WAIT_CFG] Or wait {} seconds for defaults...\n",
                defaults.values_text(),
                timeout_secs
            ));
        }
        if let Some(panel) = self.panel.as_mut() {
            panel.show_waiting(&defaults);
        }
    }

    fn submit_line(&mut self, line: &str, source: Source) {
        // Outcomes reach the peer through the negotiation events
        let _ = self.negotiator.submit(line, source);
        self.apply_negotiation_events();
    }

    fn apply_negotiation_events(&mut self) {
        for event in self.negotiator.drain_events() {
            match event {
                NegotiationEvent::Prompt => {
                    if let Some(wired) = self.wired.as_mut() {
                        wired.write_text("[WAIT_CFG]\n");
                    }
                }
                NegotiationEvent::Countdown { remaining_secs } => {
                    if let Some(panel) = self.panel.as_mut() {
                        panel.show_countdown(remaining_secs);
                    }
                }
                NegotiationEvent::Accepted { config, source } => {
                    let config = self.state.settle(config);
                    self.respond(source, &format_ack(&config));
                    self.record(BridgeEvent::Configured {
                        config,
                        source: Some(source),
                    });
                }
                NegotiationEvent::Rejected { error, source } => {
                    self.respond(source, &format_error(&error));
                }
                NegotiationEvent::TimedOut { config } => {
                    let config = self.state.settle(config);
                    let notice = "[WAIT_CFG] Timeout - using default configuration\n";
                    let ack = format_ack(&config);
                    if let Some(wired) = self.wired.as_mut() {
                        wired.write_text(notice);
                        wired.write_text(&ack);
                    }
                    if let Some(wireless) = self.wireless.as_mut() {
                        wireless.send_text(notice);
                        wireless.send_text(&ack);
                    }
                    self.record(BridgeEvent::Configured {
                        config,
                        source: None,
                    });
                }
            }
        }
    }

    fn respond(&mut self, source: Source, text: &str) {
        match source {
            Source::Wired => {
                if let Some(wired) = self.wired.as_mut() {
                    wired.write_text(text);
                }
            }
            Source::Wireless => {
                if let Some(wireless) = self.wireless.as_mut() {
                    wireless.send_text(text);
                }
            }
        }
    }

    // =========================================================================
    // Startup and halt
    // =========================================================================

    /// Configure the radio and enter the running phase
    pub fn start(&mut self) -> Result<(), BridgeError> {
        let config = self.state.rf_config.ok_or(BridgeError::NotConfigured)?;
        if self.state.phase == Phase::Running {
            return Ok(());
        }

        info!("Initializing radio: {}", config);
        self.radio.configure(&config)?;
        self.radio.start_receive()?;

        let now = self.clock.now();
        self.state.begin_running(now);
        self.display.request_full_redraw();

        if let Some(wired) = self.wired.as_mut() {
            wired.write_text(&format!(
                "\n[CONFIG] Freq:{:.1} BR:{:.0} Dev:{:.0} BW:{:.0} Preamble:{}\n\
                 [READY] Listening for packets...\n\
                 [STATS] Starting - will report every {} seconds\n",
                config.frequency_mhz,
                config.bitrate_kbps,
                config.deviation_khz,
                config.bandwidth_khz,
                config.preamble_bits,
                self.config.stats_period_ms / 1000
            ));
        }
        info!("Bridge running");
        self.record(BridgeEvent::Started);
        Ok(())
    }

    /// Report a fatal error until stopped
    ///
    /// Reports once immediately, then every halt interval. On hardware
    /// nothing ever sets `stop` and only a reset gets out of here.
    pub fn halt(&mut self, reason: &BridgeError, stop: &AtomicBool) {
        error!("Halting: {}", reason);
        self.state.phase = Phase::Halted;
        self.record(BridgeEvent::Halted {
            reason: reason.to_string(),
        });

        if let Some(panel) = self.panel.as_mut() {
            panel.show_fatal("RADIO INIT FAILED! Please reset device");
        }
        if let Some(wired) = self.wired.as_mut() {
            wired.write_text("[ERROR] Radio initialization failed!\n");
        }

        let interval = Duration::from_millis(self.config.halt_report_interval_ms);
        loop {
            if let Some(wired) = self.wired.as_mut() {
                wired.write_text("[ERROR] Radio init failed - please reset\n");
            }
            if stop.load(Ordering::Relaxed) {
                break;
            }
            self.clock.sleep(interval);
        }
    }

    /// Negotiate, start and run until stopped
    ///
    /// A radio bring-up failure goes through [`Bridge::halt`] before the
    /// error is returned.
    pub fn serve(&mut self, stop: &AtomicBool) -> Result<(), BridgeError> {
        self.negotiate(stop)?;
        if let Err(e) = self.start() {
            if e.is_fatal() {
                self.halt(&e, stop);
            }
            return Err(e);
        }
        self.run(stop)
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Run iterations until `stop` is set
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), BridgeError> {
        let idle_sleep = Duration::from_millis(self.config.idle_sleep_ms);
        while !stop.load(Ordering::Relaxed) {
            if self.poll_once()?.is_none() && !idle_sleep.is_zero() {
                self.clock.sleep(idle_sleep);
            }
        }
        info!("Bridge stopped");
        Ok(())
    }

    /// One loop iteration
    ///
    /// Returns the outcome of the frame handled in this iteration, if any.
    pub fn poll_once(&mut self) -> Result<Option<FrameOutcome>, BridgeError> {
        if self.state.phase != Phase::Running {
            return Err(BridgeError::NotConfigured);
        }

        let outcome = if self.radio.frame_available() {
            Some(self.handle_frame())
        } else {
            None
        };

        let now = self.clock.now();
        self.report_stats(now);
        self.service_inputs();
        self.refresh_display(now);

        Ok(outcome)
    }

    fn handle_frame(&mut self) -> FrameOutcome {
        let mut frame = std::mem::replace(&mut self.frame, RadioFrame::empty());
        let read = self.radio.read_frame(&mut frame);
        // Re-arm before anything else so the next frame is not missed
        if let Err(e) = self.radio.start_receive() {
            warn!("Failed to re-arm receiver: {}", e);
        }

        self.state.last_frame_at = self.clock.now();
        if read.is_ok() && !frame.is_empty() {
            self.state.last_signal = Some((frame.rssi, frame.snr));
        }

        let outcome = match self.validator.validate(&frame, read) {
            Ok(packet) => {
                let class = packet.class();
                trace!(
                    "Frame accepted: {} bytes, RSSI {:.1}, SNR {:.1}",
                    packet.payload.len(),
                    packet.rssi,
                    packet.snr
                );
                self.forward(&packet);
                self.record(BridgeEvent::FrameForwarded {
                    len: packet.payload.len(),
                    class,
                });
                Ok(class)
            }
            Err(reason) => {
                debug!("Frame rejected ({} bytes): {}", frame.len(), reason);
                self.record(BridgeEvent::FrameRejected(reason));
                Err(reason)
            }
        };
        self.state.stats.record(outcome);

        self.frame = frame;
        outcome
    }

    fn forward(&mut self, packet: &ValidatedPacket<'_>) {
        if let Some(wired) = self.wired.as_mut() {
            if let Err(e) = wired.send_packet(packet) {
                warn!("Wired forward failed: {}", e);
            }
        }

        let dropped = match self.wireless.as_mut() {
            Some(wireless) => wireless.send_packet(packet, &*self.clock).err(),
            None => None,
        };
        if let Some(e) = dropped {
            warn!("Dropping packet on wireless: {}", e);
            self.record(BridgeEvent::WirelessDropped(e));
        }
    }

    fn report_stats(&mut self, now: std::time::Instant) {
        let Some(snapshot) = self.state.stats.poll_report(now) else {
            return;
        };

        let battery = self.battery.as_mut().and_then(|g| g.sample(now).copied());
        let session = self.wireless.as_ref().map(|w| *w.session());
        let line = snapshot.report(session.as_ref(), battery.as_ref());
        debug!("{}", line);

        if let Some(wired) = self.wired.as_mut() {
            wired.write_text(&format!("\n{}\n", line));
        }
        if let Some(wireless) = self.wireless.as_mut() {
            wireless.send_text(&format!("{}\n", line));
        }
        self.record(BridgeEvent::StatsReported(snapshot));
    }

    fn service_inputs(&mut self) {
        while let Some(line) = self.wired.as_mut().and_then(WiredPort::next_line) {
            self.submit_line(&line, Source::Wired);
        }
        while let Some(event) = self.next_wireless_event() {
            if let WirelessEvent::Line(line) = event {
                self.submit_line(&line, Source::Wireless);
            }
        }
    }

    fn next_wireless_event(&mut self) -> Option<WirelessEvent> {
        let event = self.wireless.as_mut()?.poll_event()?;
        match &event {
            WirelessEvent::Connected { .. } => {
                let mtu = self.session().map_or(0, WirelessSession::mtu);
                self.display.request_full_redraw();
                self.record(BridgeEvent::WirelessConnected { mtu });
            }
            WirelessEvent::Disconnected => {
                self.display.request_full_redraw();
                self.record(BridgeEvent::WirelessDisconnected);
            }
            WirelessEvent::MtuChanged(_) | WirelessEvent::Line(_) => {}
        }
        Some(event)
    }

    fn refresh_display(&mut self, now: std::time::Instant) {
        let Some(panel) = self.panel.as_mut() else {
            return;
        };

        // Sampling the battery is slow; only do it when the radio is quiet
        let idle_threshold = Duration::from_millis(self.display.timing().idle_threshold_ms);
        let idle = now.saturating_duration_since(self.state.last_frame_at) > idle_threshold;
        let battery = match self.battery.as_mut() {
            Some(gauge) if idle => gauge.sample(now).copied(),
            Some(gauge) => gauge.status().copied(),
            None => None,
        };
        let session = self.wireless.as_ref().map(|w| *w.session());
        let stats = *self.state.stats.stats();

        let view = DisplayView {
            last_frame_at: self.state.last_frame_at,
            signal: self.state.last_signal,
            stats: &stats,
            battery: battery.as_ref(),
            session: session.as_ref(),
        };
        let plan = self.display.plan(now, &view);
        if plan.is_empty() {
            return;
        }

        trace!("Display pass: {:?}", plan);
        if plan.full {
            if let Some(config) = self.state.rf_config {
                panel.draw_layout(&config, self.config.capabilities);
            }
        }
        if plan.signal {
            if let Some((rssi, snr)) = self.state.last_signal {
                panel.draw_signal(rssi, snr);
            }
        }
        if plan.stats {
            panel.draw_stats(&stats);
        }
        if plan.aux {
            panel.draw_aux(battery.as_ref(), session.as_ref());
        }
    }
}
