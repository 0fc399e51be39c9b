//! Startup configuration negotiation
//!
//! The bridge waits for a `CFG:` line on either input channel. The first
//! valid one wins; if none arrives before the timeout the built-in defaults
//! are applied. Either way the result is final for the process lifetime.

use std::time::{Duration, Instant};

use bridge_protocol::{parse_command, ConfigError, RfConfig, RfLimits};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Input channel a command arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    /// Wired serial input
    Wired,
    /// Wireless write characteristic
    Wireless,
}

/// Negotiation tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiatorConfig {
    /// How long to wait for a command before falling back (ms)
    pub timeout_ms: u64,
    /// Interval between `[WAIT_CFG]` prompts (ms)
    pub prompt_interval_ms: u64,
    /// Interval between countdown updates (ms)
    pub countdown_interval_ms: u64,
    /// Sleep between input polls while waiting (ms)
    pub poll_interval_ms: u64,
    /// Accepted ranges
    pub limits: RfLimits,
    /// Configuration applied on timeout
    pub defaults: RfConfig,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            prompt_interval_ms: 1000,
            countdown_interval_ms: 1000,
            poll_interval_ms: 10,
            limits: RfLimits::wide(),
            defaults: RfConfig::default(),
        }
    }
}

impl NegotiatorConfig {
    /// Negotiation timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sleep between input polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Negotiator state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NegotiatorState {
    /// No configuration yet
    Waiting,
    /// Configuration settled (terminal)
    Configured(RfConfig),
}

/// What the negotiator wants the bridge to do
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationEvent {
    /// Emit a `[WAIT_CFG]` prompt on the wired channel
    Prompt,
    /// Update the countdown display
    Countdown {
        /// Whole seconds until the timeout
        remaining_secs: u64,
    },
    /// A command was accepted
    Accepted {
        /// Applied configuration
        config: RfConfig,
        /// Channel that sent it (and receives the acknowledgment)
        source: Source,
    },
    /// A command was refused
    Rejected {
        /// Reason, sent back as `CFG_ERR`
        error: ConfigError,
        /// Channel that sent it
        source: Source,
    },
    /// No command arrived in time; defaults applied
    TimedOut {
        /// The defaults now in force
        config: RfConfig,
    },
}

/// Two-state negotiation machine: `Waiting -> Configured`
#[derive(Debug)]
pub struct ConfigNegotiator {
    config: NegotiatorConfig,
    state: NegotiatorState,
    started_at: Instant,
    last_prompt: Option<Instant>,
    last_countdown: Option<Instant>,
    event_buffer: Vec<NegotiationEvent>,
}

impl ConfigNegotiator {
    /// Start waiting at `now`
    pub fn new(config: NegotiatorConfig, now: Instant) -> Self {
        Self {
            config,
            state: NegotiatorState::Waiting,
            started_at: now,
            last_prompt: None,
            last_countdown: None,
            event_buffer: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> NegotiatorState {
        self.state
    }

    /// The settled configuration, once there is one
    pub fn configured(&self) -> Option<RfConfig> {
        match self.state {
            NegotiatorState::Configured(config) => Some(config),
            NegotiatorState::Waiting => None,
        }
    }

    /// Offer one input line
    ///
    /// Returns `Ok(None)` for lines that are not configuration commands.
    /// Range and parse failures leave the negotiator waiting. Commands after
    /// configuration are refused with [`ConfigError::AlreadyConfigured`].
    pub fn submit(&mut self, line: &str, source: Source) -> Result<Option<RfConfig>, ConfigError> {
        let result = self.try_submit(line);
        match &result {
            Ok(Some(config)) => {
                info!("Configuration accepted from {:?}: {}", source, config);
                self.state = NegotiatorState::Configured(*config);
                self.event_buffer.push(NegotiationEvent::Accepted {
                    config: *config,
                    source,
                });
            }
            Ok(None) => debug!("Ignoring non-command line from {:?}", source),
            Err(error) => {
                warn!("Configuration refused from {:?}: {}", source, error);
                self.event_buffer.push(NegotiationEvent::Rejected {
                    error: error.clone(),
                    source,
                });
            }
        }
        result
    }

    fn try_submit(&self, line: &str) -> Result<Option<RfConfig>, ConfigError> {
        let Some(raw) = parse_command(line)? else {
            return Ok(None);
        };
        if self.configured().is_some() {
            return Err(ConfigError::AlreadyConfigured);
        }
        self.config.limits.validate(&raw).map(Some)
    }

    /// Advance time: prompts, countdown and the timeout fallback
    pub fn tick(&mut self, now: Instant) {
        if self.configured().is_some() {
            return;
        }

        let elapsed = now.saturating_duration_since(self.started_at);
        if elapsed >= self.config.timeout() {
            let config = self.config.defaults;
            info!("No configuration received, using defaults: {}", config);
            self.state = NegotiatorState::Configured(config);
            self.event_buffer.push(NegotiationEvent::TimedOut { config });
            return;
        }

        if is_due(self.last_prompt, now, self.config.prompt_interval_ms) {
            self.last_prompt = Some(now);
            self.event_buffer.push(NegotiationEvent::Prompt);
        }

        if is_due(self.last_countdown, now, self.config.countdown_interval_ms) {
            self.last_countdown = Some(now);
            let remaining_secs = (self.config.timeout() - elapsed).as_secs();
            self.event_buffer.push(NegotiationEvent::Countdown { remaining_secs });
        }
    }

    /// Take the pending events
    pub fn drain_events(&mut self) -> Vec<NegotiationEvent> {
        std::mem::take(&mut self.event_buffer)
    }
}

fn is_due(last: Option<Instant>, now: Instant, interval_ms: u64) -> bool {
    last.map_or(true, |last| {
        now.saturating_duration_since(last) >= Duration::from_millis(interval_ms)
    })
}
