//! Daemon settings

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bridge_core::BridgeConfig;
use bridge_protocol::RfLimits;
use bridge_sim::TrafficConfig;
use serde::{Deserialize, Serialize};

/// Where bridge output goes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WiredSettings {
    /// Serial port path; standard output when empty
    #[serde(default)]
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

fn default_baud() -> u32 {
    921_600
}

fn default_read_timeout() -> u64 {
    10
}

impl Default for WiredSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

/// Which parameter ranges the negotiator enforces
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LimitsPreset {
    /// Ranges of the wired-only modem
    #[default]
    Wide,
    /// Ranges of the display-equipped modem
    Narrow,
}

impl LimitsPreset {
    /// The limits this preset stands for
    pub fn limits(self) -> RfLimits {
        match self {
            LimitsPreset::Wide => RfLimits::wide(),
            LimitsPreset::Narrow => RfLimits::narrow(),
        }
    }
}

/// Simulated wireless peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerSettings {
    /// Connect a virtual peer at startup
    #[serde(default = "default_true")]
    pub connect: bool,
    /// MTU the peer negotiates
    #[serde(default = "default_mtu")]
    pub mtu: u16,
    /// Capacity of the bridge's inbound event queue
    #[serde(default = "default_queue")]
    pub queue_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_mtu() -> u16 {
    185
}

fn default_queue() -> usize {
    32
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            connect: true,
            mtu: default_mtu(),
            queue_capacity: default_queue(),
        }
    }
}

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Core bridge configuration
    #[serde(default = "default_bridge")]
    pub bridge: BridgeConfig,
    /// Parameter ranges; overrides `bridge.negotiator.limits`
    #[serde(default)]
    pub limits: LimitsPreset,
    /// Wired output
    #[serde(default)]
    pub wired: WiredSettings,
    /// Simulated radio traffic
    #[serde(default)]
    pub traffic: TrafficConfig,
    /// Time between simulated frames in milliseconds
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
    /// Simulated wireless peer
    #[serde(default)]
    pub peer: PeerSettings,
    /// Starting voltage of the simulated battery
    #[serde(default = "default_battery")]
    pub battery_voltage: f32,
}

fn default_bridge() -> BridgeConfig {
    // The host has no interrupt to wait on; poll instead of spinning
    BridgeConfig {
        idle_sleep_ms: 1,
        ..BridgeConfig::default()
    }
}

fn default_frame_interval() -> u64 {
    250
}

fn default_battery() -> f32 {
    4.1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bridge: default_bridge(),
            limits: LimitsPreset::default(),
            wired: WiredSettings::default(),
            traffic: TrafficConfig::default(),
            frame_interval_ms: default_frame_interval(),
            peer: PeerSettings::default(),
            battery_voltage: default_battery(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for raptor-bridge
    /// Uses $XDG_CONFIG_HOME/raptor-bridge when set, else the platform config dir
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("raptor-bridge"));
            }
        }
        dirs::config_dir().map(|p| p.join("raptor-bridge"))
    }

    /// Default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings
    ///
    /// An explicit path must exist and parse. Without one, the default path
    /// is tried and defaults are used when it is missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::read(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Parse settings JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)?;
        settings
            .traffic
            .validate()
            .context("Invalid traffic settings")?;
        Ok(settings)
    }

    /// Save settings to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }

    /// Bridge configuration with the limits preset applied
    pub fn bridge_config(&self) -> BridgeConfig {
        let mut config = self.bridge.clone();
        config.negotiator.limits = self.limits.limits();
        config
    }
}
