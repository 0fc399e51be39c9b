//! Hardware capability set
//!
//! One bridge core serves every board variant; what differs is which
//! transports and sensors are present.

use serde::{Deserialize, Serialize};

/// Which optional collaborators a board provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Byte-stuffed wired output (and wired command input)
    pub wired: bool,
    /// Wireless notify channel with a single peer
    pub wireless: bool,
    /// Battery voltage sensing
    pub battery: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::wired_only()
    }
}

impl Capabilities {
    /// Wired-only modem
    pub const fn wired_only() -> Self {
        Self {
            wired: true,
            wireless: false,
            battery: false,
        }
    }

    /// Battery-powered modem with both transports
    pub const fn full() -> Self {
        Self {
            wired: true,
            wireless: true,
            battery: true,
        }
    }

    /// Short label for logs and the status panel
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.wired {
            parts.push("wired");
        }
        if self.wireless {
            parts.push("wireless");
        }
        if self.battery {
            parts.push("battery");
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join("+")
        }
    }
}
