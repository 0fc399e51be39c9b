//! Bridge Core
//!
//! The stateful half of the radio packet bridge: startup configuration
//! negotiation, the frame-forwarding control loop, statistics, display
//! scheduling and the wireless session.
//!
//! # Architecture
//!
//! Hardware is reached through collaborator traits ([`Radio`],
//! [`WiredChannel`], [`WirelessLink`], [`StatusPanel`], [`BatteryMonitor`])
//! and time through a [`Clock`]. The [`Bridge`] owns all of them plus one
//! [`BridgeState`] and runs a single-threaded loop in which forwarding always
//! comes first:
//!
//! - The radio's "frame arrived" indication is a lock-free [`FrameSignal`]
//! - Wireless input crosses from the stack's callback thread as complete
//!   lines over a bounded queue ([`wireless_inbox`])
//! - The panel only redraws once the radio has been quiet for a while
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::atomic::AtomicBool;
//! use bridge_core::{Bridge, BridgeConfig};
//!
//! let mut bridge = Bridge::builder(radio)
//!     .config(BridgeConfig::default())
//!     .wired(port)
//!     .build()?;
//!
//! let stop = AtomicBool::new(false);
//! bridge.serve(&stop)?;
//! ```

pub mod battery;
pub mod bridge;
pub mod capabilities;
pub mod channel;
pub mod clock;
pub mod display;
pub mod error;
pub mod events;
pub mod negotiator;
pub mod state;
pub mod stats;
pub mod wired;
pub mod wireless;

pub use battery::{BatteryGauge, BatteryLevel, BatteryMonitor, BatteryStatus};
pub use bridge::{Bridge, BridgeBuilder, BridgeConfig, FrameOutcome};
pub use capabilities::Capabilities;
pub use channel::{FrameSignal, Radio, WiredChannel, WirelessLink};
pub use clock::{Clock, SystemClock};
pub use display::{DisplayScheduler, DisplayTiming, DisplayView, RedrawPlan, StatusPanel};
pub use error::{BridgeError, RadioError, TransportError};
pub use events::BridgeEvent;
pub use negotiator::{
    ConfigNegotiator, NegotiationEvent, NegotiatorConfig, NegotiatorState, Source,
};
pub use state::{BridgeState, Phase};
pub use stats::{Statistics, StatsTracker};
pub use wireless::{wireless_inbox, WirelessEvent, WirelessEvents, WirelessInbox, WirelessPort, WirelessSession};
