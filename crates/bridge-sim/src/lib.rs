//! Bridge Simulation Library
//!
//! Hardware-free collaborators for running and testing the bridge:
//!
//! - **SimulatedRadio**: single-slot receiver fed from any thread through a `RadioFeeder`
//! - **SimJournal**: ordered log of reads, re-arms and writes across collaborators
//! - **TrafficGenerator**: seeded mix of good and damaged frames
//! - **MemoryWired**: in-memory wired channel with a host-side decoder
//! - **VirtualPeer**: wireless peer that writes commands and reassembles chunks
//! - **RecordingPanel**: status panel that records calls
//! - **SimulatedBattery**: settable, optionally draining battery
//! - **ManualClock**: time that only moves when told to
//!
//! # Example
//!
//! ```rust
//! use bridge_core::Radio;
//! use bridge_protocol::{RadioFrame, RfConfig};
//! use bridge_sim::{simulated_radio, FrameKind, TrafficConfig, TrafficGenerator};
//!
//! let (mut radio, feeder) = simulated_radio();
//! radio.configure(&RfConfig::default()).unwrap();
//! radio.start_receive().unwrap();
//!
//! let mut traffic = TrafficGenerator::new(TrafficConfig::default());
//! feeder.deliver(traffic.frame_of_kind(FrameKind::Valid));
//!
//! let mut frame = RadioFrame::empty();
//! assert!(radio.frame_available());
//! radio.read_frame(&mut frame);
//! ```

pub mod battery;
pub mod clock;
pub mod journal;
pub mod panel;
pub mod peer;
pub mod radio;
pub mod traffic;
pub mod wired;

pub use battery::SimulatedBattery;
pub use clock::ManualClock;
pub use journal::{SimJournal, SimStep};
pub use panel::{PanelCall, RecordingPanel};
pub use peer::{virtual_peer, PeerLink, VirtualPeer};
pub use radio::{simulated_radio, RadioFeeder, SimFrame, SimulatedRadio};
pub use traffic::{FrameKind, TrafficConfig, TrafficConfigError, TrafficGenerator};
pub use wired::{memory_wired, MemoryWired, WiredHost};
