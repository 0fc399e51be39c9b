//! Observable bridge activity
//!
//! When event recording is enabled the bridge buffers one event per notable
//! step. Tests and embedding hosts drain them; the bridge never reads them.

use bridge_protocol::{ChunkError, FrameRejection, PacketClass, RfConfig};

use crate::negotiator::Source;
use crate::stats::Statistics;

/// Something the bridge did
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// Configuration settled
    Configured {
        /// Configuration in force
        config: RfConfig,
        /// Channel that supplied it; `None` when defaults applied on timeout
        source: Option<Source>,
    },

    /// Radio configured and receiving
    Started,

    /// Radio bring-up failed; the bridge is in the halt loop
    Halted {
        /// Failure description
        reason: String,
    },

    // -------------------------------------------------------------------------
    // Frame path
    // -------------------------------------------------------------------------
    /// A frame passed validation and was handed to the framers
    FrameForwarded {
        /// Payload length
        len: usize,
        /// Accounting class
        class: PacketClass,
    },

    /// A frame was refused
    FrameRejected(FrameRejection),

    /// A packet could not be sent on the wireless link
    WirelessDropped(ChunkError),

    /// Periodic statistics were reported
    StatsReported(Statistics),

    // -------------------------------------------------------------------------
    // Wireless session
    // -------------------------------------------------------------------------
    /// A wireless peer connected
    WirelessConnected {
        /// MTU in force
        mtu: u16,
    },

    /// The wireless peer disconnected
    WirelessDisconnected,
}
