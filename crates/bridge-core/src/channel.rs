//! Collaborator interfaces
//!
//! The bridge owns no hardware. The radio peripheral, the wired port and the
//! wireless stack are reached through these traits; real drivers and the
//! simulated ones in `bridge-sim` both implement them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_protocol::{RadioFrame, ReadOutcome, RfConfig};

use crate::error::{RadioError, TransportError};

/// Radio receiver
pub trait Radio: Send {
    /// Apply the negotiated parameters; called once before receiving
    fn configure(&mut self, config: &RfConfig) -> Result<(), RadioError>;

    /// (Re-)enter receive mode
    fn start_receive(&mut self) -> Result<(), RadioError>;

    /// Poll and clear the "frame arrived" indication
    fn frame_available(&mut self) -> bool;

    /// Read the pending frame into `frame`, replacing its contents
    ///
    /// The frame's buffer is reused across reads.
    fn read_frame(&mut self, frame: &mut RadioFrame) -> ReadOutcome;
}

/// Wired byte stream (USB serial or similar)
pub trait WiredChannel: Send {
    /// Write the whole buffer and block until it is flushed
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Copy whatever input is pending into `buf` without blocking
    ///
    /// Returns the number of bytes copied; 0 when nothing is pending.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Notify side of the wireless service
pub trait WirelessLink: Send {
    /// Queue one notification to the connected peer (fire-and-forget)
    fn notify(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

/// Single-producer, single-consumer "frame arrived" flag
///
/// The interrupt side only ever calls [`FrameSignal::raise`]; the loop polls
/// with [`FrameSignal::take`], which clears it.
#[derive(Debug, Clone, Default)]
pub struct FrameSignal {
    flag: Arc<AtomicBool>,
}

impl FrameSignal {
    /// Create a cleared flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a frame as available
    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Read and clear the flag
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }

    /// Read without clearing
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
