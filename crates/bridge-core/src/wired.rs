//! Wired output and command input

use bridge_protocol::{LineAccumulator, SerialFramer, StreamDecoder, ValidatedPacket};
use tracing::{debug, warn};

use crate::channel::WiredChannel;
use crate::error::TransportError;

const READ_CHUNK: usize = 256;

/// A wired channel plus its framer and line buffer
pub struct WiredPort {
    channel: Box<dyn WiredChannel>,
    framer: SerialFramer,
    lines: LineAccumulator,
    read_buf: Vec<u8>,
}

impl std::fmt::Debug for WiredPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WiredPort")
            .field("pending_line", &self.lines.pending_len())
            .finish()
    }
}

impl WiredPort {
    /// Wrap a channel
    pub fn new(channel: Box<dyn WiredChannel>) -> Self {
        Self {
            channel,
            framer: SerialFramer::new(),
            lines: LineAccumulator::new(),
            read_buf: vec![0; READ_CHUNK],
        }
    }

    /// Frame and write one packet as a single buffer
    pub fn send_packet(&mut self, packet: &ValidatedPacket<'_>) -> Result<(), TransportError> {
        let frame = self.framer.encode(packet);
        self.channel.write_all(frame)
    }

    /// Write status text; failures are logged and otherwise ignored
    pub fn write_text(&mut self, text: &str) {
        if let Err(e) = self.channel.write_all(text.as_bytes()) {
            warn!("Wired write failed: {}", e);
        }
    }

    /// Next complete input line, reading pending input if needed
    pub fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.lines.next_item() {
            return Some(line);
        }
        match self.channel.read_available(&mut self.read_buf) {
            Ok(0) => None,
            Ok(n) => {
                self.lines.push_bytes(&self.read_buf[..n]);
                self.lines.next_item()
            }
            Err(e) => {
                debug!("Wired read failed: {}", e);
                None
            }
        }
    }
}
