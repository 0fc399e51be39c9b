//! Notification encoding for the wireless channel
//!
//! # Message Format
//! ```text
//! "PKT" | rssi (f32 LE) | snr (f32 LE) | payload...
//! ```
//!
//! When that message fits in one notification (`mtu - 3` bytes) it is sent
//! as is. Otherwise the same bytes are cut into slices of `mtu - 8` bytes and
//! each slice travels in its own notification:
//!
//! ```text
//! "CHK" | index (u8) | total (u8) | slice...
//! ```
//!
//! Chunks go out strictly in order. There is no acknowledgment; a lost chunk
//! spoils the peer's reassembly of that one message.

use tracing::trace;

use crate::error::{ChunkError, ReassemblyError};
use crate::radio::ValidatedPacket;

/// Tag of an unfragmented packet message
pub const PACKET_TAG: &[u8; 3] = b"PKT";
/// Tag of a chunk notification
pub const CHUNK_TAG: &[u8; 3] = b"CHK";
/// Tag of a text response notification
pub const RESPONSE_TAG: &[u8; 4] = b"RSP:";
/// Per-notification link overhead (ATT opcode + handle)
pub const LINK_OVERHEAD: usize = 3;
/// Chunk header length (tag + index + total)
pub const CHUNK_HEADER_LEN: usize = CHUNK_TAG.len() + 2;
/// Packet message header length (tag + two f32)
pub const PACKET_HEADER_LEN: usize = PACKET_TAG.len() + 8;
/// Most chunks one message may be split into
///
/// The header carries `total` in one byte, so 255 is the ceiling: a 256-chunk
/// message would need a total of 256, which the format cannot express. Indices
/// run 0..=254.
pub const MAX_CHUNKS: usize = u8::MAX as usize;
/// MTU every link starts with before negotiation
pub const DEFAULT_MTU: u16 = 23;

/// Bytes one notification can carry at the given MTU
pub fn notification_capacity(mtu: u16) -> usize {
    (mtu.max(DEFAULT_MTU) as usize) - LINK_OVERHEAD
}

/// Slice length used for chunks at the given MTU
pub fn chunk_slice_len(mtu: u16) -> usize {
    notification_capacity(mtu) - CHUNK_HEADER_LEN
}

/// Largest payload that can be forwarded at the given MTU
pub fn max_payload_len(mtu: u16) -> usize {
    MAX_CHUNKS * chunk_slice_len(mtu) - PACKET_HEADER_LEN
}

/// One chunk of an oversized message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Zero-based position
    pub index: u8,
    /// Number of chunks in the message
    pub total: u8,
    /// Slice of the logical message
    pub data: &'a [u8],
}

impl Chunk<'_> {
    /// Write the notification bytes for this chunk into `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.clear();
        out.extend_from_slice(CHUNK_TAG);
        out.push(self.index);
        out.push(self.total);
        out.extend_from_slice(self.data);
    }
}

/// Iterator over the chunks of one message
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    slices: std::iter::Enumerate<std::slice::Chunks<'a, u8>>,
    total: u8,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        self.slices.next().map(|(index, data)| Chunk {
            index: index as u8,
            total: self.total,
            data,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.slices.size_hint()
    }
}

impl ExactSizeIterator for Chunks<'_> {}

impl Chunks<'_> {
    /// Number of chunks in the message
    pub fn total(&self) -> u8 {
        self.total
    }
}

/// How a packet goes out on the wireless link
#[derive(Debug, Clone)]
pub enum WirelessMessage<'a> {
    /// The whole message fits in one notification
    Single(&'a [u8]),
    /// The message must be split
    Chunked(Chunks<'a>),
}

/// Builds wireless notifications for accepted packets
///
/// The logical message is assembled in a scratch buffer owned by the chunker
/// and reused across calls; the returned views borrow from it.
#[derive(Debug)]
pub struct WirelessChunker {
    scratch: Vec<u8>,
}

impl Default for WirelessChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl WirelessChunker {
    /// Create a chunker with room for the largest radio payload
    pub fn new() -> Self {
        Self {
            scratch: Vec::with_capacity(PACKET_HEADER_LEN + crate::radio::MAX_PAYLOAD_SIZE),
        }
    }

    /// Encode a validated packet for the given MTU
    pub fn encode(
        &mut self,
        packet: &ValidatedPacket<'_>,
        mtu: u16,
    ) -> Result<WirelessMessage<'_>, ChunkError> {
        self.encode_parts(packet.payload, packet.rssi, packet.snr, mtu)
    }

    /// Encode a payload with explicit signal values
    pub fn encode_parts(
        &mut self,
        payload: &[u8],
        rssi: f32,
        snr: f32,
        mtu: u16,
    ) -> Result<WirelessMessage<'_>, ChunkError> {
        self.scratch.clear();
        self.scratch.extend_from_slice(PACKET_TAG);
        self.scratch.extend_from_slice(&rssi.to_le_bytes());
        self.scratch.extend_from_slice(&snr.to_le_bytes());
        self.scratch.extend_from_slice(payload);

        let capacity = notification_capacity(mtu);
        if self.scratch.len() <= capacity {
            return Ok(WirelessMessage::Single(&self.scratch));
        }

        let slice_len = chunk_slice_len(mtu);
        let needed = self.scratch.len().div_ceil(slice_len);
        if needed > MAX_CHUNKS {
            return Err(ChunkError::Oversize {
                len: self.scratch.len(),
                needed,
                max: MAX_CHUNKS,
                mtu,
            });
        }

        trace!(
            "Chunking {} byte message into {} chunks of {} bytes",
            self.scratch.len(),
            needed,
            slice_len
        );
        Ok(WirelessMessage::Chunked(Chunks {
            slices: self.scratch.chunks(slice_len).enumerate(),
            total: needed as u8,
        }))
    }
}

/// A packet message decoded by the peer
#[derive(Debug, Clone, PartialEq)]
pub struct PacketMessage {
    /// Signal strength reported by the bridge
    pub rssi: f32,
    /// Signal-to-noise ratio reported by the bridge
    pub snr: f32,
    /// Forwarded payload
    pub payload: Vec<u8>,
}

impl PacketMessage {
    /// Decode an unfragmented `PKT` message
    pub fn decode(message: &[u8]) -> Result<Self, ReassemblyError> {
        if message.len() < PACKET_HEADER_LEN || !message.starts_with(PACKET_TAG) {
            return Err(ReassemblyError::Malformed);
        }
        let rssi = f32::from_le_bytes([message[3], message[4], message[5], message[6]]);
        let snr = f32::from_le_bytes([message[7], message[8], message[9], message[10]]);
        Ok(Self {
            rssi,
            snr,
            payload: message[PACKET_HEADER_LEN..].to_vec(),
        })
    }
}

/// What the peer made of one notification
#[derive(Debug, Clone, PartialEq)]
pub enum PeerNotification {
    /// A complete packet (single or reassembled)
    Packet(PacketMessage),
    /// Text sent after the `RSP:` tag
    Text(String),
    /// A chunk was stored; more are needed
    Pending,
}

/// Peer-side reassembly of chunked messages
///
/// The bridge never reassembles; this is what a receiving peer does, and
/// what the virtual peer uses in simulation.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    buffer: Vec<u8>,
    expected: u8,
    total: u8,
}

impl ChunkAssembler {
    /// Create an assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partially reassembled message
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected = 0;
        self.total = 0;
    }

    /// Whether a partial message is held
    pub fn in_progress(&self) -> bool {
        self.expected > 0
    }

    /// Feed one notification
    pub fn push(&mut self, notification: &[u8]) -> Result<PeerNotification, ReassemblyError> {
        if let Some(text) = notification.strip_prefix(RESPONSE_TAG.as_slice()) {
            return Ok(PeerNotification::Text(String::from_utf8_lossy(text).into_owned()));
        }
        if notification.starts_with(PACKET_TAG) {
            return PacketMessage::decode(notification).map(PeerNotification::Packet);
        }
        if !notification.starts_with(CHUNK_TAG) {
            return Err(ReassemblyError::UnknownTag);
        }
        if notification.len() < CHUNK_HEADER_LEN {
            return Err(ReassemblyError::Truncated);
        }

        let index = notification[3];
        let total = notification[4];
        if index == 0 {
            // A fresh index 0 always starts over, abandoning a broken message
            self.reset();
            self.total = total;
        } else if index != self.expected || total != self.total {
            let expected = self.expected;
            self.reset();
            return Err(ReassemblyError::OutOfOrder {
                index,
                total,
                expected,
            });
        }

        self.buffer.extend_from_slice(&notification[CHUNK_HEADER_LEN..]);
        self.expected = index.wrapping_add(1);

        if self.expected == self.total {
            let message = PacketMessage::decode(&self.buffer);
            self.reset();
            return message.map(PeerNotification::Packet);
        }
        Ok(PeerNotification::Pending)
    }
}
