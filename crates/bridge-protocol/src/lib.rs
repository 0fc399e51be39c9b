//! Bridge Protocol Library
//!
//! Wire formats spoken by the radio packet bridge:
//!
//! - **Radio frames**: `RAPT` sync marker, payload, big-endian CRC-32 trailer
//! - **Wired frames**: HDLC-style byte-stuffed, `0x7E` delimited, XOR checksum
//! - **Wireless notifications**: `PKT` messages, split into `CHK` chunks when
//!   they exceed the negotiated MTU
//! - **Configuration**: the `CFG:` / `CFG_OK:` / `CFG_ERR:` text protocol
//!
//! Everything here is pure: no I/O, no clocks. The stateful bridge lives in
//! `bridge-core`.
//!
//! # Example
//!
//! ```rust
//! use bridge_protocol::{build_frame, FrameValidator, RadioFrame, ReadOutcome, SerialFramer};
//!
//! let frame = RadioFrame::new(build_frame(b"telemetry"), -92.5, 7.25);
//! let packet = FrameValidator::new().validate(&frame, ReadOutcome::Ok).unwrap();
//! assert_eq!(packet.payload, b"telemetry");
//!
//! let mut framer = SerialFramer::new();
//! let wire = framer.encode(&packet);
//! assert_eq!(wire[0], 0x7E);
//! ```

pub mod config;
pub mod error;
pub mod line;
pub mod radio;
pub mod serial;
pub mod wireless;

pub use config::{
    format_ack, format_error, parse_command, Bounds, RawConfig, RfConfig, RfField, RfLimits,
};
pub use error::{ChunkError, ConfigError, DeframeError, FrameRejection, ReassemblyError};
pub use line::LineAccumulator;
pub use radio::{
    build_frame, crc32, FrameValidator, PacketClass, RadioFrame, ReadOutcome, ValidatedPacket,
};
pub use serial::{DecodedFrame, SerialDeframer, SerialFramer};
pub use wireless::{
    Chunk, ChunkAssembler, Chunks, PacketMessage, PeerNotification, WirelessChunker,
    WirelessMessage,
};

/// Streaming decoders that turn arbitrary byte deliveries into items
///
/// Input may arrive split anywhere; implementations buffer partial data until
/// an item is complete.
pub trait StreamDecoder {
    /// The item type produced by this decoder
    type Item;

    /// Push raw bytes into the decoder's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete item from the buffer
    fn next_item(&mut self) -> Option<Self::Item>;

    /// Clear the internal buffer
    fn clear(&mut self);
}
