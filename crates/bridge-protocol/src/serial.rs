//! Byte-stuffed framing for the wired channel
//!
//! # Frame Format
//! ```text
//! 7E | LEN_HI LEN_LO | RSSI_INT RSSI_FRAC | SNR_INT SNR_FRAC | DATA... | CHECKSUM | 7E
//! ```
//!
//! - `LEN`: payload length, big-endian
//! - `*_INT`: signed integer part (truncated toward zero)
//! - `*_FRAC`: absolute fractional part in hundredths, 0-99
//! - `CHECKSUM`: XOR of the six header bytes and every payload byte
//!
//! Everything between the delimiters is HDLC-style stuffed:
//! `7E -> 7D 5E`, `7D -> 7D 5D`. The checksum is computed on the unstuffed
//! bytes and is itself stuffed on output.

use tracing::{debug, trace};

use crate::error::DeframeError;
use crate::radio::ValidatedPacket;
use crate::StreamDecoder;

/// Frame delimiter (start and end)
pub const FRAME_DELIMITER: u8 = 0x7E;
/// Escape byte introducing a stuffed pair
pub const ESCAPE_BYTE: u8 = 0x7D;
/// XOR mask applied to an escaped byte
pub const ESCAPE_MASK: u8 = 0x20;
/// Unstuffed header length (LEN, RSSI, SNR)
pub const HEADER_LEN: usize = 6;

/// Bounds the de-framer's buffer when no delimiter shows up
const MAX_BUFFERED: usize = 4096;

/// Split a signal reading into the two wire bytes
///
/// The integer byte saturates outside the `i8` range. The fractional byte is
/// clamped to 99 so float rounding can never produce a value of 100.
pub fn encode_signal(value: f32) -> (u8, u8) {
    let int = value as i8;
    let frac = ((value - int as f32).abs() * 100.0).clamp(0.0, 99.0) as u8;
    (int as u8, frac)
}

/// Rebuild a signal reading from its wire bytes
///
/// The fraction carries the sign of the integer part, so values between -1
/// and 0 lose their sign; the wire format cannot express it.
pub fn decode_signal(int: u8, frac: u8) -> f32 {
    let int = int as i8;
    let frac = frac as f32 / 100.0;
    if int < 0 {
        int as f32 - frac
    } else {
        int as f32 + frac
    }
}

/// XOR checksum used on the wired link
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Encodes accepted payloads into stuffed frames
///
/// The output buffer is owned by the framer and reused, so forwarding does
/// not allocate once it has grown to the largest frame seen.
#[derive(Debug, Default)]
pub struct SerialFramer {
    buffer: Vec<u8>,
}

impl SerialFramer {
    /// Create a framer
    pub fn new() -> Self {
        Self {
            // Worst case: every byte stuffed plus two delimiters
            buffer: Vec::with_capacity(2 * (HEADER_LEN + crate::radio::MAX_PAYLOAD_SIZE + 1) + 2),
        }
    }

    /// Encode one packet, returning the complete frame
    ///
    /// The returned slice is the whole frame, delimiters included, and is
    /// meant to be written in one call.
    pub fn encode(&mut self, packet: &ValidatedPacket<'_>) -> &[u8] {
        self.encode_parts(packet.payload, packet.rssi, packet.snr)
    }

    /// Encode a payload with explicit signal values
    pub fn encode_parts(&mut self, payload: &[u8], rssi: f32, snr: f32) -> &[u8] {
        let len = payload.len().min(u16::MAX as usize) as u16;
        let (rssi_int, rssi_frac) = encode_signal(rssi);
        let (snr_int, snr_frac) = encode_signal(snr);
        let [len_hi, len_lo] = len.to_be_bytes();
        let header = [len_hi, len_lo, rssi_int, rssi_frac, snr_int, snr_frac];

        let checksum = xor_checksum(&header) ^ xor_checksum(payload);

        self.buffer.clear();
        self.buffer.push(FRAME_DELIMITER);
        for &byte in header.iter().chain(payload).chain(std::iter::once(&checksum)) {
            push_stuffed(&mut self.buffer, byte);
        }
        self.buffer.push(FRAME_DELIMITER);

        trace!("Framed {} payload bytes into {} wire bytes", payload.len(), self.buffer.len());
        &self.buffer
    }
}

fn push_stuffed(out: &mut Vec<u8>, byte: u8) {
    match byte {
        FRAME_DELIMITER | ESCAPE_BYTE => {
            out.push(ESCAPE_BYTE);
            out.push(byte ^ ESCAPE_MASK);
        }
        _ => out.push(byte),
    }
}

/// Reverse byte stuffing on a frame body (delimiters already removed)
pub fn destuff(data: &[u8]) -> Result<Vec<u8>, DeframeError> {
    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.iter();
    while let Some(&byte) = bytes.next() {
        if byte == ESCAPE_BYTE {
            match bytes.next() {
                Some(&0x5E) => out.push(FRAME_DELIMITER),
                Some(&0x5D) => out.push(ESCAPE_BYTE),
                Some(&other) => return Err(DeframeError::InvalidEscape(other)),
                None => return Err(DeframeError::InvalidEscape(0)),
            }
        } else {
            out.push(byte);
        }
    }
    Ok(out)
}

/// A frame recovered from the wired stream
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Forwarded payload
    pub payload: Vec<u8>,
    /// Signal strength, to two decimals
    pub rssi: f32,
    /// Signal-to-noise ratio, to two decimals
    pub snr: f32,
}

/// Parse an unstuffed frame body
pub fn parse_body(body: &[u8]) -> Result<DecodedFrame, DeframeError> {
    if body.len() < HEADER_LEN + 1 {
        return Err(DeframeError::TooShort(body.len()));
    }

    let declared = u16::from_be_bytes([body[0], body[1]]) as usize;
    let actual = body.len() - HEADER_LEN - 1;
    if declared != actual {
        return Err(DeframeError::LengthMismatch { declared, actual });
    }

    let (content, checksum) = body.split_at(body.len() - 1);
    let expected = xor_checksum(content);
    if expected != checksum[0] {
        return Err(DeframeError::ChecksumMismatch {
            expected,
            actual: checksum[0],
        });
    }

    Ok(DecodedFrame {
        payload: content[HEADER_LEN..].to_vec(),
        rssi: decode_signal(body[2], body[3]),
        snr: decode_signal(body[4], body[5]),
    })
}

/// Streaming decoder for the wired channel (host side)
///
/// Text lines the bridge prints between frames (statistics, prompts) are
/// skipped: the decoder only looks at bytes between a delimiter pair.
/// Frames that fail to parse are counted and dropped.
#[derive(Debug, Default)]
pub struct SerialDeframer {
    buffer: Vec<u8>,
    rejected: u64,
}

impl SerialDeframer {
    /// Create a de-framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames dropped for framing or checksum errors
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Locate the next delimiter pair, returning the closing delimiter index
    ///
    /// Leading bytes before the first delimiter are discarded.
    fn next_span(&mut self) -> Option<usize> {
        let Some(start) = self.buffer.iter().position(|&b| b == FRAME_DELIMITER) else {
            self.buffer.clear();
            return None;
        };
        self.buffer.drain(..start);

        let end = self.buffer[1..]
            .iter()
            .position(|&b| b == FRAME_DELIMITER)
            .map(|offset| offset + 1);

        if end.is_none() && self.buffer.len() > MAX_BUFFERED {
            debug!("De-framer buffer overflow, dropping {} bytes", self.buffer.len());
            self.buffer.clear();
        }
        end
    }
}

impl StreamDecoder for SerialDeframer {
    type Item = DecodedFrame;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn next_item(&mut self) -> Option<DecodedFrame> {
        while let Some(end) = self.next_span() {
            if end == 1 {
                // Back-to-back delimiters: keep the second as the next opener
                self.buffer.drain(..1);
                continue;
            }

            match destuff(&self.buffer[1..end]).and_then(|body| parse_body(&body)) {
                Ok(frame) => {
                    self.buffer.drain(..=end);
                    return Some(frame);
                }
                Err(e) => {
                    // The closing delimiter may really be the opener of the
                    // next frame if we joined the stream mid-frame
                    debug!("Dropping wired frame: {}", e);
                    self.rejected += 1;
                    self.buffer.drain(..end);
                }
            }
        }
        None
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}
