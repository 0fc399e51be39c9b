//! Radio frame validation
//!
//! Application frames on air look like:
//!
//! ```text
//! "RAPT" | body ... | CRC32 (big-endian, 4 bytes)
//! ```
//!
//! The CRC is the IEEE 802.3 CRC-32 over everything before the trailer,
//! including the sync marker. Validation strips both the marker and the
//! trailer; what remains is the payload forwarded downstream.

use tracing::trace;

use crate::error::FrameRejection;

/// Sync marker opening every application frame ("RAPT")
pub const SYNC_MARKER: [u8; 4] = *b"RAPT";
/// Length of the CRC32 trailer
pub const CRC_LEN: usize = 4;
/// Largest frame the radio can hand over
pub const MAX_FRAME_SIZE: usize = 255;
/// Smallest frame worth checking (marker + 4 body bytes + trailer)
pub const MIN_FRAME_SIZE: usize = 12;
/// Largest payload a valid frame can carry
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - SYNC_MARKER.len() - CRC_LEN;
/// Payloads shorter than this count as telemetry, longer as bulk
pub const SMALL_PAYLOAD_LIMIT: usize = 100;

/// Result of the underlying radio read, as reported by the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes were read successfully
    Ok,
    /// The peripheral reported an error code
    Failed(i16),
}

impl ReadOutcome {
    /// Whether the read succeeded
    pub fn is_ok(&self) -> bool {
        matches!(self, ReadOutcome::Ok)
    }
}

/// One datagram as received from the radio
#[derive(Debug, Clone, PartialEq)]
pub struct RadioFrame {
    /// Raw bytes, sync marker and trailer included
    pub data: Vec<u8>,
    /// Received signal strength in dBm
    pub rssi: f32,
    /// Signal-to-noise ratio in dB
    pub snr: f32,
}

impl RadioFrame {
    /// Create a frame
    pub fn new(data: Vec<u8>, rssi: f32, snr: f32) -> Self {
        Self { data, rssi, snr }
    }

    /// An empty frame, as handed back by a failed read
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0.0, 0.0)
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Accounting class of an accepted payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PacketClass {
    /// Under 100 bytes (telemetry)
    Small,
    /// 100 bytes or more (image / bulk data)
    Large,
}

impl PacketClass {
    /// Classify a payload length
    pub fn of_len(len: usize) -> Self {
        if len < SMALL_PAYLOAD_LIMIT {
            PacketClass::Small
        } else {
            PacketClass::Large
        }
    }
}

/// An accepted payload, borrowed from the frame it was cut from
///
/// The borrow ties the packet to the current loop iteration; it cannot be
/// queued past the frame that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedPacket<'a> {
    /// Payload with sync marker and trailer stripped
    pub payload: &'a [u8],
    /// Received signal strength in dBm
    pub rssi: f32,
    /// Signal-to-noise ratio in dB
    pub snr: f32,
}

impl ValidatedPacket<'_> {
    /// Accounting class of this payload
    pub fn class(&self) -> PacketClass {
        PacketClass::of_len(self.payload.len())
    }
}

/// Classifies raw frames as accepted payloads or rejections
#[derive(Debug, Clone, Default)]
pub struct FrameValidator;

impl FrameValidator {
    /// Create a validator
    pub fn new() -> Self {
        Self
    }

    /// Classify one frame
    ///
    /// Checks run in a fixed order: read outcome and length bounds, minimum
    /// size, sync marker, then CRC. The first failing check decides the
    /// rejection reason.
    pub fn validate<'a>(
        &self,
        frame: &'a RadioFrame,
        outcome: ReadOutcome,
    ) -> Result<ValidatedPacket<'a>, FrameRejection> {
        let len = frame.len();

        if !outcome.is_ok() || len == 0 || len > MAX_FRAME_SIZE {
            trace!("Radio read rejected: outcome={:?} len={}", outcome, len);
            return Err(FrameRejection::RadioError);
        }

        if len < MIN_FRAME_SIZE {
            return Err(FrameRejection::TooShort);
        }

        if frame.data[..SYNC_MARKER.len()] != SYNC_MARKER {
            return Err(FrameRejection::NoSync);
        }

        let (body, trailer) = frame.data.split_at(len - CRC_LEN);
        let received = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let calculated = crc32(body);
        if received != calculated {
            trace!(
                "CRC mismatch: received 0x{:08X}, calculated 0x{:08X}",
                received,
                calculated
            );
            return Err(FrameRejection::BadCheck);
        }

        Ok(ValidatedPacket {
            payload: &body[SYNC_MARKER.len()..],
            rssi: frame.rssi,
            snr: frame.snr,
        })
    }
}

/// IEEE 802.3 CRC-32 (reflected, poly 0xEDB88320, init and final XOR all-ones)
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Build an on-air frame around a payload: marker, payload, CRC trailer
pub fn build_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(SYNC_MARKER.len() + payload.len() + CRC_LEN);
    frame.extend_from_slice(&SYNC_MARKER);
    frame.extend_from_slice(payload);
    let crc = crc32(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(data: Vec<u8>) -> RadioFrame {
        RadioFrame::new(data, -87.5, 9.25)
    }

    #[test]
    fn crc_matches_reference_check_value() {
        // CRC-32/ISO-HDLC check value
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn accepts_sixteen_byte_frame() {
        let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let raw = build_frame(&payload);
        assert_eq!(raw.len(), 16);

        let frame = frame(raw);
        let packet = FrameValidator::new().validate(&frame, ReadOutcome::Ok).unwrap();
        assert_eq!(packet.payload, &payload);
        assert_eq!(packet.rssi, -87.5);
        assert_eq!(packet.snr, 9.25);
        assert_eq!(packet.class(), PacketClass::Small);
    }

    #[test]
    fn corrupted_trailer_is_bad_check() {
        let mut raw = build_frame(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let frame = frame(raw);
        let result = FrameValidator::new().validate(&frame, ReadOutcome::Ok);
        assert_eq!(result, Err(FrameRejection::BadCheck));
    }

    #[test]
    fn failed_read_is_radio_error_even_with_valid_bytes() {
        let raw = build_frame(&[0; 20]);
        let frame = frame(raw);
        let result = FrameValidator::new().validate(&frame, ReadOutcome::Failed(-7));
        assert_eq!(result, Err(FrameRejection::RadioError));
    }

    #[test]
    fn empty_and_oversize_are_radio_errors() {
        let validator = FrameValidator::new();
        let empty = frame(Vec::new());
        assert_eq!(
            validator.validate(&empty, ReadOutcome::Ok),
            Err(FrameRejection::RadioError)
        );
        let oversize = frame(vec![0x52; MAX_FRAME_SIZE + 1]);
        assert_eq!(
            validator.validate(&oversize, ReadOutcome::Ok),
            Err(FrameRejection::RadioError)
        );
    }

    #[test]
    fn short_frame_with_marker_is_too_short() {
        let frame = frame(b"RAPT1234".to_vec());
        let result = FrameValidator::new().validate(&frame, ReadOutcome::Ok);
        assert_eq!(result, Err(FrameRejection::TooShort));
    }

    #[test]
    fn wrong_marker_is_no_sync() {
        let mut raw = build_frame(&[9; 12]);
        raw[0] = b'X';
        let frame = frame(raw);
        let result = FrameValidator::new().validate(&frame, ReadOutcome::Ok);
        assert_eq!(result, Err(FrameRejection::NoSync));
    }

    #[test]
    fn minimum_frame_has_four_byte_payload() {
        let raw = build_frame(&[0xAA; 4]);
        assert_eq!(raw.len(), MIN_FRAME_SIZE);
        let frame = frame(raw);
        let packet = FrameValidator::new().validate(&frame, ReadOutcome::Ok).unwrap();
        assert_eq!(packet.payload.len(), 4);
    }

    #[test]
    fn payload_of_one_hundred_is_large() {
        let raw = build_frame(&[0; 100]);
        let frame = frame(raw);
        let packet = FrameValidator::new().validate(&frame, ReadOutcome::Ok).unwrap();
        assert_eq!(packet.class(), PacketClass::Large);
        assert_eq!(PacketClass::of_len(99), PacketClass::Small);
    }

    #[test]
    fn maximum_payload_fits_maximum_frame() {
        let raw = build_frame(&[0x7E; MAX_PAYLOAD_SIZE]);
        assert_eq!(raw.len(), MAX_FRAME_SIZE);
        let frame = frame(raw);
        assert!(FrameValidator::new().validate(&frame, ReadOutcome::Ok).is_ok());
    }

    proptest! {
        #[test]
        fn short_or_unsynced_frames_never_accept(
            data in prop::collection::vec(any::<u8>(), 0..MAX_FRAME_SIZE)
        ) {
            let unsynced = data.len() < SYNC_MARKER.len() || data[..4] != SYNC_MARKER;
            prop_assume!(data.len() < MIN_FRAME_SIZE || unsynced);
            let frame = frame(data);
            let result = FrameValidator::new().validate(&frame, ReadOutcome::Ok);
            prop_assert!(result.is_err());
        }

        #[test]
        fn single_bit_flip_is_rejected(
            payload in prop::collection::vec(any::<u8>(), 4..=MAX_PAYLOAD_SIZE),
            bit in any::<prop::sample::Index>(),
        ) {
            let mut raw = build_frame(&payload);
            // Flip a bit anywhere after the marker (payload or trailer)
            let span = (raw.len() - SYNC_MARKER.len()) * 8;
            let bit = SYNC_MARKER.len() * 8 + bit.index(span);
            raw[bit / 8] ^= 1 << (bit % 8);

            let frame = frame(raw);
            let result = FrameValidator::new().validate(&frame, ReadOutcome::Ok);
            prop_assert_eq!(result, Err(FrameRejection::BadCheck));
        }

        #[test]
        fn built_frames_always_accept(
            payload in prop::collection::vec(any::<u8>(), 4..=MAX_PAYLOAD_SIZE)
        ) {
            let frame = frame(build_frame(&payload));
            let packet = FrameValidator::new().validate(&frame, ReadOutcome::Ok).unwrap();
            prop_assert_eq!(packet.payload, payload.as_slice());
        }
    }
}
