//! Error types for frame validation, configuration parsing and re-framing

use thiserror::Error;

use crate::config::RfField;

/// Reasons a radio frame is refused by the validator
///
/// None of these are fatal: the bridge counts the rejection, drops the frame
/// and keeps listening.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameRejection {
    /// The radio reported a failed read, or the length is 0 / above the maximum
    #[error("radio read error")]
    RadioError,

    /// Shorter than sync marker plus trailer plus minimum body
    #[error("frame too short")]
    TooShort,

    /// First four bytes are not the sync marker
    #[error("sync marker missing")]
    NoSync,

    /// Trailing CRC32 does not match the frame contents
    #[error("CRC32 mismatch")]
    BadCheck,
}

/// Errors produced while handling a `CFG:` command line
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Malformed command (missing fields or non-numeric values)
    #[error("{0}")]
    Parse(String),

    /// A field parsed but lies outside its allowed range
    #[error(
        "{field} {shown} out of range ({min}-{max} {unit})",
        shown = field.format_value(*value),
        unit = field.unit()
    )]
    Range {
        /// Offending field
        field: RfField,
        /// Value as submitted
        value: f64,
        /// Lower bound (inclusive)
        min: f64,
        /// Upper bound (inclusive)
        max: f64,
    },

    /// A command arrived after the negotiator already settled
    #[error("configuration already applied")]
    AlreadyConfigured,
}

impl ConfigError {
    /// Whether this is a range violation for the given field
    pub fn is_range_error_for(&self, target: RfField) -> bool {
        matches!(self, ConfigError::Range { field, .. } if *field == target)
    }
}

/// Errors from the wireless chunker
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChunkError {
    /// The message needs more chunks than a one-byte total can express
    #[error("message of {len} bytes needs {needed} chunks (max {max}) at MTU {mtu}")]
    Oversize {
        /// Logical message length in bytes
        len: usize,
        /// Chunks that would be required
        needed: usize,
        /// Maximum representable chunk count
        max: usize,
        /// Negotiated MTU
        mtu: u16,
    },
}

/// Errors found while de-framing the wired stream (host side)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeframeError {
    /// Frame body shorter than header plus checksum
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    /// Length field disagrees with the body size
    #[error("length mismatch: header says {declared}, body holds {actual}")]
    LengthMismatch {
        /// Length from LEN_HI/LEN_LO
        declared: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// XOR checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes
        expected: u8,
        /// Checksum byte found in the frame
        actual: u8,
    },

    /// Escape byte followed by something other than 0x5E / 0x5D
    #[error("invalid escape sequence 0x7D 0x{0:02X}")]
    InvalidEscape(u8),
}

/// Errors from peer-side chunk reassembly
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    /// Notification does not start with a known tag
    #[error("unknown notification tag")]
    UnknownTag,

    /// Chunk header truncated
    #[error("truncated chunk header")]
    Truncated,

    /// Chunk arrived out of order or with an inconsistent total
    #[error("unexpected chunk {index}/{total}, expected index {expected}")]
    OutOfOrder {
        /// Index carried by the chunk
        index: u8,
        /// Total carried by the chunk
        total: u8,
        /// Index the assembler expected next
        expected: u8,
    },

    /// Reassembled message is not a valid `PKT` message
    #[error("malformed packet message")]
    Malformed,
}
