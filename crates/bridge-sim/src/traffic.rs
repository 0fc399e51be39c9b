//! Synthetic air traffic
//!
//! Produces a seeded stream of frames with a configurable mix of good
//! frames and each rejection kind, so the bridge's counters can be checked
//! against what was sent.

use bridge_protocol::radio::{MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE, SYNC_MARKER};
use bridge_protocol::{build_frame, FrameRejection};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::radio::SimFrame;

/// A traffic configuration that cannot be generated from
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrafficConfigError {
    #[error("{name} range {min}..={max} is empty or not finite")]
    BadRange {
        name: &'static str,
        min: f32,
        max: f32,
    },

    #[error("payload range {min}..={max} is empty")]
    BadPayloadRange { min: usize, max: usize },

    #[error("{name} rate {rate} is outside 0..=1")]
    BadRate { name: &'static str, rate: f64 },
}

/// Traffic mix and signal ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// RNG seed; the same seed yields the same stream
    pub seed: u64,
    /// Smallest payload generated
    pub payload_min: usize,
    /// Largest payload generated
    pub payload_max: usize,
    /// Weakest RSSI (dBm)
    pub rssi_min: f32,
    /// Strongest RSSI (dBm)
    pub rssi_max: f32,
    /// Lowest SNR (dB)
    pub snr_min: f32,
    /// Highest SNR (dB)
    pub snr_max: f32,
    /// Probability of a corrupted CRC
    pub bad_check_rate: f64,
    /// Probability of a missing sync marker
    pub no_sync_rate: f64,
    /// Probability of a frame below minimum length
    pub too_short_rate: f64,
    /// Probability of a failed read
    pub radio_error_rate: f64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            seed: 0x5241_5054,
            payload_min: 4,
            payload_max: MAX_PAYLOAD_SIZE,
            rssi_min: -120.0,
            rssi_max: -60.0,
            snr_min: -5.0,
            snr_max: 12.0,
            bad_check_rate: 0.05,
            no_sync_rate: 0.02,
            too_short_rate: 0.01,
            radio_error_rate: 0.01,
        }
    }
}

impl TrafficConfig {
    /// Check ranges and rates before generating from this config
    pub fn validate(&self) -> Result<(), TrafficConfigError> {
        for (name, min, max) in [
            ("rssi", self.rssi_min, self.rssi_max),
            ("snr", self.snr_min, self.snr_max),
        ] {
            if !(min.is_finite() && max.is_finite() && min <= max) {
                return Err(TrafficConfigError::BadRange { name, min, max });
            }
        }
        if self.payload_min > self.payload_max {
            return Err(TrafficConfigError::BadPayloadRange {
                min: self.payload_min,
                max: self.payload_max,
            });
        }
        for (name, rate) in [
            ("bad_check", self.bad_check_rate),
            ("no_sync", self.no_sync_rate),
            ("too_short", self.too_short_rate),
            ("radio_error", self.radio_error_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(TrafficConfigError::BadRate { name, rate });
            }
        }
        Ok(())
    }
}

/// What the generator meant a frame to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Should be accepted
    Valid,
    /// Should be refused for this reason
    Corrupt(FrameRejection),
}

/// Seeded frame generator
#[derive(Debug)]
pub struct TrafficGenerator {
    config: TrafficConfig,
    rng: StdRng,
    sequence: u32,
}

impl TrafficGenerator {
    /// Create a generator
    pub fn new(config: TrafficConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            sequence: 0,
        }
    }

    /// Produce the next frame and what it is supposed to be
    pub fn next_frame(&mut self) -> (SimFrame, FrameKind) {
        let kind = self.pick_kind();
        (self.frame_of_kind(kind), kind)
    }

    /// Produce a frame of a specific kind
    pub fn frame_of_kind(&mut self, kind: FrameKind) -> SimFrame {
        let rssi = draw(&mut self.rng, self.config.rssi_min, self.config.rssi_max);
        let snr = draw(&mut self.rng, self.config.snr_min, self.config.snr_max);

        let data = match kind {
            FrameKind::Valid => build_frame(&self.payload()),
            FrameKind::Corrupt(FrameRejection::RadioError) => {
                return SimFrame::failed(-1);
            }
            FrameKind::Corrupt(FrameRejection::TooShort) => {
                let len = self.rng.random_range(SYNC_MARKER.len()..MIN_FRAME_SIZE);
                let mut data = SYNC_MARKER.to_vec();
                data.resize(len, 0x00);
                data
            }
            FrameKind::Corrupt(FrameRejection::NoSync) => {
                let mut data = build_frame(&self.payload());
                data[0] ^= 0xFF;
                data
            }
            FrameKind::Corrupt(FrameRejection::BadCheck) => {
                let mut data = build_frame(&self.payload());
                let index = self.rng.random_range(SYNC_MARKER.len()..data.len());
                data[index] ^= 1 << self.rng.random_range(0..8);
                data
            }
        };
        SimFrame::new(data, rssi, snr)
    }

    fn pick_kind(&mut self) -> FrameKind {
        let roll: f64 = self.rng.random();
        let mut threshold = self.config.radio_error_rate;
        if roll < threshold {
            return FrameKind::Corrupt(FrameRejection::RadioError);
        }
        threshold += self.config.too_short_rate;
        if roll < threshold {
            return FrameKind::Corrupt(FrameRejection::TooShort);
        }
        threshold += self.config.no_sync_rate;
        if roll < threshold {
            return FrameKind::Corrupt(FrameRejection::NoSync);
        }
        threshold += self.config.bad_check_rate;
        if roll < threshold {
            return FrameKind::Corrupt(FrameRejection::BadCheck);
        }
        FrameKind::Valid
    }

    /// Payload starting with a big-endian sequence number
    fn payload(&mut self) -> Vec<u8> {
        let min = self.config.payload_min.clamp(4, MAX_PAYLOAD_SIZE);
        let max = self.config.payload_max.clamp(min, MAX_PAYLOAD_SIZE);
        let len = self.rng.random_range(min..=max);

        let mut payload = self.sequence.to_be_bytes().to_vec();
        self.sequence = self.sequence.wrapping_add(1);
        payload.resize(len, 0);
        self.rng.fill(&mut payload[4..]);
        payload
    }
}

/// Uniform value between two bounds given in either order
fn draw(rng: &mut StdRng, a: f32, b: f32) -> f32 {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    if low.is_finite() && high.is_finite() {
        rng.random_range(low..=high)
    } else {
        0.0
    }
}
