//! Radio parameter text protocol
//!
//! Either input channel may send a configuration request while the bridge
//! waits at startup:
//!
//! ```text
//! CFG:<freq>,<bitrate>,<deviation>,<bandwidth>,<preamble>\n
//! CFG:915.0,96.0,50.0,467.0,32\n
//! ```
//!
//! Answers are `CFG_OK:<values>\n` echoing what was applied, or
//! `CFG_ERR:<message>\n`.

use std::fmt;
use std::ops::RangeInclusive;

use crate::error::ConfigError;

/// Prefix of a configuration request
pub const CONFIG_PREFIX: &str = "CFG:";
/// Prefix of a successful configuration answer
pub const CONFIG_OK_PREFIX: &str = "CFG_OK:";
/// Prefix of a failed configuration answer
pub const CONFIG_ERR_PREFIX: &str = "CFG_ERR:";

/// Number of comma-separated fields in a request
pub const CONFIG_FIELD_COUNT: usize = 5;

/// Radio parameters applied for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RfConfig {
    /// Carrier frequency in MHz
    pub frequency_mhz: f32,
    /// Bit rate in kbps
    pub bitrate_kbps: f32,
    /// Frequency deviation in kHz
    pub deviation_khz: f32,
    /// Receive bandwidth in kHz
    pub bandwidth_khz: f32,
    /// Preamble length in bits
    pub preamble_bits: u16,
}

impl Default for RfConfig {
    fn default() -> Self {
        Self {
            frequency_mhz: 915.0,
            bitrate_kbps: 96.0,
            deviation_khz: 50.0,
            bandwidth_khz: 467.0,
            preamble_bits: 32,
        }
    }
}

impl RfConfig {
    /// The `<values>` part shared by requests and acknowledgments
    pub fn values_text(&self) -> String {
        format!(
            "{:.1},{:.1},{:.1},{:.1},{}",
            self.frequency_mhz,
            self.bitrate_kbps,
            self.deviation_khz,
            self.bandwidth_khz,
            self.preamble_bits
        )
    }

    /// Encode as a `CFG:` request line (used by peers and simulators)
    pub fn to_command(&self) -> String {
        format!("{}{}\n", CONFIG_PREFIX, self.values_text())
    }
}

impl fmt::Display for RfConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Freq={:.1} BR={:.1} Dev={:.1} BW={:.1} Pre={}",
            self.frequency_mhz,
            self.bitrate_kbps,
            self.deviation_khz,
            self.bandwidth_khz,
            self.preamble_bits
        )
    }
}

/// Identifies one of the five configuration fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RfField {
    /// Carrier frequency
    Frequency,
    /// Bit rate
    Bitrate,
    /// Frequency deviation
    Deviation,
    /// Receive bandwidth
    Bandwidth,
    /// Preamble length
    Preamble,
}

impl RfField {
    /// Unit used in messages
    pub fn unit(&self) -> &'static str {
        match self {
            RfField::Frequency => "MHz",
            RfField::Bitrate => "kbps",
            RfField::Deviation | RfField::Bandwidth => "kHz",
            RfField::Preamble => "bits",
        }
    }

    /// Render a submitted value the way the acknowledgment would
    pub fn format_value(&self, value: f64) -> String {
        match self {
            RfField::Preamble => format!("{}", value as i64),
            _ => format!("{:.1}", value),
        }
    }
}

impl fmt::Display for RfField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RfField::Frequency => "Frequency",
            RfField::Bitrate => "Bitrate",
            RfField::Deviation => "Deviation",
            RfField::Bandwidth => "Bandwidth",
            RfField::Preamble => "Preamble",
        };
        f.write_str(name)
    }
}

/// Inclusive bounds for one field
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    /// Lowest accepted value
    pub min: f64,
    /// Highest accepted value
    pub max: f64,
}

impl Bounds {
    /// Create bounds
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn range(&self) -> RangeInclusive<f64> {
        self.min..=self.max
    }

    fn check(&self, field: RfField, value: f64) -> Result<(), ConfigError> {
        // `contains` is false for NaN, which must be refused too
        if self.range().contains(&value) {
            Ok(())
        } else {
            Err(ConfigError::Range {
                field,
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Allowed ranges for each configuration field
///
/// Different radio front-ends accept slightly different ranges, so these are
/// configuration rather than constants.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RfLimits {
    /// Frequency in MHz
    pub frequency_mhz: Bounds,
    /// Bit rate in kbps
    pub bitrate_kbps: Bounds,
    /// Deviation in kHz
    pub deviation_khz: Bounds,
    /// Receive bandwidth in kHz
    pub bandwidth_khz: Bounds,
    /// Preamble in bits
    pub preamble_bits: Bounds,
}

impl RfLimits {
    /// Permissive ranges of the wired-only modem
    pub const fn wide() -> Self {
        Self {
            frequency_mhz: Bounds::new(150.0, 960.0),
            bitrate_kbps: Bounds::new(1.0, 300.0),
            deviation_khz: Bounds::new(1.0, 200.0),
            bandwidth_khz: Bounds::new(10.0, 500.0),
            preamble_bits: Bounds::new(8.0, 65535.0),
        }
    }

    /// Tighter ranges of the display-equipped modem
    pub const fn narrow() -> Self {
        Self {
            frequency_mhz: Bounds::new(150.0, 960.0),
            bitrate_kbps: Bounds::new(1.0, 300.0),
            deviation_khz: Bounds::new(1.0, 200.0),
            bandwidth_khz: Bounds::new(50.0, 500.0),
            preamble_bits: Bounds::new(8.0, 128.0),
        }
    }

    /// Check every field of a parsed request, in field order
    pub fn validate(&self, raw: &RawConfig) -> Result<RfConfig, ConfigError> {
        self.frequency_mhz.check(RfField::Frequency, raw.frequency_mhz)?;
        self.bitrate_kbps.check(RfField::Bitrate, raw.bitrate_kbps)?;
        self.deviation_khz.check(RfField::Deviation, raw.deviation_khz)?;
        self.bandwidth_khz.check(RfField::Bandwidth, raw.bandwidth_khz)?;
        self.preamble_bits
            .check(RfField::Preamble, raw.preamble_bits as f64)?;

        let preamble_bits = u16::try_from(raw.preamble_bits).map_err(|_| ConfigError::Range {
            field: RfField::Preamble,
            value: raw.preamble_bits as f64,
            min: self.preamble_bits.min,
            max: self.preamble_bits.max.min(u16::MAX as f64),
        })?;

        Ok(RfConfig {
            frequency_mhz: raw.frequency_mhz as f32,
            bitrate_kbps: raw.bitrate_kbps as f32,
            deviation_khz: raw.deviation_khz as f32,
            bandwidth_khz: raw.bandwidth_khz as f32,
            preamble_bits,
        })
    }
}

impl Default for RfLimits {
    fn default() -> Self {
        Self::wide()
    }
}

/// Field values as parsed, before range validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawConfig {
    /// Frequency in MHz
    pub frequency_mhz: f64,
    /// Bit rate in kbps
    pub bitrate_kbps: f64,
    /// Deviation in kHz
    pub deviation_khz: f64,
    /// Bandwidth in kHz
    pub bandwidth_khz: f64,
    /// Preamble in bits
    pub preamble_bits: i64,
}

/// Parse a request line into raw field values
///
/// Returns `Ok(None)` for lines that are not configuration requests at all;
/// those are ignored without an answer. Fields beyond the fifth are ignored.
pub fn parse_command(line: &str) -> Result<Option<RawConfig>, ConfigError> {
    let line = line.trim();
    let Some(params) = line.strip_prefix(CONFIG_PREFIX) else {
        return Ok(None);
    };

    let fields: Vec<&str> = params.split(',').map(str::trim).collect();
    if fields.len() < CONFIG_FIELD_COUNT {
        return Err(ConfigError::Parse(format!(
            "Invalid format - expected CFG:freq,bitrate,deviation,bandwidth,preamble (got {} fields)",
            fields.len()
        )));
    }

    Ok(Some(RawConfig {
        frequency_mhz: parse_float(RfField::Frequency, fields[0])?,
        bitrate_kbps: parse_float(RfField::Bitrate, fields[1])?,
        deviation_khz: parse_float(RfField::Deviation, fields[2])?,
        bandwidth_khz: parse_float(RfField::Bandwidth, fields[3])?,
        preamble_bits: parse_whole(RfField::Preamble, fields[4])?,
    }))
}

/// Integer field; a float with no fractional part (`32.0`) is accepted too
fn parse_whole(field: RfField, text: &str) -> Result<i64, ConfigError> {
    if let Ok(value) = text.parse::<i64>() {
        return Ok(value);
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            Ok(value as i64)
        }
        _ => Err(ConfigError::Parse(format!("Invalid {} value '{}'", field, text))),
    }
}

fn parse_float(field: RfField, text: &str) -> Result<f64, ConfigError> {
    text.parse::<f64>()
        .map_err(|_| ConfigError::Parse(format!("Invalid {} value '{}'", field, text)))
}

/// Acknowledgment line for an applied configuration
pub fn format_ack(config: &RfConfig) -> String {
    format!("{}{}\n", CONFIG_OK_PREFIX, config.values_text())
}

/// Error line for a refused request
pub fn format_error(error: &ConfigError) -> String {
    format!("{}{}\n", CONFIG_ERR_PREFIX, error)
}
