//! Device configuration
//!
//! [`SpiConfig`] carries everything applied when a device is opened. It can
//! be built in code, parsed from programmer-string options such as
//! `dev=/dev/spidev0.0,spispeed=4000,mode=3`, or (with the `serde` feature)
//! loaded from RON.

use crate::error::{Result, SpiError};
use crate::mode::{self, BitOrder};

/// Default max speed in Hz applied at open
pub const DEFAULT_MAX_SPEED_HZ: u32 = 1_000;

/// Default word size applied at open
pub const DEFAULT_BITS_PER_WORD: u8 = 8;

/// Configuration for opening an SPI device
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SpiConfig {
    /// Device path (e.g., "/dev/spidev0.0")
    pub device: String,
    /// SPI mode (0-3, default: 0)
    pub mode: u8,
    /// Max clock speed in Hz (default: 1 kHz)
    pub max_speed_hz: u32,
    /// Bit order (default: MSB first)
    pub bit_order: BitOrder,
    /// Bits per word, 0 meaning the controller default (default: 8)
    pub bits_per_word: u8,
    /// Additional mode register flags such as `CS_HIGH` or `LOOP`
    pub extra_flags: u8,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            mode: mode::mode::MODE_0,
            max_speed_hz: DEFAULT_MAX_SPEED_HZ,
            bit_order: BitOrder::Msb,
            bits_per_word: DEFAULT_BITS_PER_WORD,
            extra_flags: 0,
        }
    }
}

impl SpiConfig {
    /// Create a new configuration with the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the SPI clock speed in Hz
    pub fn with_speed(mut self, max_speed_hz: u32) -> Self {
        self.max_speed_hz = max_speed_hz;
        self
    }

    /// Set the SPI mode (0-3)
    pub fn with_mode(mut self, mode: u8) -> Self {
        self.mode = mode;
        self
    }

    /// Set the bit order
    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    /// Set the word size
    pub fn with_bits_per_word(mut self, bits_per_word: u8) -> Self {
        self.bits_per_word = bits_per_word;
        self
    }

    /// Set the extra mode flags
    pub fn with_extra_flags(mut self, extra_flags: u8) -> Self {
        self.extra_flags = extra_flags;
        self
    }

    /// Check every field without touching a device
    pub fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(SpiError::NoDevice);
        }
        check_speed(self.max_speed_hz)?;
        self.mode_byte().map(|_| ())
    }

    /// The packed mode register value this configuration writes at open
    pub fn mode_byte(&self) -> Result<u8> {
        mode::compose_mode_byte(self.mode, self.bit_order, self.extra_flags)
    }

    /// Load a configuration from a RON document
    ///
    /// Missing fields take their default values.
    #[cfg(feature = "serde")]
    pub fn from_ron(s: &str) -> Result<Self> {
        let config: Self = ron::from_str(s)
            .map_err(|e| SpiError::InvalidParameter(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Reject a zero max speed
pub fn check_speed(max_speed_hz: u32) -> Result<()> {
    if max_speed_hz == 0 {
        return Err(SpiError::InvalidSpeed("0 Hz".into()));
    }
    Ok(())
}

/// Convert a speed given as a float to Hz, truncating the fraction
pub fn speed_from_f64(hz: f64) -> Result<u32> {
    let truncated = hz.trunc();
    if !hz.is_finite() || truncated < 1.0 || truncated > u32::MAX as f64 {
        return Err(SpiError::InvalidSpeed(format!("{} Hz", hz)));
    }
    Ok(truncated as u32)
}

/// Parse an integer option in decimal or `0x` hex
fn parse_int<T: TryFrom<u64>>(key: &str, value: &str) -> Result<T> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed
        .ok()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| SpiError::InvalidParameter(format!("Invalid {} value: {}", key, value)))
}

/// Parse programmer options from a list of key-value pairs
///
/// Recognized keys:
///
/// - `dev` - Required: device path
/// - `spispeed` - Optional: speed in kHz
/// - `speed` - Optional: speed in Hz, fractions are truncated
/// - `mode` - Optional: SPI mode 0-3
/// - `bit_order` - Optional: `msb` or `lsb`
/// - `bits` - Optional: bits per word
/// - `extra_flags` - Optional: additional mode flags
pub fn parse_options(options: &[(&str, &str)]) -> Result<SpiConfig> {
    let mut config = SpiConfig::default();

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "spispeed" => {
                let speed_khz: u32 = parse_int(key, value)?;
                config.max_speed_hz = speed_khz.checked_mul(1000).ok_or_else(|| {
                    SpiError::InvalidSpeed(format!("{} kHz", speed_khz))
                })?;
            }
            "speed" => {
                let hz: f64 = value.parse().map_err(|_| {
                    SpiError::InvalidParameter(format!("Invalid speed value: {}", value))
                })?;
                config.max_speed_hz = speed_from_f64(hz)?;
            }
            "mode" => {
                config.mode = parse_int(key, value)?;
            }
            "bit_order" => {
                config.bit_order = value.parse()?;
            }
            "bits" => {
                config.bits_per_word = parse_int(key, value)?;
            }
            "extra_flags" => {
                config.extra_flags = parse_int(key, value)?;
            }
            _ => {
                log::warn!("spidev: Unknown option: {}={}", key, value);
            }
        }
    }

    config.validate()?;
    Ok(config)
}
