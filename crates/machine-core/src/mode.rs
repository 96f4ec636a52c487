//! SPI mode register layout
//!
//! The spidev mode register is a single byte shared by several logical
//! settings: clock phase and polarity in bits 0-1, LSB-first in bit 3, and
//! controller-specific flags in the remaining bits. Every setter has to read
//! the current byte, replace only its own field, and write the result back.
//! The functions here do that arithmetic without touching a device.

use crate::error::{Result, SpiError};
use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;

/// SPI mode constants
pub mod mode {
    /// SPI mode 0: CPOL=0, CPHA=0
    pub const MODE_0: u8 = 0;
    /// SPI mode 1: CPOL=0, CPHA=1
    pub const MODE_1: u8 = 1;
    /// SPI mode 2: CPOL=1, CPHA=0
    pub const MODE_2: u8 = 2;
    /// SPI mode 3: CPOL=1, CPHA=1
    pub const MODE_3: u8 = 3;
}

bitflags! {
    /// Bits of the 8-bit spidev mode register
    ///
    /// Names follow `<linux/spi/spidev.h>`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeFlags: u8 {
        /// Clock phase
        const CPHA      = 0x01;
        /// Clock polarity
        const CPOL      = 0x02;
        /// Chip select active high
        const CS_HIGH   = 0x04;
        /// Shift out least significant bit first
        const LSB_FIRST = 0x08;
        /// Shared SI/SO line
        const THREE_WIRE = 0x10;
        /// Loopback mode
        const LOOP      = 0x20;
        /// No chip select
        const NO_CS     = 0x40;
        /// Slave pulls low to pause
        const READY     = 0x80;

        /// Clock phase and polarity together
        const MODE_MASK = Self::CPHA.bits() | Self::CPOL.bits();
        /// Bits owned by mode and bit order; everything else is an extra flag
        const RESERVED = Self::MODE_MASK.bits() | Self::LSB_FIRST.bits();
    }
}

/// Bit order within each transmitted word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BitOrder {
    /// Most significant bit first
    #[default]
    Msb,
    /// Least significant bit first
    Lsb,
}

impl BitOrder {
    /// Lowercase name as used in option strings and diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            BitOrder::Msb => "msb",
            BitOrder::Lsb => "lsb",
        }
    }
}

impl fmt::Display for BitOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BitOrder {
    type Err = SpiError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("msb") {
            Ok(BitOrder::Msb)
        } else if s.eq_ignore_ascii_case("lsb") {
            Ok(BitOrder::Lsb)
        } else {
            Err(SpiError::InvalidBitOrder(s.to_string()))
        }
    }
}

impl TryFrom<&str> for BitOrder {
    type Error = SpiError;

    fn try_from(s: &str) -> Result<Self> {
        s.parse()
    }
}

/// Check that `mode` is one of the four SPI modes
pub fn check_mode(mode: u8) -> Result<()> {
    if mode > mode::MODE_3 {
        return Err(SpiError::InvalidMode(mode));
    }
    Ok(())
}

/// Build a complete mode byte from its three fields
///
/// The fields are OR-ed together, so extra flags that include CPHA, CPOL or
/// LSB_FIRST set those bits as well.
pub fn compose_mode_byte(mode: u8, bit_order: BitOrder, extra_flags: u8) -> Result<u8> {
    check_mode(mode)?;
    let lsb = match bit_order {
        BitOrder::Lsb => ModeFlags::LSB_FIRST.bits(),
        BitOrder::Msb => 0,
    };
    Ok(mode | lsb | extra_flags)
}

/// Replace the clock phase/polarity field of `current`
pub fn with_mode(current: u8, mode: u8) -> Result<u8> {
    check_mode(mode)?;
    Ok((current & !ModeFlags::MODE_MASK.bits()) | mode)
}

/// Replace the LSB-first bit of `current`
pub fn with_bit_order(current: u8, bit_order: BitOrder) -> u8 {
    let flags = ModeFlags::from_bits_retain(current);
    flags
        .difference(ModeFlags::LSB_FIRST)
        .union(if bit_order == BitOrder::Lsb {
            ModeFlags::LSB_FIRST
        } else {
            ModeFlags::empty()
        })
        .bits()
}

/// Replace the extra-flags field of `current`
///
/// Mode and bit order bits of `current` are kept and `extra_flags` is OR-ed
/// on top. Bits of `extra_flags` inside [`ModeFlags::RESERVED`] alias mode
/// and bit order: they can be set this way but not cleared, and
/// [`extra_flags_of`] does not report them.
pub fn with_extra_flags(current: u8, extra_flags: u8) -> u8 {
    (current & ModeFlags::RESERVED.bits()) | extra_flags
}

/// Clock phase/polarity field of a mode byte
pub fn mode_of(byte: u8) -> u8 {
    byte & ModeFlags::MODE_MASK.bits()
}

/// Bit order field of a mode byte
pub fn bit_order_of(byte: u8) -> BitOrder {
    if ModeFlags::from_bits_retain(byte).contains(ModeFlags::LSB_FIRST) {
        BitOrder::Lsb
    } else {
        BitOrder::Msb
    }
}

/// Extra-flags field of a mode byte
pub fn extra_flags_of(byte: u8) -> u8 {
    byte & !ModeFlags::RESERVED.bits()
}
