//! Error types for SPI device operations
//!
//! Errors fall into three groups:
//!
//! - validation errors, detected before any syscall is issued and never
//!   partially applied
//! - OS errors, wrapping the `std::io::Error` of the failing open, ioctl or
//!   close and naming the step that failed
//! - [`SpiError::Closed`], returned by every operation other than `close()`
//!   once the device has been released

use std::io;
use thiserror::Error;

/// SPI device errors
#[derive(Debug, Error)]
pub enum SpiError {
    /// Device has already been closed
    #[error("SPI device is closed")]
    Closed,

    /// Device not specified
    #[error("No device specified. Use dev=/dev/spidevX.Y")]
    NoDevice,

    /// SPI mode outside 0-3
    #[error("Invalid SPI mode {0} (must be 0-3)")]
    InvalidMode(u8),

    /// Bit order other than "msb" or "lsb"
    #[error("Invalid bit order '{0}' (must be \"msb\" or \"lsb\")")]
    InvalidBitOrder(String),

    /// Speed that is zero, negative, not finite, or does not fit in 32 bits
    #[error("Invalid max speed: {0}")]
    InvalidSpeed(String),

    /// Transmit and receive buffers of a full-duplex transfer differ in length
    #[error("Transmit buffer is {tx} bytes but receive buffer is {rx} bytes")]
    LengthMismatch { tx: usize, rx: usize },

    /// Transfer element that does not fit in a byte
    #[error("Invalid data byte at index {index}: {value}")]
    InvalidDataByte { index: usize, value: String },

    /// Message with no transfers
    #[error("SPI message must contain at least one transfer")]
    EmptyMessage,

    /// Message with more transfers than a single ioctl can carry
    #[error("SPI message has {count} transfers (max {max})")]
    TooManySegments { count: usize, max: usize },

    /// Transfer length that does not fit the descriptor's 32-bit length field
    #[error("Transfer of {0} bytes exceeds the descriptor length field")]
    TransferTooLong(usize),

    /// Message carrying more bytes in one direction than the controller buffers
    #[error("SPI message of {len} bytes exceeds the controller buffer of {max} bytes")]
    MessageTooLarge { len: usize, max: usize },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unknown programmer name
    #[error("Unknown programmer: {0}")]
    UnknownProgrammer(String),

    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to read the mode register
    #[error("Failed to get SPI mode: {0}")]
    GetModeFailed(#[source] io::Error),

    /// Failed to write the mode register
    #[error("Failed to set SPI mode byte to {mode:#04x}: {source}")]
    SetModeFailed {
        mode: u8,
        #[source]
        source: io::Error,
    },

    /// Failed to read the max speed
    #[error("Failed to get SPI max speed: {0}")]
    GetSpeedFailed(#[source] io::Error),

    /// Failed to set clock speed
    #[error("Failed to set clock speed to {speed} Hz: {source}")]
    SetSpeedFailed {
        speed: u32,
        #[source]
        source: io::Error,
    },

    /// Failed to read bits per word
    #[error("Failed to get bits per word: {0}")]
    GetBitsPerWordFailed(#[source] io::Error),

    /// Failed to set bits per word
    #[error("Failed to set bits per word to {bits}: {source}")]
    SetBitsPerWordFailed {
        bits: u8,
        #[source]
        source: io::Error,
    },

    /// SPI transfer failed
    #[error("SPI transfer of {len} bytes failed: {source}")]
    TransferFailed {
        len: usize,
        #[source]
        source: io::Error,
    },

    /// Failed to release the device handle
    #[error("Failed to close SPI device: {0}")]
    CloseFailed(#[source] io::Error),
}

impl SpiError {
    /// Returns true for argument errors detected before any syscall
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SpiError::NoDevice
                | SpiError::InvalidMode(_)
                | SpiError::InvalidBitOrder(_)
                | SpiError::InvalidSpeed(_)
                | SpiError::LengthMismatch { .. }
                | SpiError::InvalidDataByte { .. }
                | SpiError::EmptyMessage
                | SpiError::TooManySegments { .. }
                | SpiError::TransferTooLong(_)
                | SpiError::MessageTooLarge { .. }
                | SpiError::InvalidParameter(_)
                | SpiError::UnknownProgrammer(_)
        )
    }

    /// Returns true for errors caused by a failing open, ioctl or close
    pub fn is_os_error(&self) -> bool {
        self.io_error().is_some()
    }

    /// The underlying I/O error, if this is an OS error
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            SpiError::OpenFailed { source, .. }
            | SpiError::SetModeFailed { source, .. }
            | SpiError::SetSpeedFailed { source, .. }
            | SpiError::SetBitsPerWordFailed { source, .. }
            | SpiError::TransferFailed { source, .. } => Some(source),
            SpiError::GetModeFailed(source)
            | SpiError::GetSpeedFailed(source)
            | SpiError::GetBitsPerWordFailed(source)
            | SpiError::CloseFailed(source) => Some(source),
            _ => None,
        }
    }

    /// The raw errno of the underlying I/O error, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }
}

/// Result type for SPI device operations
pub type Result<T> = std::result::Result<T, SpiError>;
