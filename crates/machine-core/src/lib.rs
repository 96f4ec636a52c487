//! machine-core - SPI master device model
//!
//! This crate contains everything about a spidev-style SPI master that does
//! not depend on how the device is reached:
//!
//! - [`SpiDevice`], the open/closed device object with its accessors and
//!   full-duplex transfers
//! - [`SpiController`], the trait a backend implements (one method per
//!   spidev ioctl)
//! - the mode register layout and its read-modify-write helpers
//! - [`SpiConfig`] and programmer-option parsing
//! - [`SpiError`]
//!
//! Backends live in their own crates: `machine-linux-spi` for
//! `/dev/spidevX.Y` and `machine-dummy` for an in-memory emulator.
//!
//! # Example
//!
//! ```ignore
//! use machine_core::{BitOrder, SpiConfig, SpiDevice};
//!
//! let config = SpiConfig::new("/dev/spidev0.0")
//!     .with_speed(1_000_000)
//!     .with_mode(3);
//! let mut spi = SpiDevice::configure(controller, &config)?;
//!
//! spi.set_bit_order(BitOrder::Lsb)?;
//! let reply = spi.transfer(&[0x9F, 0x00, 0x00, 0x00])?;
//! println!("{}", spi);
//! ```

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod mode;
pub mod transfer;

// Re-exports
pub use config::{parse_options, speed_from_f64, SpiConfig};
pub use controller::SpiController;
pub use device::{OpenError, SpiDevice, SpiSettings};
pub use error::{Result, SpiError};
pub use mode::{BitOrder, ModeFlags};
pub use transfer::{Transfer, MAX_TRANSFERS};
