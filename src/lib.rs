//! machine-linux - SPI master access through Linux spidev
//!
//! This crate ties the workspace together: it re-exports the device model
//! from `machine-core`, the enabled backends, and a programmer-string
//! registry for opening a device without naming the backend type.
//!
//! # Example
//!
//! ```no_run
//! use machine_linux::{open_spi, BitOrder};
//!
//! let mut spi = open_spi("linux_spi:dev=/dev/spidev0.0,spispeed=1000,mode=0")?;
//! spi.set_bit_order(BitOrder::Msb)?;
//!
//! let reply = spi.transfer(&[0x9F, 0x00, 0x00, 0x00])?;
//! println!("{} -> {:02x?}", spi, reply);
//! spi.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Features
//!
//! - `linux-spi` (default): the `/dev/spidevX.Y` backend
//! - `dummy` (default): the in-memory emulator
//! - `serde`: load [`SpiConfig`] from RON

pub mod programmers;

pub use machine_core::{
    mode, parse_options, speed_from_f64, BitOrder, ModeFlags, OpenError, Result, SpiConfig,
    SpiController, SpiDevice, SpiError, SpiSettings, Transfer,
};
pub use programmers::{available_programmers, open_spi, parse_programmer_string, AnySpi};

#[cfg(feature = "dummy")]
pub use machine_dummy as dummy;
#[cfg(feature = "linux-spi")]
pub use machine_linux_spi as linux_spi;
