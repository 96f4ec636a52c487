//! machine-linux-spi - Linux spidev support
//!
//! This crate provides the [`Spidev`] controller, which reaches an SPI master
//! through the `/dev/spidevX.Y` device interface, and the [`open`] helper
//! that wraps it in a configured [`SpiDevice`](machine_core::SpiDevice).
//!
//! # Overview
//!
//! The Linux SPI driver exposes SPI controllers through character devices
//! at `/dev/spidevX.Y` where X is the bus number and Y is the chip select.
//! Settings live in the kernel and are read and written with ioctls; a
//! transfer is a `SPI_IOC_MESSAGE(n)` ioctl carrying `n` descriptors.
//!
//! # Example
//!
//! ```no_run
//! use machine_core::{BitOrder, SpiConfig};
//!
//! // Open with default settings (1 kHz, mode 0, MSB first, 8 bits per word)
//! let mut spi = machine_linux_spi::open_device("/dev/spidev0.0")?;
//!
//! // Or with custom settings
//! let config = SpiConfig::new("/dev/spidev0.0")
//!     .with_speed(4_000_000)  // 4 MHz
//!     .with_mode(3)
//!     .with_bit_order(BitOrder::Msb);
//! let mut spi = machine_linux_spi::open(&config)?;
//!
//! // Read JEDEC ID
//! let id = spi.transfer(&[0x9F, 0x00, 0x00, 0x00])?;
//! println!("JEDEC ID: {:02X} {:02X} {:02X}", id[1], id[2], id[3]);
//! println!("{}", spi);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to `/dev/spidevX.Y` device
//! - May require adding user to `spi` group or using udev rules

pub mod device;
pub mod ioctl;

// Re-exports
pub use device::{max_kernel_buf_size, open, open_device, read_buf_size, LinuxSpi, Spidev};
pub use ioctl::SpiIocTransfer;
