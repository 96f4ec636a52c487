//! SPI controller trait
//!
//! [`SpiController`] is the seam between [`SpiDevice`](crate::SpiDevice)
//! and whatever actually holds the device handle. Each method corresponds to
//! one spidev ioctl; implementations do no caching and no validation beyond
//! what the kernel would do.
//!
//! Implementations:
//!
//! - `machine_linux_spi::Spidev` talks to `/dev/spidevX.Y`
//! - `machine_dummy::DummySpi` emulates the register file in memory

use crate::transfer::Transfer;
use std::io;
use std::os::fd::RawFd;

/// Access to one spidev-style controller handle
pub trait SpiController {
    /// Raw file descriptor of the handle
    fn raw_fd(&self) -> RawFd;

    /// Read the 8-bit mode register (`SPI_IOC_RD_MODE`)
    fn read_mode(&self) -> io::Result<u8>;

    /// Write the 8-bit mode register (`SPI_IOC_WR_MODE`)
    fn write_mode(&mut self, mode: u8) -> io::Result<()>;

    /// Read the max clock speed (`SPI_IOC_RD_MAX_SPEED_HZ`)
    fn read_max_speed_hz(&self) -> io::Result<u32>;

    /// Write the max clock speed (`SPI_IOC_WR_MAX_SPEED_HZ`)
    fn write_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()>;

    /// Read the word size (`SPI_IOC_RD_BITS_PER_WORD`)
    fn read_bits_per_word(&self) -> io::Result<u8>;

    /// Write the word size (`SPI_IOC_WR_BITS_PER_WORD`)
    fn write_bits_per_word(&mut self, bits: u8) -> io::Result<()>;

    /// Run all transfers as one message (`SPI_IOC_MESSAGE(n)`)
    ///
    /// Chip select stays asserted across the transfers unless a transfer
    /// sets `cs_change`. Callers validate the message beforehand.
    fn message(&mut self, transfers: &mut [Transfer<'_>]) -> io::Result<()>;

    /// Most bytes one message may carry in each direction, `None` if the
    /// controller has no limit
    fn max_message_size(&self) -> Option<usize> {
        None
    }

    /// Release the handle
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}
