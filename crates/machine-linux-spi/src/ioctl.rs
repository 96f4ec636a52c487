//! Linux spidev ioctl definitions
//!
//! Request numbers and the transfer descriptor from `<linux/spi/spidev.h>`.

use machine_core::Transfer;
use nix::{ioctl_read, ioctl_write_buf, ioctl_write_ptr};
use std::io;

// SPI ioctl magic number
const SPI_IOC_MAGIC: u8 = b'k';

// SPI ioctl type numbers
const SPI_IOC_TYPE_MESSAGE: u8 = 0;
const SPI_IOC_TYPE_MODE: u8 = 1;
const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

// Generate ioctl functions
ioctl_read!(spi_ioc_rd_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
ioctl_read!(
    spi_ioc_rd_bits_per_word,
    SPI_IOC_MAGIC,
    SPI_IOC_TYPE_BITS_PER_WORD,
    u8
);
ioctl_write_ptr!(
    spi_ioc_wr_bits_per_word,
    SPI_IOC_MAGIC,
    SPI_IOC_TYPE_BITS_PER_WORD,
    u8
);
ioctl_read!(
    spi_ioc_rd_max_speed_hz,
    SPI_IOC_MAGIC,
    SPI_IOC_TYPE_MAX_SPEED_HZ,
    u32
);
ioctl_write_ptr!(
    spi_ioc_wr_max_speed_hz,
    SPI_IOC_MAGIC,
    SPI_IOC_TYPE_MAX_SPEED_HZ,
    u32
);

// SPI_IOC_MESSAGE(n) = _IOW(SPI_IOC_MAGIC, 0, char[n * sizeof(struct spi_ioc_transfer)])
// The size is taken from the slice length.
ioctl_write_buf!(
    spi_ioc_message,
    SPI_IOC_MAGIC,
    SPI_IOC_TYPE_MESSAGE,
    SpiIocTransfer
);

/// Size of `struct spi_ioc_transfer`
pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

/// Request number of `SPI_IOC_MESSAGE(n)`
pub fn spi_ioc_message_code(n: usize) -> nix::sys::ioctl::ioctl_num_type {
    nix::request_code_write!(
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MESSAGE,
        n * SPI_IOC_TRANSFER_SIZE
    )
}

/// SPI transfer structure for ioctl
///
/// This must match the kernel's `struct spi_ioc_transfer` layout. Buffer
/// addresses are always carried in 64-bit fields, even on 32-bit systems.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpiIocTransfer {
    pub tx_buf: u64,          // __u64 tx_buf
    pub rx_buf: u64,          // __u64 rx_buf
    pub len: u32,             // __u32 len
    pub speed_hz: u32,        // __u32 speed_hz
    pub delay_usecs: u16,     // __u16 delay_usecs
    pub bits_per_word: u8,    // __u8 bits_per_word
    pub cs_change: u8,        // __u8 cs_change
    pub tx_nbits: u8,         // __u8 tx_nbits
    pub rx_nbits: u8,         // __u8 rx_nbits
    pub word_delay_usecs: u8, // __u8 word_delay_usecs
    pub pad: u8,              // __u8 pad
}

const _: () = assert!(std::mem::size_of::<SpiIocTransfer>() == SPI_IOC_TRANSFER_SIZE);

impl SpiIocTransfer {
    /// Build the descriptor for one transfer
    ///
    /// Empty buffers are passed as null addresses. The descriptor holds raw
    /// pointers into `transfer`'s buffers, so `transfer` must outlive the
    /// ioctl that consumes it.
    pub fn from_transfer(transfer: &mut Transfer<'_>) -> io::Result<Self> {
        let len = u32::try_from(transfer.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("transfer of {} bytes is too long", transfer.len()),
            )
        })?;

        let tx_buf = transfer
            .tx
            .filter(|buf| !buf.is_empty())
            .map_or(0, |buf| buf.as_ptr() as u64);
        let rx_buf = transfer
            .rx
            .as_deref_mut()
            .filter(|buf| !buf.is_empty())
            .map_or(0, |buf| buf.as_mut_ptr() as u64);

        Ok(Self {
            tx_buf,
            rx_buf,
            len,
            speed_hz: transfer.speed_hz,
            delay_usecs: transfer.delay_usecs,
            bits_per_word: transfer.bits_per_word,
            cs_change: transfer.cs_change as u8,
            tx_nbits: transfer.tx_nbits,
            rx_nbits: transfer.rx_nbits,
            word_delay_usecs: transfer.word_delay_usecs,
            pad: 0,
        })
    }
}
