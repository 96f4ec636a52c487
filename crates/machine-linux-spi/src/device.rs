//! Linux spidev controller
//!
//! This module provides the `Spidev` struct that implements the
//! `SpiController` trait using Linux's spidev interface.

use crate::ioctl::{self, SpiIocTransfer};

use machine_core::{OpenError, SpiConfig, SpiController, SpiDevice, SpiError, Transfer};

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::path::Path;

/// Path to kernel spidev buffer size parameter
const BUF_SIZE_SYSFS: &str = "/sys/module/spidev/parameters/bufsiz";

/// An SPI device opened through the Linux spidev driver
pub type LinuxSpi = SpiDevice<Spidev>;

/// Handle to an open `/dev/spidevX.Y` character device
#[derive(Debug)]
pub struct Spidev {
    /// File handle for spidev device
    file: File,
    /// Driver buffer size, the largest message in each direction
    buf_size: usize,
}

impl Spidev {
    /// Open a spidev node for reading and writing
    ///
    /// No configuration is applied; see [`open`] for that.
    pub fn open(path: impl AsRef<Path>) -> machine_core::Result<Self> {
        let path = path.as_ref();
        log::debug!("spidev: Opening device {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| SpiError::OpenFailed {
                path: path.display().to_string(),
                source: e,
            })?;

        let buf_size = max_kernel_buf_size();
        log::debug!("spidev: Buffer size {} bytes", buf_size);

        Ok(Self { file, buf_size })
    }

    /// Override the message size limit read from the driver
    pub fn with_buf_size(mut self, buf_size: usize) -> Self {
        self.buf_size = buf_size;
        self
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl SpiController for Spidev {
    fn raw_fd(&self) -> RawFd {
        self.fd()
    }

    fn read_mode(&self) -> io::Result<u8> {
        let mut mode: u8 = 0;
        unsafe { ioctl::spi_ioc_rd_mode(self.fd(), &mut mode) }?;
        Ok(mode)
    }

    fn write_mode(&mut self, mode: u8) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_mode(self.fd(), &mode) }?;
        Ok(())
    }

    fn read_max_speed_hz(&self) -> io::Result<u32> {
        let mut speed: u32 = 0;
        unsafe { ioctl::spi_ioc_rd_max_speed_hz(self.fd(), &mut speed) }?;
        Ok(speed)
    }

    fn write_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_max_speed_hz(self.fd(), &speed_hz) }?;
        Ok(())
    }

    fn read_bits_per_word(&self) -> io::Result<u8> {
        let mut bits: u8 = 0;
        unsafe { ioctl::spi_ioc_rd_bits_per_word(self.fd(), &mut bits) }?;
        Ok(bits)
    }

    fn write_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_bits_per_word(self.fd(), &bits) }?;
        Ok(())
    }

    fn message(&mut self, transfers: &mut [Transfer<'_>]) -> io::Result<()> {
        let descriptors = transfers
            .iter_mut()
            .map(SpiIocTransfer::from_transfer)
            .collect::<io::Result<Vec<_>>>()?;

        log::trace!(
            "spidev: ioctl {:#x} with {} descriptor(s)",
            ioctl::spi_ioc_message_code(descriptors.len()),
            descriptors.len()
        );

        // The descriptors point into `transfers`, which stays borrowed until
        // the ioctl returns.
        unsafe { ioctl::spi_ioc_message(self.fd(), &descriptors) }?;
        Ok(())
    }

    fn max_message_size(&self) -> Option<usize> {
        Some(self.buf_size)
    }

    fn close(self) -> io::Result<()> {
        let fd = self.file.into_raw_fd();
        if unsafe { libc::close(fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Open a spidev device and apply `config` to it
///
/// The configuration is validated before the device node is opened. If the
/// node opens but a configuration ioctl fails, the returned [`OpenError`]
/// still holds the open device.
pub fn open(config: &SpiConfig) -> Result<LinuxSpi, OpenError<Spidev>> {
    config.validate()?;
    let spidev = Spidev::open(&config.device)?;
    SpiDevice::configure(spidev, config)
}

/// Open a device with default settings
pub fn open_device(device: &str) -> Result<LinuxSpi, OpenError<Spidev>> {
    open(&SpiConfig::new(device))
}

/// Parse the spidev buffer size parameter at `path`
pub fn read_buf_size(path: &Path) -> io::Result<usize> {
    let content = fs::read_to_string(path).map_err(|e| {
        io::Error::new(e.kind(), format!("Failed to read {}: {}", path.display(), e))
    })?;

    match content.trim_end().parse::<usize>() {
        Ok(0) | Err(_) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid buffer size in {}: {:?}", path.display(), content),
        )),
        Ok(size) => Ok(size),
    }
}

/// Largest message the spidev driver accepts in each direction
///
/// Taken from the `bufsiz` module parameter; the driver's default of one
/// page is assumed when it cannot be read.
pub fn max_kernel_buf_size() -> usize {
    match read_buf_size(Path::new(BUF_SIZE_SYSFS)) {
        Ok(size) => size,
        Err(e) => {
            let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            let page_size = usize::try_from(page_size).unwrap_or(4096);
            log::debug!("spidev: {}, assuming {} bytes", e, page_size);
            page_size
        }
    }
}
