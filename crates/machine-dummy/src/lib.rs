//! machine-dummy - In-memory spidev emulator for testing
//!
//! This crate provides a dummy SPI controller that emulates the spidev
//! register file (mode byte, max speed, bits per word) in memory and answers
//! transfers according to a configurable policy. It records every ioctl it
//! receives, which makes it useful for testing `SpiDevice` without hardware.

use machine_core::{SpiConfig, SpiController, SpiDevice, Transfer};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Errno returned for unsupported mode bits, as the kernel does
const EINVAL: i32 = 22;

/// One ioctl received by the dummy controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DummyOp {
    /// `SPI_IOC_RD_MODE`
    ReadMode,
    /// `SPI_IOC_WR_MODE`
    WriteMode,
    /// `SPI_IOC_RD_MAX_SPEED_HZ`
    ReadMaxSpeed,
    /// `SPI_IOC_WR_MAX_SPEED_HZ`
    WriteMaxSpeed,
    /// `SPI_IOC_RD_BITS_PER_WORD`
    ReadBitsPerWord,
    /// `SPI_IOC_WR_BITS_PER_WORD`
    WriteBitsPerWord,
    /// `SPI_IOC_MESSAGE(n)`
    Message,
    /// Releasing the handle
    Close,
}

/// Shared log of the ioctls a [`DummySpi`] received
///
/// Clones share the same log, and it stays readable after the controller
/// itself has been closed or dropped.
#[derive(Debug, Clone, Default)]
pub struct DummyJournal(Arc<Mutex<Vec<DummyOp>>>);

impl DummyJournal {
    fn lock(&self) -> MutexGuard<'_, Vec<DummyOp>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, op: DummyOp) {
        self.lock().push(op);
    }

    /// Every ioctl logged so far, in order
    pub fn ops(&self) -> Vec<DummyOp> {
        self.lock().clone()
    }

    /// How many times `op` was logged
    pub fn count(&self, op: DummyOp) -> usize {
        self.lock().iter().filter(|&&logged| logged == op).count()
    }

    /// Forget everything logged so far
    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// How the emulated slave answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyResponse {
    /// MISO echoes MOSI; reads without transmit data return zeros
    Loopback,
    /// Every received byte is the given value
    Fill(u8),
    /// Received bytes are taken from the queue, then 0xFF once it runs dry
    Script(VecDeque<u8>),
}

/// A transfer as seen by the dummy controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedTransfer {
    /// Bytes shifted out, `None` for a receive-only transfer
    pub tx: Option<Vec<u8>>,
    /// Number of bytes clocked
    pub len: usize,
    /// Clock speed override
    pub speed_hz: u32,
    /// Delay after the transfer
    pub delay_usecs: u16,
    /// Word size override
    pub bits_per_word: u8,
    /// Chip select change flag
    pub cs_change: bool,
    /// Transmit bus width
    pub tx_nbits: u8,
    /// Receive bus width
    pub rx_nbits: u8,
}

/// Configuration for the dummy controller
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// File descriptor number reported for the handle
    pub fd: RawFd,
    /// Mode register bits the emulated controller accepts
    pub supported_mode_bits: u8,
    /// Initial mode register
    pub mode: u8,
    /// Initial max speed in Hz
    pub max_speed_hz: u32,
    /// Initial bits per word
    pub bits_per_word: u8,
    /// Fastest clock the controller can do; faster requests are clamped
    pub speed_limit_hz: Option<u32>,
    /// Largest message in each direction, like the spidev buffer size
    pub max_message_size: Option<usize>,
    /// How received data is produced
    pub response: DummyResponse,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            fd: 3,
            supported_mode_bits: 0xFF,
            mode: 0,
            max_speed_hz: 500_000,
            bits_per_word: 8,
            speed_limit_hz: None,
            max_message_size: None,
            response: DummyResponse::Loopback,
        }
    }
}

/// Dummy spidev controller
///
/// Emulates a spidev handle in memory for testing purposes.
#[derive(Debug)]
pub struct DummySpi {
    config: DummyConfig,
    mode: u8,
    max_speed_hz: u32,
    bits_per_word: u8,
    journal: DummyJournal,
    transfers: Vec<RecordedTransfer>,
    faults: RefCell<Vec<(DummyOp, i32)>>,
}

impl DummySpi {
    /// Create a new dummy controller with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            mode: config.mode,
            max_speed_hz: config.max_speed_hz,
            bits_per_word: config.bits_per_word,
            config,
            journal: DummyJournal::default(),
            transfers: Vec::new(),
            faults: RefCell::new(Vec::new()),
        }
    }

    /// Create a new dummy controller with default configuration (loopback)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Make the next `op` fail with `errno`
    ///
    /// Faults queue up; each one is consumed by the first matching ioctl.
    pub fn fail_next(&mut self, op: DummyOp, errno: i32) {
        self.faults.get_mut().push((op, errno));
    }

    /// Builder form of [`fail_next`](Self::fail_next)
    pub fn with_fault(mut self, op: DummyOp, errno: i32) -> Self {
        self.fail_next(op, errno);
        self
    }

    /// Every ioctl received so far, in order
    pub fn ops(&self) -> Vec<DummyOp> {
        self.journal.ops()
    }

    /// Handle to the ioctl log that outlives the controller
    pub fn journal(&self) -> DummyJournal {
        self.journal.clone()
    }

    /// Every transfer received so far, in order
    pub fn transfers(&self) -> &[RecordedTransfer] {
        &self.transfers
    }

    /// Forget the recorded ioctls and transfers
    pub fn clear_history(&mut self) {
        self.journal.clear();
        self.transfers.clear();
    }

    /// Current mode register, read without recording an ioctl
    pub fn mode_register(&self) -> u8 {
        self.mode
    }

    /// Replace the response policy
    pub fn set_response(&mut self, response: DummyResponse) {
        self.config.response = response;
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    fn record(&self, op: DummyOp) -> io::Result<()> {
        self.journal.push(op);
        let mut faults = self.faults.borrow_mut();
        if let Some(pos) = faults.iter().position(|(fault, _)| *fault == op) {
            let (_, errno) = faults.remove(pos);
            log::debug!("dummy_spi: Injecting errno {} for {:?}", errno, op);
            return Err(io::Error::from_raw_os_error(errno));
        }
        Ok(())
    }

    fn respond(&mut self, transfer: &mut Transfer<'_>) {
        let tx = transfer.tx;
        let Some(rx) = transfer.rx.as_deref_mut() else {
            return;
        };

        match &mut self.config.response {
            DummyResponse::Loopback => {
                let tx = tx.unwrap_or_default();
                let n = tx.len().min(rx.len());
                rx[..n].copy_from_slice(&tx[..n]);
                rx[n..].fill(0);
            }
            DummyResponse::Fill(value) => rx.fill(*value),
            DummyResponse::Script(queue) => {
                for byte in rx.iter_mut() {
                    *byte = queue.pop_front().unwrap_or(0xFF);
                }
            }
        }
    }
}

impl SpiController for DummySpi {
    fn raw_fd(&self) -> RawFd {
        self.config.fd
    }

    fn read_mode(&self) -> io::Result<u8> {
        self.record(DummyOp::ReadMode)?;
        Ok(self.mode)
    }

    fn write_mode(&mut self, mode: u8) -> io::Result<()> {
        self.record(DummyOp::WriteMode)?;
        if mode & !self.config.supported_mode_bits != 0 {
            log::debug!(
                "dummy_spi: Mode {:#04x} has unsupported bits (supported {:#04x})",
                mode,
                self.config.supported_mode_bits
            );
            return Err(io::Error::from_raw_os_error(EINVAL));
        }
        self.mode = mode;
        Ok(())
    }

    fn read_max_speed_hz(&self) -> io::Result<u32> {
        self.record(DummyOp::ReadMaxSpeed)?;
        Ok(self.max_speed_hz)
    }

    fn write_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        self.record(DummyOp::WriteMaxSpeed)?;
        self.max_speed_hz = match self.config.speed_limit_hz {
            Some(limit) => speed_hz.min(limit),
            None => speed_hz,
        };
        Ok(())
    }

    fn read_bits_per_word(&self) -> io::Result<u8> {
        self.record(DummyOp::ReadBitsPerWord)?;
        Ok(self.bits_per_word)
    }

    fn write_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        self.record(DummyOp::WriteBitsPerWord)?;
        self.bits_per_word = bits;
        Ok(())
    }

    fn message(&mut self, transfers: &mut [Transfer<'_>]) -> io::Result<()> {
        self.record(DummyOp::Message)?;
        for transfer in transfers.iter_mut() {
            self.transfers.push(RecordedTransfer {
                tx: transfer.tx.map(<[u8]>::to_vec),
                len: transfer.len(),
                speed_hz: transfer.speed_hz,
                delay_usecs: transfer.delay_usecs,
                bits_per_word: transfer.bits_per_word,
                cs_change: transfer.cs_change,
                tx_nbits: transfer.tx_nbits,
                rx_nbits: transfer.rx_nbits,
            });
            self.respond(transfer);
        }
        Ok(())
    }

    fn max_message_size(&self) -> Option<usize> {
        self.config.max_message_size
    }

    fn close(self) -> io::Result<()> {
        self.record(DummyOp::Close)
    }
}

/// Wrap a dummy controller in a configured `SpiDevice`
///
/// Behaves like opening a real device: the configuration is validated
/// first, and a failing configuration step leaves the device inside the
/// returned error.
pub fn open_dummy(
    controller: DummySpi,
    config: &SpiConfig,
) -> Result<SpiDevice<DummySpi>, machine_core::OpenError<DummySpi>> {
    config.validate()?;
    SpiDevice::configure(controller, config)
}

#[cfg(test)]
mod tests;
