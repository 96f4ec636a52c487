//! SPI device
//!
//! [`SpiDevice`] owns one controller handle and exposes the spidev settings
//! as fallible accessors. Nothing is cached: every getter is an ioctl, and
//! every setter that touches the shared mode register reads it first and
//! writes back only its own field.
//!
//! The device is either open or closed. It starts open; [`SpiDevice::close`]
//! (or dropping it) releases the handle exactly once, after which every
//! operation except `close` returns [`SpiError::Closed`].

use crate::config::{check_speed, SpiConfig};
use crate::controller::SpiController;
use crate::error::{Result, SpiError};
use crate::mode::{self, BitOrder};
use crate::transfer::{message_size, validate_message, Transfer};

use log::{debug, info, trace, warn};
use std::fmt;
use std::os::fd::RawFd;

/// An open SPI master device
pub struct SpiDevice<C: SpiController> {
    /// Controller handle, `None` once closed
    controller: Option<C>,
    /// Path the device was opened from
    devpath: String,
}

impl<C: SpiController> SpiDevice<C> {
    /// Take ownership of an open controller and apply `config` to it
    ///
    /// The mode byte, max speed and bits per word are each written and then
    /// read back, in that order.
    ///
    /// # Partial configuration
    ///
    /// If a step fails the handle is *not* closed. The returned
    /// [`OpenError`] carries the partially configured device so the caller
    /// can inspect it before closing it; dropping the error closes it.
    pub fn configure(controller: C, config: &SpiConfig) -> std::result::Result<Self, OpenError<C>> {
        let mut device = Self {
            controller: Some(controller),
            devpath: config.device.clone(),
        };

        match device.apply(config) {
            Ok(()) => Ok(device),
            Err(error) => Err(OpenError {
                error,
                device: Some(device),
            }),
        }
    }

    fn apply(&mut self, config: &SpiConfig) -> Result<()> {
        config.validate()?;
        let mode = config.mode_byte()?;
        let speed = config.max_speed_hz;
        let bits = config.bits_per_word;
        let controller = self.controller_mut()?;

        // Set mode, bit order and extra flags
        controller
            .write_mode(mode)
            .and_then(|()| controller.read_mode())
            .map_err(|source| SpiError::SetModeFailed { mode, source })
            .map(|actual| check_readback("mode", mode as u32, actual as u32))?;

        // Set clock speed
        controller
            .write_max_speed_hz(speed)
            .and_then(|()| controller.read_max_speed_hz())
            .map_err(|source| SpiError::SetSpeedFailed { speed, source })
            .map(|actual| check_readback("max speed", speed, actual))?;

        // Set bits per word
        controller
            .write_bits_per_word(bits)
            .and_then(|()| controller.read_bits_per_word())
            .map_err(|source| SpiError::SetBitsPerWordFailed { bits, source })
            .map(|actual| check_readback("bits per word", bits as u32, actual as u32))?;

        info!(
            "spidev: Opened {} (mode={}, speed={} Hz, bit_order={}, bits_per_word={}, extra_flags={:#04x})",
            self.devpath, config.mode, speed, config.bit_order, bits, config.extra_flags
        );
        Ok(())
    }

    fn controller(&self) -> Result<&C> {
        self.controller.as_ref().ok_or(SpiError::Closed)
    }

    fn controller_mut(&mut self) -> Result<&mut C> {
        self.controller.as_mut().ok_or(SpiError::Closed)
    }

    /// Path the device was opened from
    pub fn devpath(&self) -> &str {
        &self.devpath
    }

    /// File descriptor of the open handle, `None` once closed
    pub fn fd(&self) -> Option<RawFd> {
        self.controller.as_ref().map(SpiController::raw_fd)
    }

    /// Returns true until the device is closed
    pub fn is_open(&self) -> bool {
        self.controller.is_some()
    }

    /// Borrow the controller, `None` once closed
    pub fn get_ref(&self) -> Option<&C> {
        self.controller.as_ref()
    }

    /// Mutably borrow the controller, `None` once closed
    pub fn get_mut(&mut self) -> Option<&mut C> {
        self.controller.as_mut()
    }

    // Mode register

    fn read_mode_byte(&self) -> Result<u8> {
        self.controller()?
            .read_mode()
            .map_err(SpiError::GetModeFailed)
    }

    fn write_mode_byte(&mut self, mode: u8) -> Result<()> {
        self.controller_mut()?
            .write_mode(mode)
            .map_err(|source| SpiError::SetModeFailed { mode, source })?;
        debug!("spidev: Set mode register to {:#04x}", mode);
        Ok(())
    }

    /// Current SPI mode (0-3)
    pub fn mode(&self) -> Result<u8> {
        self.read_mode_byte().map(mode::mode_of)
    }

    /// Change the SPI mode, keeping bit order and extra flags
    pub fn set_mode(&mut self, mode: u8) -> Result<()> {
        mode::check_mode(mode)?;
        let current = self.read_mode_byte()?;
        self.write_mode_byte(mode::with_mode(current, mode)?)
    }

    /// Current bit order
    pub fn bit_order(&self) -> Result<BitOrder> {
        self.read_mode_byte().map(mode::bit_order_of)
    }

    /// Change the bit order, keeping mode and extra flags
    pub fn set_bit_order(&mut self, bit_order: BitOrder) -> Result<()> {
        let current = self.read_mode_byte()?;
        self.write_mode_byte(mode::with_bit_order(current, bit_order))
    }

    /// Current extra mode flags (every bit except CPHA, CPOL and LSB_FIRST)
    pub fn extra_flags(&self) -> Result<u8> {
        self.read_mode_byte().map(mode::extra_flags_of)
    }

    /// Change the extra mode flags, keeping mode and bit order
    ///
    /// The flags are OR-ed onto the current mode and bit order bits, so a
    /// value that includes CPHA, CPOL or LSB_FIRST also sets those.
    pub fn set_extra_flags(&mut self, extra_flags: u8) -> Result<()> {
        let current = self.read_mode_byte()?;
        self.write_mode_byte(mode::with_extra_flags(current, extra_flags))
    }

    // Speed and word size

    /// Current max clock speed in Hz
    pub fn max_speed_hz(&self) -> Result<u32> {
        self.controller()?
            .read_max_speed_hz()
            .map_err(SpiError::GetSpeedFailed)
    }

    /// Change the max clock speed
    pub fn set_max_speed_hz(&mut self, speed: u32) -> Result<()> {
        check_speed(speed)?;
        self.controller_mut()?
            .write_max_speed_hz(speed)
            .map_err(|source| SpiError::SetSpeedFailed { speed, source })?;
        debug!("spidev: Set speed to {} Hz", speed);
        Ok(())
    }

    /// Current word size, 0 meaning the controller default
    pub fn bits_per_word(&self) -> Result<u8> {
        self.controller()?
            .read_bits_per_word()
            .map_err(SpiError::GetBitsPerWordFailed)
    }

    /// Change the word size
    pub fn set_bits_per_word(&mut self, bits: u8) -> Result<()> {
        self.controller_mut()?
            .write_bits_per_word(bits)
            .map_err(|source| SpiError::SetBitsPerWordFailed { bits, source })?;
        debug!("spidev: Set bits per word to {}", bits);
        Ok(())
    }

    // Transfers

    /// Full-duplex transfer: shift out `tx` and return the bytes shifted in
    ///
    /// The result always has the same length as `tx`. A zero-length
    /// transfer is still passed to the controller.
    pub fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>> {
        let mut rx = vec![0u8; tx.len()];
        self.transfer_into(tx, &mut rx)?;
        Ok(rx)
    }

    /// Full-duplex transfer into a caller-supplied buffer of the same length
    pub fn transfer_into(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        let transfer = Transfer::full_duplex(tx, rx)?;
        self.message(&mut [transfer])
    }

    /// Full-duplex transfer replacing the contents of `buf` with the reply
    pub fn transfer_in_place(&mut self, buf: &mut [u8]) -> Result<()> {
        let tx = buf.to_vec();
        self.transfer_into(&tx, buf)
    }

    /// Full-duplex transfer of a fixed-size array
    pub fn transfer_array<const N: usize>(&mut self, tx: &[u8; N]) -> Result<[u8; N]> {
        let mut rx = [0u8; N];
        self.transfer_into(tx, &mut rx)?;
        Ok(rx)
    }

    /// Full-duplex transfer of a list of integers
    ///
    /// Every value must fit in a byte; the reply comes back as the same
    /// integer type.
    pub fn transfer_values<T>(&mut self, values: &[T]) -> Result<Vec<T>>
    where
        T: Copy + fmt::Display + TryInto<u8> + From<u8>,
    {
        let tx = values
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                value.try_into().map_err(|_| SpiError::InvalidDataByte {
                    index,
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<u8>>>()?;

        Ok(self.transfer(&tx)?.into_iter().map(T::from).collect())
    }

    /// Run several transfers as one message with chip select held
    pub fn message(&mut self, transfers: &mut [Transfer<'_>]) -> Result<()> {
        validate_message(transfers)?;
        let len: usize = transfers.iter().map(Transfer::len).sum();

        if let Some(max) = self.controller()?.max_message_size() {
            let (tx_len, rx_len) = message_size(transfers);
            if tx_len.max(rx_len) > max {
                return Err(SpiError::MessageTooLarge {
                    len: tx_len.max(rx_len),
                    max,
                });
            }
        }
        trace!(
            "spidev: Message of {} transfer(s), {} bytes on {}",
            transfers.len(),
            len,
            self.devpath
        );

        self.controller_mut()?
            .message(transfers)
            .map_err(|source| SpiError::TransferFailed { len, source })
    }

    // Lifecycle

    /// Release the device handle
    ///
    /// Closing an already closed device does nothing. The device counts as
    /// closed even if releasing the handle fails, so the release is never
    /// attempted twice.
    pub fn close(&mut self) -> Result<()> {
        let Some(controller) = self.controller.take() else {
            return Ok(());
        };

        debug!("spidev: Closing {}", self.devpath);
        controller.close().map_err(SpiError::CloseFailed)
    }

    /// Read every setting from the controller
    pub fn settings(&self) -> Result<SpiSettings> {
        let fd = self.controller()?.raw_fd();
        let mode_byte = self.read_mode_byte()?;

        Ok(SpiSettings {
            devpath: self.devpath.clone(),
            fd,
            mode: mode::mode_of(mode_byte),
            max_speed_hz: self.max_speed_hz()?,
            bit_order: mode::bit_order_of(mode_byte),
            bits_per_word: self.bits_per_word()?,
            extra_flags: mode::extra_flags_of(mode_byte),
        })
    }
}

fn check_readback(what: &str, requested: u32, actual: u32) {
    if requested != actual {
        warn!(
            "spidev: Requested {} {:#x} but device reports {:#x}",
            what, requested, actual
        );
    }
}

impl<C: SpiController> Drop for SpiDevice<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("spidev: {} while dropping {}", e, self.devpath);
        }
    }
}

impl<C: SpiController> fmt::Debug for SpiDevice<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiDevice")
            .field("devpath", &self.devpath)
            .field("fd", &self.fd())
            .finish()
    }
}

impl<C: SpiController> fmt::Display for SpiDevice<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.settings() {
            Ok(settings) => fmt::Display::fmt(&settings, f),
            Err(SpiError::Closed) => write!(f, "SPI (device={}, closed)", self.devpath),
            Err(e) => write!(f, "SPI (device={}, unavailable: {})", self.devpath, e),
        }
    }
}

/// Snapshot of every device setting, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiSettings {
    /// Device path
    pub devpath: String,
    /// File descriptor
    pub fd: RawFd,
    /// SPI mode (0-3)
    pub mode: u8,
    /// Max clock speed in Hz
    pub max_speed_hz: u32,
    /// Bit order
    pub bit_order: BitOrder,
    /// Bits per word
    pub bits_per_word: u8,
    /// Extra mode flags
    pub extra_flags: u8,
}

impl fmt::Display for SpiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SPI (device={}, fd={}, mode={}, max_speed_hz={}, bit_order={}, bits_per_word={}, extra_flags=0x{:02x})",
            self.devpath,
            self.fd,
            self.mode,
            self.max_speed_hz,
            self.bit_order,
            self.bits_per_word,
            self.extra_flags
        )
    }
}

/// Failure to open or configure a device
///
/// When the handle was opened but a configuration step failed, the
/// partially configured device is kept here instead of being closed.
pub struct OpenError<C: SpiController> {
    error: SpiError,
    device: Option<SpiDevice<C>>,
}

impl<C: SpiController> OpenError<C> {
    /// The step that failed
    pub fn error(&self) -> &SpiError {
        &self.error
    }

    /// The partially configured device, if the handle was opened
    pub fn device(&self) -> Option<&SpiDevice<C>> {
        self.device.as_ref()
    }

    /// Split into the error and the partially configured device
    pub fn into_parts(self) -> (SpiError, Option<SpiDevice<C>>) {
        (self.error, self.device)
    }
}

impl<C: SpiController> From<SpiError> for OpenError<C> {
    fn from(error: SpiError) -> Self {
        Self {
            error,
            device: None,
        }
    }
}

impl<C: SpiController> From<OpenError<C>> for SpiError {
    /// Drops (and so closes) any partially configured device
    fn from(e: OpenError<C>) -> Self {
        e.error
    }
}

impl<C: SpiController> fmt::Debug for OpenError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenError")
            .field("error", &self.error)
            .field("device", &self.device)
            .finish()
    }
}

impl<C: SpiController> fmt::Display for OpenError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<C: SpiController> std::error::Error for OpenError<C> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}
