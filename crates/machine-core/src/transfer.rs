//! Transfer segments
//!
//! A [`Transfer`] describes one entry of an SPI message: the buffers to
//! shift out and in plus optional per-transfer overrides. Backends turn each
//! segment into one kernel transfer descriptor.

use crate::error::{Result, SpiError};

/// Maximum number of transfers in one message
///
/// The ioctl request encodes the descriptor array size in 14 bits and each
/// descriptor is 32 bytes.
pub const MAX_TRANSFERS: usize = (1 << 14) / 32 - 1;

/// One segment of an SPI message
#[derive(Debug)]
pub struct Transfer<'a> {
    /// Data to shift out, or `None` to shift out zeros
    pub tx: Option<&'a [u8]>,
    /// Buffer for shifted-in data, or `None` to discard it
    pub rx: Option<&'a mut [u8]>,
    /// Clock speed override in Hz (0 = device setting)
    pub speed_hz: u32,
    /// Delay after this transfer before the next one or chip select change
    pub delay_usecs: u16,
    /// Word size override (0 = device setting)
    pub bits_per_word: u8,
    /// Deselect the device between this transfer and the next
    pub cs_change: bool,
    /// Transmit bus width (0 = single)
    pub tx_nbits: u8,
    /// Receive bus width (0 = single)
    pub rx_nbits: u8,
    /// Delay between words in microseconds
    pub word_delay_usecs: u8,
}

impl<'a> Transfer<'a> {
    fn with_buffers(tx: Option<&'a [u8]>, rx: Option<&'a mut [u8]>) -> Self {
        Self {
            tx,
            rx,
            speed_hz: 0,
            delay_usecs: 0,
            bits_per_word: 0,
            cs_change: false,
            tx_nbits: 0,
            rx_nbits: 0,
            word_delay_usecs: 0,
        }
    }

    /// Shift out `tx` while shifting into `rx`
    ///
    /// Both buffers must have the same length.
    pub fn full_duplex(tx: &'a [u8], rx: &'a mut [u8]) -> Result<Self> {
        if tx.len() != rx.len() {
            return Err(SpiError::LengthMismatch {
                tx: tx.len(),
                rx: rx.len(),
            });
        }
        Ok(Self::with_buffers(Some(tx), Some(rx)))
    }

    /// Shift out `tx`, discarding received data
    pub fn write(tx: &'a [u8]) -> Self {
        Self::with_buffers(Some(tx), None)
    }

    /// Shift in `rx.len()` bytes while shifting out zeros
    pub fn read(rx: &'a mut [u8]) -> Self {
        Self::with_buffers(None, Some(rx))
    }

    /// Override the clock speed for this transfer
    pub fn speed_hz(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }

    /// Delay after this transfer
    pub fn delay_usecs(mut self, delay_usecs: u16) -> Self {
        self.delay_usecs = delay_usecs;
        self
    }

    /// Override the word size for this transfer
    pub fn bits_per_word(mut self, bits_per_word: u8) -> Self {
        self.bits_per_word = bits_per_word;
        self
    }

    /// Toggle chip select after this transfer
    pub fn cs_change(mut self, cs_change: bool) -> Self {
        self.cs_change = cs_change;
        self
    }

    /// Set the transmit and receive bus widths (1, 2 or 4 lines)
    pub fn nbits(mut self, tx_nbits: u8, rx_nbits: u8) -> Self {
        self.tx_nbits = tx_nbits;
        self.rx_nbits = rx_nbits;
        self
    }

    /// Delay between words
    pub fn word_delay_usecs(mut self, word_delay_usecs: u8) -> Self {
        self.word_delay_usecs = word_delay_usecs;
        self
    }

    /// Number of bytes clocked by this transfer
    pub fn len(&self) -> usize {
        match (&self.tx, &self.rx) {
            (Some(tx), _) => tx.len(),
            (None, Some(rx)) => rx.len(),
            (None, None) => 0,
        }
    }

    /// Returns true if the transfer clocks no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check buffer lengths against the descriptor's limits
    pub fn validate(&self) -> Result<()> {
        if let (Some(tx), Some(rx)) = (&self.tx, &self.rx) {
            if tx.len() != rx.len() {
                return Err(SpiError::LengthMismatch {
                    tx: tx.len(),
                    rx: rx.len(),
                });
            }
        }
        if u32::try_from(self.len()).is_err() {
            return Err(SpiError::TransferTooLong(self.len()));
        }
        Ok(())
    }
}

/// Check a whole message before it is handed to a backend
pub fn validate_message(transfers: &[Transfer<'_>]) -> Result<()> {
    if transfers.is_empty() {
        return Err(SpiError::EmptyMessage);
    }
    if transfers.len() > MAX_TRANSFERS {
        return Err(SpiError::TooManySegments {
            count: transfers.len(),
            max: MAX_TRANSFERS,
        });
    }
    transfers.iter().try_for_each(Transfer::validate)
}

/// Bytes a message shifts out and in, counting only segments that have the
/// respective buffer
pub fn message_size(transfers: &[Transfer<'_>]) -> (usize, usize) {
    transfers.iter().fold((0, 0), |(tx, rx), t| {
        (
            tx + t.tx.map_or(0, <[u8]>::len),
            rx + t.rx.as_deref().map_or(0, <[u8]>::len),
        )
    })
}
