//! embedded-datalog - Block Transport
//!
//! Byte-level half-duplex access to the card: chip-select bracketing,
//! command/response framing and bounded busy-wait polling. Everything here
//! runs in the foreground loop; the busy-waits can take milliseconds and
//! must never be entered from an interrupt context.

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

#[cfg(feature = "log")]
use log::trace;

#[cfg(feature = "defmt-log")]
use defmt::trace;

use super::proto::*;
use super::Error;

/// How many response polls a command gets before we give up on the card.
const RESPONSE_BUDGET: u32 = 512;

/// Spin the CPU briefly between poll attempts.
fn spin() {
    let dummy_var: u32 = 0;
    for _ in 0..100 {
        unsafe { core::ptr::read_volatile(&dummy_var) };
    }
}

/// Bounded busy-poll. Runs `op` until it yields a value or the retry
/// budget is exhausted, spinning briefly between attempts. `Ok(None)`
/// means the budget ran out; the call site decides how severe that is.
pub(crate) fn retry<T, E, F>(budget: u32, mut op: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Result<Option<T>, E>,
{
    for _ in 0..budget {
        if let Some(value) = op()? {
            return Ok(Some(value));
        }
        spin();
    }
    Ok(None)
}

/// The serial transport to the card: an SPI peripheral plus a dedicated
/// chip-select line. Only one exchange may be in flight at a time; the
/// `&mut` receiver on every method keeps that true by construction.
pub struct Transport<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> Transport<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Transport { spi, cs }
    }

    /// Release the underlying peripherals.
    pub fn free(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Assert chip select.
    pub fn select(&mut self) -> Result<(), Error> {
        self.cs.set_low().map_err(|_| Error::ChipSelect)
    }

    /// Deassert chip select.
    pub fn deselect(&mut self) -> Result<(), Error> {
        self.cs.set_high().map_err(|_| Error::ChipSelect)
    }

    /// Send one byte and receive one byte.
    fn transfer_byte(&mut self, out: u8) -> Result<u8, Error> {
        self.spi
            .transfer(&mut [out])
            .map(|b| b[0])
            .map_err(|_e| Error::Transport)
    }

    /// Clock one byte out to the card.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error> {
        let _ = self.transfer_byte(byte)?;
        Ok(())
    }

    /// Clock one byte in from the card by sending the fill byte.
    pub fn read_byte(&mut self) -> Result<u8, Error> {
        self.transfer_byte(FILL_BYTE)
    }

    /// Issue a command: assert select, clock out the opcode, a big-endian
    /// 32-bit argument and a placeholder CRC byte, then poll for the R1
    /// response (bit 7 clear). Selection is left asserted on success so
    /// the data phase can follow; on error the caller must deselect.
    pub fn send_command(&mut self, command: u8, arg: u32) -> Result<R1, Error> {
        self.select()?;

        let frame = [
            0x40 | command,
            (arg >> 24) as u8,
            (arg >> 16) as u8,
            (arg >> 8) as u8,
            arg as u8,
            CRC_PLACEHOLDER,
        ];
        for b in frame.iter() {
            self.write_byte(*b)?;
        }

        let response = retry(RESPONSE_BUDGET, || {
            let b = self.read_byte()?;
            if (b & 0x80) == 0 {
                Ok(Some(b))
            } else {
                Ok(None)
            }
        })?;

        match response {
            Some(b) => {
                trace!("CMD{} arg {:x} -> {:x}", command, arg, b);
                Ok(R1::from_bits_truncate(b))
            }
            None => Err(Error::CardBusyTimeout),
        }
    }

    /// Poll until the card releases the bus (reads back 0xFF), up to
    /// `budget` attempts. Brackets its own chip select, so it can be used
    /// outside an open session. `Ok(false)` means the card is still busy.
    pub fn wait_not_busy(&mut self, budget: u32) -> Result<bool, Error> {
        self.select()?;
        let released = self.poll_released(budget);
        self.deselect()?;
        released
    }

    fn poll_released(&mut self, budget: u32) -> Result<bool, Error> {
        let released = retry(budget, || {
            if self.read_byte()? == FILL_BYTE {
                Ok(Some(()))
            } else {
                Ok(None)
            }
        })?;
        Ok(released.is_some())
    }
}
