//! embedded-datalog - Sector Sessions
//!
//! Single-sector read and write sessions against an SPI-mode SD/MMC card,
//! with the bulk 512-byte payload moved by a pair of DMA channels instead
//! of per-byte CPU transfers. The command handshake, start-token exchange,
//! CRC placeholders and data-response validation all happen here.
//!
//! The card is assumed to already be in SPI mode; the initialization
//! handshake is the bring-up layer's job. At most one session can be open
//! at a time - a session mutably borrows the card driver for its whole
//! lifetime.

pub mod proto;
mod transport;

pub use transport::Transport;
use transport::retry;

use crate::dma::{Channel, Idle, Loaded, RxPeriph, TxPeriph, FILLER};
use crate::sector::{Sector, SectorDevice, SectorIdx};

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

#[cfg(feature = "log")]
use log::{debug, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, warn};

use proto::*;

/// Busy-poll budget before opening a session. A card that stays busy this
/// long across repeated opens is treated as a wiring fault by callers.
const OPEN_BUSY_BUDGET: u32 = 32_000;

/// Busy-poll budget after a write has been accepted. Deliberately small:
/// the card has committed the data, so exhaustion is reported but the
/// composite write treats it as non-fatal.
const CLOSE_BUSY_BUDGET: u32 = 10;

/// Poll budget while waiting for the read start token.
const START_TOKEN_BUDGET: u32 = 30_000;

/// Poll budget for the DMA transfer-complete condition.
const TRANSFER_BUDGET: u32 = 32_000;

/// The possible errors a sector session can generate.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// The SPI peripheral failed. Wiring-level, unrecoverable.
    Transport,
    /// The chip-select pin could not be driven.
    ChipSelect,
    /// The card stayed busy past the retry budget.
    CardBusyTimeout,
    /// The card answered a command with a non-zero R1 response.
    CommandRejected(R1),
    /// The data-response token signalled reject after a write payload.
    WriteRejected,
    /// An unexpected byte arrived where the read start token was due.
    ReadRejected(u8),
    /// A DMA channel was not available. Cannot happen through the public
    /// session API, which returns every channel before it yields control.
    BadState,
}

/// A single-sector card driver: the byte transport plus one DMA channel
/// per direction.
pub struct SdCard<SPI, CS, TX, RX>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TX: TxPeriph,
    RX: RxPeriph,
{
    transport: Transport<SPI, CS>,
    tx: Option<Channel<TX, Idle>>,
    rx: Option<Channel<RX, Idle>>,
}

impl<SPI, CS, TX, RX> SdCard<SPI, CS, TX, RX>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TX: TxPeriph,
    RX: RxPeriph,
{
    /// Build a driver from an SPI-mode card transport and a configured
    /// (but idle) DMA channel pair.
    pub fn new(transport: Transport<SPI, CS>, tx: Channel<TX, Idle>, rx: Channel<RX, Idle>) -> Self {
        SdCard {
            transport,
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    /// Deselect and fail. Used on every error path after the command was
    /// issued; a deselect failure on top of an existing error is dropped.
    fn fail<T>(&mut self, e: Error) -> Result<T, Error> {
        let _ = self.transport.deselect();
        Err(e)
    }

    /// Open a write session for one sector.
    ///
    /// Waits (bounded) for the card to release the bus, issues the
    /// single-block write command, then sends the data start token. No
    /// token is ever sent when the busy wait times out.
    pub fn open_write(&mut self, idx: SectorIdx) -> Result<WriteSession<'_, SPI, CS, TX, RX>, Error> {
        if !self.transport.wait_not_busy(OPEN_BUSY_BUDGET)? {
            return Err(Error::CardBusyTimeout);
        }

        match self.transport.send_command(WRITE_SINGLE_BLOCK, idx.byte_address()) {
            Ok(r1) if r1.accepted() => {}
            Ok(r1) => return self.fail(Error::CommandRejected(r1)),
            Err(e) => return self.fail(e),
        }

        // One clock byte to end the command transaction, then the token
        // that opens the data phase.
        if let Err(e) = self
            .transport
            .write_byte(FILL_BYTE)
            .and_then(|_| self.transport.write_byte(DATA_START_TOKEN))
        {
            return self.fail(e);
        }

        debug!("write session open, sector {}", idx.0);
        Ok(WriteSession {
            card: self,
            selected: true,
        })
    }

    /// Open a read session for one sector.
    ///
    /// Both DMA channels are loaded before the command goes out - inbound
    /// to receive, outbound with the all-ones filler so the master keeps
    /// generating clock edges - then the command is issued, one raw clock
    /// byte starts the card's response framing, and the start token is
    /// awaited.
    pub fn open_read(&mut self, idx: SectorIdx) -> Result<ReadSession<'_, SPI, CS, TX, RX>, Error> {
        let rx = match self.rx.take() {
            Some(ch) => ch,
            None => return Err(Error::BadState),
        };
        let tx = match self.tx.take() {
            Some(ch) => ch,
            None => {
                self.rx = Some(rx);
                return Err(Error::BadState);
            }
        };
        let rx = rx.arm();
        let tx = tx.load(&FILLER);

        match self.begin_read(idx) {
            Ok(()) => {
                debug!("read session open, sector {}", idx.0);
                Ok(ReadSession {
                    tx: Some(tx),
                    rx: Some(rx),
                    card: self,
                    selected: true,
                })
            }
            Err(e) => {
                self.tx = Some(tx.unload());
                self.rx = Some(rx.unload());
                let _ = self.transport.deselect();
                Err(e)
            }
        }
    }

    fn begin_read(&mut self, idx: SectorIdx) -> Result<(), Error> {
        if !self.transport.wait_not_busy(OPEN_BUSY_BUDGET)? {
            return Err(Error::CardBusyTimeout);
        }

        let r1 = self.transport.send_command(READ_SINGLE_BLOCK, idx.byte_address())?;
        if !r1.accepted() {
            return Err(Error::CommandRejected(r1));
        }

        // One raw clock byte begins the card's internal response framing.
        self.transport.write_byte(FILL_BYTE)?;

        let transport = &mut self.transport;
        let token = retry(START_TOKEN_BUDGET, || {
            let b = transport.read_byte()?;
            if b != FILL_BYTE {
                Ok(Some(b))
            } else {
                Ok(None)
            }
        })?;

        match token {
            Some(DATA_START_TOKEN) => Ok(()),
            Some(other) => Err(Error::ReadRejected(other)),
            None => Err(Error::CardBusyTimeout),
        }
    }

    /// Write one sector: open, transfer, close. A busy timeout on the
    /// close path is downgraded to success - the card has already
    /// accepted the payload by then - every other error propagates.
    pub fn write_sector(&mut self, idx: SectorIdx, data: &Sector) -> Result<(), Error> {
        let mut session = self.open_write(idx)?;
        session.transfer(data)?;
        match session.close() {
            Ok(()) => Ok(()),
            Err(Error::CardBusyTimeout) => {
                warn!("card busy after write close, sector {}; payload was accepted", idx.0);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Read one sector: open, transfer, close.
    pub fn read_sector(&mut self, idx: SectorIdx, dest: &mut Sector) -> Result<(), Error> {
        let mut session = self.open_read(idx)?;
        session.transfer(dest)?;
        session.close()
    }

    /// Release the transport and channels.
    pub fn free(self) -> (Transport<SPI, CS>, Option<Channel<TX, Idle>>, Option<Channel<RX, Idle>>) {
        (self.transport, self.tx, self.rx)
    }
}

impl<SPI, CS, TX, RX> SectorDevice for SdCard<SPI, CS, TX, RX>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TX: TxPeriph,
    RX: RxPeriph,
{
    type Error = Error;

    fn read_sector(&mut self, idx: SectorIdx, dest: &mut Sector) -> Result<(), Self::Error> {
        SdCard::read_sector(self, idx, dest)
    }

    fn write_sector(&mut self, idx: SectorIdx, src: &Sector) -> Result<(), Self::Error> {
        SdCard::write_sector(self, idx, src)
    }
}

/// An open single-sector write session. Chip select stays asserted until
/// [`close`](WriteSession::close); dropping an unclosed session deasserts
/// it without completing the handshake.
pub struct WriteSession<'a, SPI, CS, TX, RX>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TX: TxPeriph,
    RX: RxPeriph,
{
    card: &'a mut SdCard<SPI, CS, TX, RX>,
    selected: bool,
}

impl<'a, SPI, CS, TX, RX> WriteSession<'a, SPI, CS, TX, RX>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TX: TxPeriph,
    RX: RxPeriph,
{
    /// Move the 512 payload bytes out through the outbound DMA channel.
    /// Payload only - the CRC placeholders belong to the close step.
    pub fn transfer(&mut self, data: &Sector) -> Result<(), Error> {
        let channel = match self.card.tx.take() {
            Some(ch) => ch,
            None => return Err(Error::BadState),
        };

        let running = channel.load(&data.contents).enable();
        let complete = retry(TRANSFER_BUDGET, || {
            if running.is_complete() {
                Ok::<_, Error>(Some(()))
            } else {
                Ok(None)
            }
        })?;
        self.card.tx = Some(running.disable());

        match complete {
            Some(()) => Ok(()),
            None => Err(Error::CardBusyTimeout),
        }
    }

    /// Finish the handshake: CRC placeholders, data-response validation,
    /// trailing clock bytes, deselect, then a short bounded wait for the
    /// card to finish programming. A `CardBusyTimeout` from that final
    /// wait means the payload was accepted but the card is still busy;
    /// callers may treat it as non-fatal.
    pub fn close(mut self) -> Result<(), Error> {
        // Two placeholder CRC bytes; the card was told to ignore them.
        self.card.transport.write_byte(CRC_PLACEHOLDER)?;
        self.card.transport.write_byte(CRC_PLACEHOLDER)?;

        let token = self.card.transport.read_byte()?;
        if (token & DATA_RESPONSE_MASK) != DATA_RESPONSE_ACCEPTED {
            let _ = self.card.transport.write_byte(FILL_BYTE);
            let _ = self.card.transport.write_byte(FILL_BYTE);
            return Err(Error::WriteRejected);
        }

        // Two trailing clock bytes before releasing the card.
        self.card.transport.write_byte(FILL_BYTE)?;
        self.card.transport.write_byte(FILL_BYTE)?;
        self.card.transport.deselect()?;
        self.selected = false;

        if self.card.transport.wait_not_busy(CLOSE_BUSY_BUDGET)? {
            Ok(())
        } else {
            Err(Error::CardBusyTimeout)
        }
    }
}

impl<'a, SPI, CS, TX, RX> Drop for WriteSession<'a, SPI, CS, TX, RX>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TX: TxPeriph,
    RX: RxPeriph,
{
    fn drop(&mut self) {
        if self.selected {
            let _ = self.card.transport.deselect();
        }
    }
}

/// An open single-sector read session. Holds both loaded channels until
/// the transfer runs; dropping an unclosed session unloads them and
/// deasserts chip select.
pub struct ReadSession<'a, SPI, CS, TX, RX>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TX: TxPeriph,
    RX: RxPeriph,
{
    card: &'a mut SdCard<SPI, CS, TX, RX>,
    tx: Option<Channel<TX, Loaded>>,
    rx: Option<Channel<RX, Loaded>>,
    selected: bool,
}

impl<'a, SPI, CS, TX, RX> ReadSession<'a, SPI, CS, TX, RX>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TX: TxPeriph,
    RX: RxPeriph,
{
    /// Run both channels - inbound receives the sector, outbound clocks
    /// the filler - until the inbound transfer count is reached, then
    /// copy the received sector into `dest`.
    pub fn transfer(&mut self, dest: &mut Sector) -> Result<(), Error> {
        let (rx, tx) = match (self.rx.take(), self.tx.take()) {
            (Some(rx), Some(tx)) => (rx, tx),
            _ => return Err(Error::BadState),
        };

        let rx = rx.enable();
        let tx = tx.enable();
        let complete = retry(TRANSFER_BUDGET, || {
            if rx.is_complete() {
                Ok::<_, Error>(Some(()))
            } else {
                Ok(None)
            }
        })?;
        self.card.tx = Some(tx.disable());
        let mut rx = rx.disable();
        rx.take(&mut dest.contents);
        self.card.rx = Some(rx);

        match complete {
            Some(()) => Ok(()),
            None => Err(Error::CardBusyTimeout),
        }
    }

    /// Discard the two CRC bytes the card appends and release the bus.
    pub fn close(mut self) -> Result<(), Error> {
        let _ = self.card.transport.read_byte()?;
        let _ = self.card.transport.read_byte()?;
        self.card.transport.deselect()?;
        self.selected = false;
        Ok(())
    }
}

impl<'a, SPI, CS, TX, RX> Drop for ReadSession<'a, SPI, CS, TX, RX>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TX: TxPeriph,
    RX: RxPeriph,
{
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.card.tx = Some(tx.unload());
        }
        if let Some(rx) = self.rx.take() {
            self.card.rx = Some(rx.unload());
        }
        if self.selected {
            let _ = self.card.transport.deselect();
        }
    }
}
