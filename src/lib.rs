//! # embedded-datalog
//!
//! > A DMA-driven SD/MMC data logger written in Embedded Rust
//!
//! This crate implements the block-storage protocol engine for an SPI-mode
//! SD/MMC card - single-sector read/write sessions whose 512-byte payload
//! is moved by a pair of DMA channels - and the acquisition/logging
//! application built on top of it: a timer-raised sample flag drained by
//! the foreground loop into an append-only CSV logfile, arbitrated by a
//! small line-oriented command console (`start`, `stop`, `status`,
//! `format`, `file <name>`, `help`).
//!
//! It is `#![no_std]`, does not use `alloc`, and is written for
//! readability first. The hardware seams are traits: SPI and chip select
//! come from `embedded-hal`, the two DMA channel engines implement
//! [`dma::TxPeriph`] / [`dma::RxPeriph`], and the FAT-like volume layer
//! behind the log writer implements [`volume::Volume`] on top of a
//! [`sector::SectorDevice`]. Card initialization (the CMD0/ACMD41
//! handshake) is the bring-up layer's job; the engine assumes a card
//! already in SPI mode.
//!
//! ## Using the crate
//!
//! ```rust,ignore
//! # use embedded_datalog::*;
//! static TICK: acquisition::SampleFlag = acquisition::SampleFlag::new();
//!
//! // In the timer interrupt: nothing but the flag.
//! fn on_timer_tick() {
//!     TICK.raise();
//! }
//!
//! let transport = card::Transport::new(spi, cs);
//! let sd = card::SdCard::new(transport, dma::Channel::new(tx), dma::Channel::new(rx));
//! let volume = my_fat_layer::Volume::new(sd);
//!
//! let sampler = acquisition::Sampler::new(&TICK, adc, cycle_counter);
//! let mut logger = logger::Logger::new(applog::AppendLog::new(volume), sampler);
//! logger.init(0, "logfile.csv", &mut uart)?;
//!
//! loop {
//!     logger.poll(&mut uart)?;
//!     if let Some(ch) = uart_rx.read() {
//!         logger.handle_char(ch, &mut uart)?;
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! * `defmt-log`: By turning off the default features and enabling the
//! `defmt-log` feature you can configure this crate to log messages over
//! defmt instead.
//!
//! Make sure that either the `log` feature or the `defmt-log` feature is
//! enabled.

#![cfg_attr(not(test), no_std)]

// ****************************************************************************
//
// Imports
//
// ****************************************************************************


pub mod acquisition;
pub mod applog;
pub mod card;
pub mod console;
pub mod dma;
pub mod logger;
pub mod sector;
pub mod volume;

pub use crate::applog::AppendLog;
pub use crate::card::Error as CardError;
pub use crate::card::SdCard;
pub use crate::logger::{Logger, Mode};
pub use crate::sector::{MemorySectorDevice, Sector, SectorCount, SectorDevice, SectorIdx};

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
