//! embedded-datalog - Append Log
//!
//! One open log file on the mounted volume. Records are formatted here
//! and handed straight to the volume layer; nothing is buffered, so a
//! record is never more than one sector flush away from the media.

use core::fmt::Write;

use crate::volume::{FormatKind, MountError, Volume};

#[cfg(feature = "log")]
use log::{debug, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, warn};

/// Longest accepted logfile name. Longer names are silently truncated.
pub const MAX_FILENAME_LEN: usize = 40;

/// A bounded logfile name.
pub type FileName = heapless::String<MAX_FILENAME_LEN>;

/// Append Log failures. All are reportable, none are fatal.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogError {
    /// `write_record` with no open file.
    NotOpen,
    /// `start` with no file selected.
    NoActiveFile,
    /// The volume layer refused to open the active file.
    OpenFailed,
    /// The volume layer refused to create the named entry.
    CreateFailed,
    /// A record could not be appended.
    WriteFailed,
    /// `start` or `format` while the file is already open.
    AlreadyOpen,
    /// The media refused the reformat.
    FormatFailed,
    /// Remounting after a format failed.
    Mount(MountError),
}

/// The append-only log writer: at most one open file at any time.
pub struct AppendLog<V>
where
    V: Volume,
{
    volume: V,
    slot: u8,
    active: Option<FileName>,
    open: bool,
}

impl<V> AppendLog<V>
where
    V: Volume,
{
    pub fn new(volume: V) -> Self {
        AppendLog {
            volume,
            slot: 0,
            active: None,
            open: false,
        }
    }

    /// Mount the volume found in `slot`. Expected to fail with `NoFormat`
    /// or `NoPartition` on a blank card; `format` repairs that.
    pub fn init(&mut self, slot: u8) -> Result<(), MountError> {
        self.slot = slot;
        self.volume.mount(slot)
    }

    /// Select (and truncate/create) the log target. Does not open it.
    pub fn select_file(&mut self, name: &str) -> Result<(), LogError> {
        let mut bounded = FileName::new();
        for ch in name.chars() {
            if bounded.push(ch).is_err() {
                break;
            }
        }

        if self.volume.create(bounded.as_str()).is_err() {
            warn!("could not create log target {}", bounded.as_str());
            self.active = Some(bounded);
            return Err(LogError::CreateFailed);
        }
        debug!("log target: {}", bounded.as_str());
        self.active = Some(bounded);
        Ok(())
    }

    /// Open the active target in append mode.
    pub fn start(&mut self) -> Result<(), LogError> {
        if self.open {
            return Err(LogError::AlreadyOpen);
        }
        let name = match &self.active {
            Some(name) => name,
            None => return Err(LogError::NoActiveFile),
        };
        match self.volume.open_append(name.as_str()) {
            Ok(()) => {
                self.open = true;
                Ok(())
            }
            Err(_e) => {
                warn!("could not open logfile");
                Err(LogError::OpenFailed)
            }
        }
    }

    /// Append one sample record: `"<cycle_count>, <value>\r\n"`.
    pub fn write_record(&mut self, cycle_count: u32, value: u16) -> Result<(), LogError> {
        if !self.open {
            return Err(LogError::NotOpen);
        }

        // Worst case is 10 + 2 + 5 + 2 bytes; the buffer cannot overflow.
        let mut record: heapless::String<24> = heapless::String::new();
        write!(record, "{}, {}\r\n", cycle_count, value).map_err(|_| LogError::WriteFailed)?;

        self.volume
            .append(record.as_bytes())
            .map_err(|_| LogError::WriteFailed)
    }

    /// Close the logfile. Idempotent.
    pub fn stop(&mut self) {
        self.volume.close();
        self.open = false;
    }

    /// Reformat the whole volume (destructive) and remount it. Refused
    /// while the logfile is open.
    pub fn format(&mut self, kind: FormatKind) -> Result<(), LogError> {
        if self.open {
            return Err(LogError::AlreadyOpen);
        }
        if !self.volume.format(kind) {
            return Err(LogError::FormatFailed);
        }
        self.volume.mount(self.slot).map_err(LogError::Mount)
    }

    /// Whether the logfile is currently open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The selected log target, if any.
    pub fn active_file(&self) -> Option<&str> {
        self.active.as_ref().map(|name| name.as_str())
    }
}
