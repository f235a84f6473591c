//! embedded-datalog - Volume contract
//!
//! The mount/format/file surface the log writer needs from a FAT-like
//! volume layer. That layer is an external collaborator sitting on a
//! [`SectorDevice`](crate::sector::SectorDevice); this crate only defines
//! the contract and the mount error taxonomy it must speak.

/// Why a mount attempt failed. `NoFormat` and `NoPartition` are expected
/// first-run states for a blank card, not faults.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MountError {
    /// No media present in the slot.
    NoMedia,
    /// Media present but carries no recognisable filesystem.
    NoFormat,
    /// No partition available on the media.
    NoPartition,
    /// A partition exists but its type is not supported.
    UnsupportedPartition,
    /// The media could not be accessed.
    HardwareError,
    /// Anything the volume layer could not classify.
    Unknown,
}

impl MountError {
    /// Human-readable text for the console.
    pub fn as_str(self) -> &'static str {
        match self {
            MountError::NoMedia => "Disk not present",
            MountError::NoFormat => "Disk not formatted",
            MountError::NoPartition => "No partition available on disk",
            MountError::UnsupportedPartition => "Partition not supported",
            MountError::HardwareError => "Disk access error",
            MountError::Unknown => "Unknown system error",
        }
    }

    /// True for the blank-card states a `format` command can repair.
    pub fn formattable(self) -> bool {
        matches!(self, MountError::NoFormat | MountError::NoPartition)
    }
}

/// Filesystem flavour to lay down when formatting.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FormatKind {
    Fat,
    Fat32,
}

/// A mounted (or mountable) volume with exactly one open file at a time.
///
/// `open_append` must create the entry when it does not exist; `create`
/// must truncate an existing entry. Write position is managed by the
/// volume layer - this crate only ever appends.
pub trait Volume {
    /// The volume layer's own file operation errors.
    type Error: core::fmt::Debug;

    /// Mount the filesystem found in the given media slot.
    fn mount(&mut self, slot: u8) -> Result<(), MountError>;

    /// Reformat the entire volume. Destructive. Returns `false` when the
    /// media refused the format.
    fn format(&mut self, kind: FormatKind) -> bool;

    /// Create the named entry, truncating any existing content.
    fn create(&mut self, name: &str) -> Result<(), Self::Error>;

    /// Open the named entry for appending, creating it when absent.
    fn open_append(&mut self, name: &str) -> Result<(), Self::Error>;

    /// Append bytes to the open entry.
    fn append(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Close the open entry. Idempotent.
    fn close(&mut self);
}
