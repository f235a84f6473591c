//! embedded-datalog - Card wire protocol constants
//!
//! Single-block command codes, data tokens and the R1 response bits used
//! by the transport and session layers. CRC is carried on the wire as
//! placeholder bytes but never computed nor checked in this engine.

/// Single-block read command (CMD17).
pub const READ_SINGLE_BLOCK: u8 = 17;

/// Single-block write command (CMD24).
pub const WRITE_SINGLE_BLOCK: u8 = 24;

/// Token preceding a single-block write payload.
pub const DATA_START_TOKEN: u8 = 0xFE;

/// Low-nibble mask of the data-response token returned after a write.
pub const DATA_RESPONSE_MASK: u8 = 0x1F;

/// Data-response low nibble when the card accepted the payload.
pub const DATA_RESPONSE_ACCEPTED: u8 = 0x05;

/// Idle bus level; also the byte clocked out to read or to feed clock
/// edges while receiving.
pub const FILL_BYTE: u8 = 0xFF;

/// Placeholder sent in both CRC slots of a write payload.
pub const CRC_PLACEHOLDER: u8 = 0xFF;

bitflags::bitflags! {
    /// The card's R1 command response. All-zero means the command was
    /// accepted; bit 7 is always clear in a valid response.
    #[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
    pub struct R1: u8 {
        const IN_IDLE_STATE      = 0x01;
        const ERASE_RESET        = 0x02;
        const ILLEGAL_COMMAND    = 0x04;
        const COM_CRC_ERROR      = 0x08;
        const ERASE_SEQ_ERROR    = 0x10;
        const ADDRESS_ERROR      = 0x20;
        const PARAMETER_ERROR    = 0x40;
    }
}

impl R1 {
    /// True for the all-clear response byte.
    pub fn accepted(self) -> bool {
        self.is_empty()
    }
}
