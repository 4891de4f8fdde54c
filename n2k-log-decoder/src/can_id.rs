//! Decomposition of the 29-bit CAN identifiers used by NMEA 2000
//! (derived from ISO 11783 / SAE J1939).
//!
//! Layout, most significant bit first:
//!
//! ```text
//! | 28..26   | 25 | 24 | 23..16 | 15..8 | 7..0   |
//! | priority | R  | DP | PF     | PS    | source |
//! ```
//!
//! When PF < 240 the message is addressed (PDU1) and PS carries the
//! destination; otherwise it is a broadcast (PDU2) and PS is part of the PGN.

use crate::types::{DecoderError, Result, BROADCAST_ADDRESS};

/// Largest value an extended CAN identifier can take
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// First PDU format value of the broadcast (PDU2) range
const PDU2_THRESHOLD: u8 = 240;

/// An extended (29-bit) CAN identifier with NMEA 2000 accessors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CanId(u32);

impl CanId {
    /// Wrap a raw identifier, rejecting values wider than 29 bits
    pub fn new(raw: u32) -> Result<Self> {
        if raw > MAX_EXTENDED_ID {
            return Err(DecoderError::malformed(format!(
                "CAN identifier 0x{:X} exceeds 29 bits",
                raw
            )));
        }
        Ok(Self(raw))
    }

    /// Raw identifier value
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Priority (3 bits, 0-7)
    pub fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    fn pdu_format(&self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    fn pdu_specific(&self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// True for addressed (PDU1) messages
    pub fn is_addressed(&self) -> bool {
        self.pdu_format() < PDU2_THRESHOLD
    }

    /// Parameter group number, handling the PDU1/PDU2 distinction
    pub fn pgn(&self) -> u32 {
        let r_dp = (self.0 >> 24) & 0x03;
        let pf = self.pdu_format() as u32;

        if self.is_addressed() {
            (r_dp << 16) | (pf << 8)
        } else {
            (r_dp << 16) | (pf << 8) | self.pdu_specific() as u32
        }
    }

    /// Destination address; broadcast messages report 255
    pub fn destination(&self) -> u8 {
        if self.is_addressed() {
            self.pdu_specific()
        } else {
            BROADCAST_ADDRESS
        }
    }

    /// Source address
    pub fn source_address(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}
