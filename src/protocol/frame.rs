//! 8-byte command and acknowledgement frames.
//!
//! ```text
//!   0     1     2     3        4     5     6     7
//! +-----+-----+-----+--------+-----+-----+-----+----------+
//! | A5  | 5A  | A5  | opcode | arg0| arg1| arg2| checksum |
//! +-----+-----+-----+--------+-----+-----+-----+----------+
//! ```
//!
//! The checksum is the sum of bytes 2 to 6 (inclusive), modulo 256.

use crate::error::ProtocolError;

pub const FRAME_SIZE: usize = 8;

const SYNC: [u8; 3] = [0xA5, 0x5A, 0xA5];

/// Bootloader opcodes.
pub mod opcode {
    pub const RD_SW_VERSION: u8 = 0x4B;
    pub const RD_FLASH_PAGE: u8 = 0x69;
    pub const WR_FLASH_PAGE: u8 = 0x6A;
    pub const WR_FLASH_BYTE: u8 = 0x6C;
    pub const RD_PRG_AREA: u8 = 0x6D;
    pub const WR_PRG_AREA: u8 = 0x6E;
    pub const WR_BIST: u8 = 0x71;

    /// Acknowledgement of the software version request.
    pub const ANSW_SW_VERSION: u8 = 0x8C;
    /// Generic acknowledgement of page, byte, program and BIST commands.
    pub const ANSW_INF_OK: u8 = 0x58;
}

pub type Frame = [u8; FRAME_SIZE];

pub fn checksum(frame: &Frame) -> u8 {
    frame[2..7].iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

pub fn build_command(opcode: u8, arg0: u8, arg1: u8, arg2: u8) -> Frame {
    let mut frame = [SYNC[0], SYNC[1], SYNC[2], opcode, arg0, arg1, arg2, 0];
    frame[7] = checksum(&frame);
    frame
}

/// Check an acknowledgement frame. The checksum is looked at first so that a
/// corrupted frame is reported as such rather than as a wrong answer.
pub fn validate_response(frame: &Frame, expected_ack: u8) -> Result<(), ProtocolError> {
    let computed = checksum(frame);
    if frame[7] != computed {
        return Err(ProtocolError::ChecksumMismatch {
            received: frame[7],
            computed,
        });
    }
    if frame[..3] != SYNC || frame[3] != expected_ack {
        return Err(ProtocolError::UnexpectedResponse {
            expected_ack,
            received: *frame,
        });
    }
    Ok(())
}
