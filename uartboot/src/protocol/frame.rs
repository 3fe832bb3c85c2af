//! Wire frame definitions and response encoding.
//!
//! Requests and responses share one frame format (all multi-byte
//! integers little-endian):
//!
//! ```text
//! +-------+--------+--------+----------------+--------+
//! | Start | Opcode | Length |    Payload     | CRC32  |
//! +-------+--------+--------+----------------+--------+
//! | 0xAA  | 1 byte | 2 bytes| length bytes   | 4 bytes|
//! +-------+--------+--------+----------------+--------+
//! ```
//!
//! The CRC32 covers start, opcode, length and payload. Acknowledgment
//! responses carry a single-byte payload holding an [`AckCode`].

use byteorder::{LittleEndian, WriteBytesExt};

use crate::protocol::crc::crc32_update;

/// Frame start marker.
pub const FRAME_START: u8 = 0xAA;

/// Maximum payload length in bytes.
pub const MAX_PAYLOAD: usize = 4096;

/// Command opcodes.
///
/// `None` is a sentinel used for protocol-level errors that cannot be
/// attributed to a specific command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Sentinel for unattributable protocol errors (0x00).
    None = 0x00,
    /// Query agent properties (0x10).
    Inquiry = 0x10,
    /// Boot the installed application (0x11).
    Boot = 0x11,
    /// Reset the device (0x1F).
    Reset = 0x1F,
    /// Erase a flash range (0x20).
    Erase = 0x20,
    /// Read back flash contents (0x21, reserved and unimplemented).
    Read = 0x21,
    /// Program a flash range (0x22).
    Write = 0x22,
    /// Checksum a flash range against a host-supplied CRC (0x23).
    Verify = 0x23,
}

impl Opcode {
    /// Decode a wire opcode byte. Unknown values return `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::None),
            0x10 => Some(Self::Inquiry),
            0x11 => Some(Self::Boot),
            0x1F => Some(Self::Reset),
            0x20 => Some(Self::Erase),
            0x21 => Some(Self::Read),
            0x22 => Some(Self::Write),
            0x23 => Some(Self::Verify),
            _ => None,
        }
    }
}

/// Wire-level acknowledgment codes.
///
/// These are protocol values shared with the host tool, not library
/// errors; every fallible command answers with exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AckCode {
    /// Command accepted.
    Ok = 0x00,
    /// Byte received in a state with no matching opcode.
    UnknownOpcode = 0x01,
    /// Declared length exceeds the payload bound.
    Overflow = 0x02,
    /// Reception timed out mid-frame.
    Timeout = 0x03,
    /// Structurally malformed frame.
    Format = 0x04,
    /// Checksum comparison failed.
    VerifyFailed = 0x05,
    /// Payload length or content does not match the command.
    BadParam = 0x06,
    /// Unspecified failure (protected-region rejection included).
    Unknown = 0xFF,
}

/// One complete protocol frame, as reconstructed by the assembler.
///
/// The opcode is kept as the raw wire byte: framing succeeds for any
/// opcode value, and the dispatcher decides what (if anything) to do
/// with unknown ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw opcode byte.
    pub opcode: u8,
    /// Opcode-specific payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Decode the opcode byte, if it names a known command.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }
}

/// CRC32 over the logical frame `[start, opcode, length, payload]`.
///
/// Used identically on the inbound verification path and the outbound
/// generation path.
pub fn frame_crc(opcode: u8, payload: &[u8]) -> u32 {
    #[allow(clippy::cast_possible_truncation)] // payload is bounded by MAX_PAYLOAD
    let length = payload.len() as u16;
    let mut crc = crc32_update(0, &[FRAME_START, opcode]);
    crc = crc32_update(crc, &length.to_le_bytes());
    crc32_update(crc, payload)
}

/// Encode a complete outbound frame.
///
/// The payload must fit the wire bound; response payloads are small
/// (at most a couple of bytes) so this is not reachable from command
/// handling.
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation)] // Vec writes cannot fail
pub fn encode(opcode: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= MAX_PAYLOAD, "payload exceeds wire bound");

    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.push(FRAME_START);
    buf.push(opcode);
    buf.write_u16::<LittleEndian>(payload.len() as u16).unwrap();
    buf.extend_from_slice(payload);
    buf.write_u32::<LittleEndian>(frame_crc(opcode, payload))
        .unwrap();
    buf
}

/// Encode a single-byte acknowledgment frame.
pub fn encode_ack(opcode: u8, code: AckCode) -> Vec<u8> {
    encode(opcode, &[code as u8])
}
