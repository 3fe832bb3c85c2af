//! Command parameter records and their wire decoders.
//!
//! Each record is decoded from the frame payload with explicit
//! little-endian reads, validating the exact declared length first, so
//! the wire format is the single source of truth rather than any
//! in-memory struct layout. A decoder returning `None` means the
//! payload does not match the command and the dispatcher must answer
//! `BAD_PARAM` before touching hardware.

use byteorder::{LittleEndian, ReadBytesExt};

/// Inquiry subcode: report agent version as `{major, minor}`.
pub const INQUIRY_VERSION: u8 = 0x00;

/// Inquiry subcode: report the maximum payload size as LE u16.
pub const INQUIRY_BLOCK_SIZE: u8 = 0x01;

/// INQUIRY payload: a single subcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InquiryParam {
    /// Property selector.
    pub subcode: u8,
}

impl InquiryParam {
    /// Exact payload length for this command.
    pub const WIRE_SIZE: usize = 1;

    /// Decode from a frame payload.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() != Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            subcode: payload[0],
        })
    }
}

/// ERASE payload: the half-open byte range `[address, address + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseParam {
    /// First byte of the range.
    pub address: u32,
    /// Range length in bytes.
    pub size: u32,
}

impl EraseParam {
    /// Exact payload length for this command.
    pub const WIRE_SIZE: usize = 8;

    /// Decode from a frame payload.
    #[allow(clippy::unwrap_used)] // length is checked before the reads
    pub fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() != Self::WIRE_SIZE {
            return None;
        }
        let mut cursor = payload;
        Some(Self {
            address: cursor.read_u32::<LittleEndian>().unwrap(),
            size: cursor.read_u32::<LittleEndian>().unwrap(),
        })
    }
}

/// WRITE payload: a fixed header followed by `size` data bytes.
///
/// The declared frame length must equal `header + size`; a mismatch
/// between the two length sources is a malformed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteParam<'a> {
    /// First byte to program.
    pub address: u32,
    /// Number of data bytes; the caller contract requires a multiple
    /// of the 4-byte programming word.
    pub size: u32,
    /// Data to program, exactly `size` bytes.
    pub data: &'a [u8],
}

impl<'a> WriteParam<'a> {
    /// Fixed header length preceding the data bytes.
    pub const HEADER_SIZE: usize = 8;

    /// Decode from a frame payload.
    #[allow(clippy::unwrap_used)] // length is checked before the reads
    pub fn decode(payload: &'a [u8]) -> Option<Self> {
        if payload.len() < Self::HEADER_SIZE {
            return None;
        }
        let mut cursor = payload;
        let address = cursor.read_u32::<LittleEndian>().unwrap();
        let size = cursor.read_u32::<LittleEndian>().unwrap();
        if payload.len() != Self::HEADER_SIZE + size as usize {
            return None;
        }
        Some(Self {
            address,
            size,
            data: &payload[Self::HEADER_SIZE..],
        })
    }
}

/// VERIFY payload: a byte range and the CRC32 it is expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyParam {
    /// First byte of the range.
    pub address: u32,
    /// Range length in bytes.
    pub size: u32,
    /// Host-computed CRC32 of the range.
    pub crc: u32,
}

impl VerifyParam {
    /// Exact payload length for this command.
    pub const WIRE_SIZE: usize = 12;

    /// Decode from a frame payload.
    #[allow(clippy::unwrap_used)] // length is checked before the reads
    pub fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() != Self::WIRE_SIZE {
            return None;
        }
        let mut cursor = payload;
        Some(Self {
            address: cursor.read_u32::<LittleEndian>().unwrap(),
            size: cursor.read_u32::<LittleEndian>().unwrap(),
            crc: cursor.read_u32::<LittleEndian>().unwrap(),
        })
    }
}
