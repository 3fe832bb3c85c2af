//! Wire protocol: framing, checksums, command parameters.
//!
//! One frame format is shared by requests and responses:
//!
//! ```text
//! +-------+--------+--------+----------------+--------+
//! | Start | Opcode | Length |    Payload     | CRC32  |
//! +-------+--------+--------+----------------+--------+
//! | 0xAA  | 1 byte | 2 bytes| 0..=4096 bytes | 4 bytes|
//! +-------+--------+--------+----------------+--------+
//! ```
//!
//! [`assembler`] reconstructs inbound frames byte by byte, [`frame`]
//! encodes outbound ones, and [`command`] decodes per-opcode payloads.

pub mod assembler;
pub mod command;
pub mod crc;
pub mod frame;

// Re-export common types
pub use assembler::{Assembler, Step};
pub use crc::crc32_update;
pub use frame::{AckCode, FRAME_START, Frame, MAX_PAYLOAD, Opcode};
