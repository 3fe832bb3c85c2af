//! CRC32 used for frame integrity and flash content verification.
//!
//! The checksum is the wire-compatibility contract with the host
//! flashing tool, so the parameters are pinned rather than "some
//! CRC32": reflected polynomial `0xEDB88320`, initial value `0`, no
//! final XOR. Note this differs from the zlib/IEEE variant, which
//! starts from `0xFFFF_FFFF` and inverts the result.

/// Reflected CRC32 polynomial.
const POLY: u32 = 0xEDB88320;

/// Fold `data` into a running CRC32 accumulator.
///
/// Start with `0` and feed fragments in wire order. The running form
/// lets callers checksum a logical frame (marker, opcode, length,
/// payload) or a flash range without concatenating it into one buffer.
pub fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}
