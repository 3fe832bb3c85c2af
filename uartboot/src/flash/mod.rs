//! Flash access: the driver seam and the region manager.
//!
//! The [`FlashDriver`] trait is the boundary to the hardware (or to a
//! simulation): sector-granular erase, word-granular program, plus the
//! read primitive used for verification and the argument table.
//! [`RegionManager`] maps byte ranges onto the sector table, enforces
//! the protected region, and carries the best-effort failure policy:
//! a failing sector or word is logged and counted, never a reason to
//! abandon the rest of the operation.

pub mod layout;

use log::{info, warn};
use thiserror::Error;

use crate::protocol::crc32_update;

/// Flash operation failures, as reported by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashError {
    /// A sector erase did not complete.
    #[error("erase of sector {0} failed")]
    Erase(usize),

    /// A word program did not complete.
    #[error("program failed at {address:#010x}")]
    Program {
        /// Address of the failed word.
        address: u32,
    },

    /// A read did not complete or left the device's address space.
    #[error("read failed at {address:#010x}")]
    Read {
        /// Address of the failed access.
        address: u32,
    },

    /// Program data length is not a multiple of the word width.
    #[error("program length {len} is not word-aligned")]
    Unaligned {
        /// Offending data length.
        len: usize,
    },
}

/// Hardware seam for the device's non-volatile program memory.
pub trait FlashDriver {
    /// Erase one sector of the fixed sector table.
    fn erase_sector(&mut self, index: usize) -> Result<(), FlashError>;

    /// Program one 4-byte word at a word-aligned address.
    fn program_word(&mut self, address: u32, word: u32) -> Result<(), FlashError>;

    /// Read `buf.len()` bytes starting at `address`.
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError>;
}

/// Outcome of a best-effort multi-sector erase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EraseOutcome {
    /// Sectors erased successfully.
    pub sectors_erased: usize,
    /// Sectors whose erase failed.
    pub sectors_failed: usize,
}

/// Outcome of a best-effort multi-word program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramOutcome {
    /// Words programmed successfully.
    pub words_written: usize,
    /// Words whose program failed.
    pub words_failed: usize,
}

/// Erase/program/verify front end over a [`FlashDriver`].
#[derive(Debug)]
pub struct RegionManager<F> {
    driver: F,
}

impl<F: FlashDriver> RegionManager<F> {
    /// Wrap a flash driver.
    pub fn new(driver: F) -> Self {
        Self { driver }
    }

    /// Whether `[address, address + size)` touches the bootloader's
    /// own image. Callers must check this before erase or program.
    pub fn is_protected(&self, address: u32, size: u32) -> bool {
        layout::is_protected(address, size)
    }

    /// Erase every sector overlapping `[address, address + size)`.
    ///
    /// Erase granularity is the sector, so bytes outside the range but
    /// inside an overlapped sector are lost. Per-sector failures are
    /// logged and counted; remaining sectors are still attempted.
    pub fn erase(&mut self, address: u32, size: u32) -> EraseOutcome {
        let mut outcome = EraseOutcome::default();
        for sector in layout::sectors() {
            if !sector.overlaps(address, size) {
                continue;
            }
            info!(
                "erase sector {}, addr {:#010x}, size {}",
                sector.index, sector.address, sector.size
            );
            match self.driver.erase_sector(sector.index) {
                Ok(()) => outcome.sectors_erased += 1,
                Err(e) => {
                    warn!("erase sector {} failed: {e}", sector.index);
                    outcome.sectors_failed += 1;
                }
            }
        }
        outcome
    }

    /// Program `data` word by word starting at `address`.
    ///
    /// The data length must be a multiple of the programming word;
    /// there is no implicit padding, and an unaligned length fails
    /// before the first driver call. Per-word failures are logged and
    /// counted; remaining words are still attempted.
    pub fn program(&mut self, address: u32, data: &[u8]) -> Result<ProgramOutcome, FlashError> {
        if data.len() % layout::PROGRAM_WORD != 0 {
            return Err(FlashError::Unaligned { len: data.len() });
        }

        let mut outcome = ProgramOutcome::default();
        for (i, chunk) in data.chunks_exact(layout::PROGRAM_WORD).enumerate() {
            #[allow(clippy::cast_possible_truncation)] // payload bound keeps i small
            let word_address = address.wrapping_add((i * layout::PROGRAM_WORD) as u32);
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            match self.driver.program_word(word_address, word) {
                Ok(()) => outcome.words_written += 1,
                Err(e) => {
                    warn!("program failed at {word_address:#010x}: {e}");
                    outcome.words_failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Read raw bytes.
    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.driver.read(address, buf)
    }

    /// CRC32 over the live contents of `[address, address + size)`.
    pub fn checksum_range(&mut self, address: u32, size: u32) -> Result<u32, FlashError> {
        let mut chunk = [0u8; 256];
        let mut crc = 0;
        let mut offset = 0;
        while offset < size {
            let take = (size - offset).min(chunk.len() as u32) as usize;
            self.driver
                .read(address.wrapping_add(offset), &mut chunk[..take])?;
            crc = crc32_update(crc, &chunk[..take]);
            offset += take as u32;
        }
        Ok(crc)
    }

    /// Access the underlying driver.
    pub fn driver_mut(&mut self) -> &mut F {
        &mut self.driver
    }
}
